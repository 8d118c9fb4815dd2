//! Run reports: the final state of every stage attempted in a run.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::platform::TargetPair;
use crate::core::stage::Stage;

/// State of one stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Not attempted (not reached, or halted by an earlier failure).
    Pending,
    /// Currently executing.
    Running,
    /// Executed and completed.
    Succeeded,
    /// Executed and failed.
    Failed,
    /// Not executed because its record already matches the current inputs,
    /// or because an equivalent stage ran in the same invocation.
    Skipped,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StageState::Pending => "not attempted",
            StageState::Running => "running",
            StageState::Succeeded => "succeeded",
            StageState::Failed => "failed",
            StageState::Skipped => "skipped",
        };
        write!(f, "{}", label)
    }
}

/// The final state of one stage.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: Stage,
    pub state: StageState,
    pub duration: Duration,
    pub error: Option<String>,
    pub warnings: Vec<String>,
    pub artifacts: Vec<PathBuf>,
}

impl StageReport {
    pub(crate) fn pending(stage: Stage) -> Self {
        StageReport {
            stage,
            state: StageState::Pending,
            duration: Duration::ZERO,
            error: None,
            warnings: Vec::new(),
            artifacts: Vec::new(),
        }
    }
}

/// The complete outcome of one orchestrated run: every stage's final state,
/// in execution order.
#[derive(Debug)]
pub struct RunReport {
    pub target: TargetPair,
    pub stages: Vec<StageReport>,
}

impl RunReport {
    /// Whether the run completed without any stage failing.
    pub fn success(&self) -> bool {
        !self
            .stages
            .iter()
            .any(|s| s.state == StageState::Failed)
    }

    /// The state of a stage, if it was part of the run.
    pub fn state_of(&self, stage: Stage) -> Option<StageState> {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.state)
    }

    /// All warnings emitted across the run.
    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.stages
            .iter()
            .flat_map(|s| s.warnings.iter().map(String::as_str))
    }

    /// All artifacts reported across the run.
    pub fn artifacts(&self) -> impl Iterator<Item = &PathBuf> {
        self.stages.iter().flat_map(|s| s.artifacts.iter())
    }

    /// Render the report as aligned terminal lines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for stage in &self.stages {
            let timing = match stage.state {
                StageState::Succeeded | StageState::Failed => {
                    format!(" ({:.1}s)", stage.duration.as_secs_f64())
                }
                _ => String::new(),
            };
            out.push_str(&format!(
                "{:>10}  {}{}\n",
                stage.stage.to_string(),
                stage.state,
                timing
            ));
            if let Some(error) = &stage.error {
                out.push_str(&format!("{:>10}  {}\n", "", error));
            }
        }
        out
    }
}
