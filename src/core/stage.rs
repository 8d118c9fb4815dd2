//! Lifecycle stages and their dependency graph.
//!
//! Stages form a DAG with a single linear default ordering: create, update,
//! build, then {run, package}, then publish. The `run` and `package`
//! branches are independent of each other, and `publish` hangs off
//! `package`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Dfs, Reversed};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One lifecycle phase of a packaging run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Create,
    Update,
    Build,
    Run,
    Package,
    Publish,
}

impl Stage {
    /// All stages, declared in dependency order (a valid topological order
    /// of the standard DAG).
    pub const ALL: [Stage; 6] = [
        Stage::Create,
        Stage::Update,
        Stage::Build,
        Stage::Run,
        Stage::Package,
        Stage::Publish,
    ];

    /// Get the stage name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Create => "create",
            Stage::Update => "update",
            Stage::Build => "build",
            Stage::Run => "run",
            Stage::Package => "package",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Stage {
    type Err = StageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(Stage::Create),
            "update" => Ok(Stage::Update),
            "build" => Ok(Stage::Build),
            "run" => Ok(Stage::Run),
            "package" => Ok(Stage::Package),
            "publish" => Ok(Stage::Publish),
            _ => Err(StageParseError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid stage name.
#[derive(Debug, Clone, Error)]
#[error("invalid stage `{0}`, valid values: create, update, build, run, package, publish")]
pub struct StageParseError(pub String);

/// The stage dependency graph.
///
/// Edges point from prerequisite to dependent. Stages not on the critical
/// path to an artifact (`run`, `package`, `publish`) are marked optional:
/// their failure halts only their own dependents, while a required stage
/// failing halts everything left in the run.
pub struct StageDag {
    graph: DiGraphMap<Stage, ()>,
    optional: BTreeSet<Stage>,
}

impl StageDag {
    /// The standard lifecycle DAG.
    pub fn standard() -> Self {
        let mut graph = DiGraphMap::new();
        for stage in Stage::ALL {
            graph.add_node(stage);
        }
        graph.add_edge(Stage::Create, Stage::Update, ());
        graph.add_edge(Stage::Update, Stage::Build, ());
        graph.add_edge(Stage::Build, Stage::Run, ());
        graph.add_edge(Stage::Build, Stage::Package, ());
        graph.add_edge(Stage::Package, Stage::Publish, ());

        let optional = [Stage::Run, Stage::Package, Stage::Publish]
            .into_iter()
            .collect();

        StageDag { graph, optional }
    }

    /// Whether a stage is optional in the DAG.
    pub fn is_optional(&self, stage: Stage) -> bool {
        self.optional.contains(&stage)
    }

    /// Direct prerequisite of a stage, if any.
    pub fn predecessor(&self, stage: Stage) -> Option<Stage> {
        self.graph
            .neighbors_directed(stage, petgraph::Direction::Incoming)
            .next()
    }

    /// Expand a requested stage set to include all transitive prerequisites,
    /// returned in dependency order.
    pub fn expand(&self, requested: &[Stage]) -> Vec<Stage> {
        let mut included = BTreeSet::new();

        for &stage in requested {
            let reversed = Reversed(&self.graph);
            let mut dfs = Dfs::new(reversed, stage);
            while let Some(found) = dfs.next(reversed) {
                included.insert(found);
            }
        }

        // ALL is declared in a topological order of the standard DAG.
        Stage::ALL
            .into_iter()
            .filter(|s| included.contains(s))
            .collect()
    }

    /// All stages that transitively depend on `stage` (excluding itself).
    pub fn dependents(&self, stage: Stage) -> BTreeSet<Stage> {
        let mut dfs = Dfs::new(&self.graph, stage);
        let mut found = BTreeSet::new();
        while let Some(next) = dfs.next(&self.graph) {
            if next != stage {
                found.insert(next);
            }
        }
        found
    }
}

impl Default for StageDag {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_roundtrip() {
        for stage in Stage::ALL {
            let parsed: Stage = stage.as_str().parse().unwrap();
            assert_eq!(parsed, stage);
        }
        assert!("deploy".parse::<Stage>().is_err());
    }

    #[test]
    fn test_expand_pulls_prerequisites() {
        let dag = StageDag::standard();

        let stages = dag.expand(&[Stage::Build]);
        assert_eq!(stages, vec![Stage::Create, Stage::Update, Stage::Build]);

        let stages = dag.expand(&[Stage::Publish]);
        assert_eq!(
            stages,
            vec![
                Stage::Create,
                Stage::Update,
                Stage::Build,
                Stage::Package,
                Stage::Publish
            ]
        );
    }

    #[test]
    fn test_expand_run_does_not_pull_package() {
        let dag = StageDag::standard();

        let stages = dag.expand(&[Stage::Run]);
        assert!(!stages.contains(&Stage::Package));
        assert!(stages.contains(&Stage::Build));
    }

    #[test]
    fn test_dependents() {
        let dag = StageDag::standard();

        let deps = dag.dependents(Stage::Build);
        assert!(deps.contains(&Stage::Run));
        assert!(deps.contains(&Stage::Package));
        assert!(deps.contains(&Stage::Publish));
        assert!(!deps.contains(&Stage::Update));

        let deps = dag.dependents(Stage::Package);
        assert_eq!(deps, [Stage::Publish].into_iter().collect());
    }

    #[test]
    fn test_predecessor() {
        let dag = StageDag::standard();
        assert_eq!(dag.predecessor(Stage::Create), None);
        assert_eq!(dag.predecessor(Stage::Update), Some(Stage::Create));
        assert_eq!(dag.predecessor(Stage::Publish), Some(Stage::Package));
    }

    #[test]
    fn test_optional_stages() {
        let dag = StageDag::standard();
        assert!(!dag.is_optional(Stage::Create));
        assert!(!dag.is_optional(Stage::Build));
        assert!(dag.is_optional(Stage::Run));
        assert!(dag.is_optional(Stage::Package));
        assert!(dag.is_optional(Stage::Publish));
    }
}
