//! The backend abstraction: pluggable lifecycle implementations per
//! (platform, output format) pair.
//!
//! A backend is polymorphic over the fixed capability set
//! {create, update, build, run, package, publish}. A concrete backend may
//! support any subset; calling an unsupported operation fails with
//! [`StageError::Unsupported`] rather than silently doing nothing.

pub mod registry;
pub mod script;

use std::collections::BTreeSet;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::context::BuildContext;
use crate::core::stage::Stage;
use crate::template::TemplateError;
use crate::tools::{ToolError, ToolSpec};

pub use registry::{BackendRegistry, RegistryError};
pub use script::ScriptBackend;

/// A structured stage failure, as returned by backend operations.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("operation `{stage}` is not supported by backend `{backend}`")]
    Unsupported { backend: String, stage: Stage },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("{message}")]
    Failed { message: String },
}

impl StageError {
    /// Build the failure a backend returns for an operation it does not
    /// implement.
    pub fn unsupported(backend: &dyn Backend, stage: Stage) -> Self {
        StageError::Unsupported {
            backend: backend.name().to_string(),
            stage,
        }
    }
}

/// What a successful stage hands back to the orchestrator.
#[derive(Debug, Default)]
pub struct StageOutput {
    /// Paths produced or touched by the stage.
    pub artifacts: Vec<PathBuf>,

    /// Non-fatal findings (e.g. template update conflicts).
    pub warnings: Vec<String>,
}

impl StageOutput {
    /// An output with nothing to report.
    pub fn empty() -> Self {
        StageOutput::default()
    }
}

/// A lifecycle implementation for one (platform, format) pair.
///
/// Instances are long-lived and shared read-only across the stages of a
/// run; all per-run state travels in the [`BuildContext`].
pub trait Backend: Send + Sync {
    /// Identity of this backend, used for conflict checks and reports.
    fn name(&self) -> &str;

    /// The lifecycle operations this backend implements.
    fn capabilities(&self) -> BTreeSet<Stage>;

    /// Whether a stage is within this backend's capability set.
    fn supports(&self, stage: Stage) -> bool {
        self.capabilities().contains(&stage)
    }

    /// External tools the backend needs for a run. Verified once, before
    /// any stage executes; their versions feed the stage fingerprints.
    fn required_tools(&self, _ctx: &BuildContext) -> Vec<ToolSpec> {
        Vec::new()
    }

    /// Materialize the project skeleton.
    fn create(&self, _ctx: &BuildContext) -> Result<StageOutput, StageError> {
        Err(StageError::Unsupported {
            backend: self.name().to_string(),
            stage: Stage::Create,
        })
    }

    /// Regenerate the skeleton without clobbering user edits.
    fn update(&self, _ctx: &BuildContext) -> Result<StageOutput, StageError> {
        Err(StageError::Unsupported {
            backend: self.name().to_string(),
            stage: Stage::Update,
        })
    }

    /// Compile or otherwise build the application.
    fn build(&self, _ctx: &BuildContext) -> Result<StageOutput, StageError> {
        Err(StageError::Unsupported {
            backend: self.name().to_string(),
            stage: Stage::Build,
        })
    }

    /// Execute the built application locally.
    fn run(&self, _ctx: &BuildContext) -> Result<StageOutput, StageError> {
        Err(StageError::Unsupported {
            backend: self.name().to_string(),
            stage: Stage::Run,
        })
    }

    /// Produce the distributable artifact.
    fn package(&self, _ctx: &BuildContext) -> Result<StageOutput, StageError> {
        Err(StageError::Unsupported {
            backend: self.name().to_string(),
            stage: Stage::Package,
        })
    }

    /// Push the distributable to its destination.
    fn publish(&self, _ctx: &BuildContext) -> Result<StageOutput, StageError> {
        Err(StageError::Unsupported {
            backend: self.name().to_string(),
            stage: Stage::Publish,
        })
    }
}

/// Invoke the backend operation corresponding to a stage.
pub fn dispatch(
    backend: &dyn Backend,
    stage: Stage,
    ctx: &BuildContext,
) -> Result<StageOutput, StageError> {
    match stage {
        Stage::Create => backend.create(ctx),
        Stage::Update => backend.update(ctx),
        Stage::Build => backend.build(ctx),
        Stage::Run => backend.run(ctx),
        Stage::Package => backend.package(ctx),
        Stage::Publish => backend.publish(ctx),
    }
}
