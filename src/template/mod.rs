//! Template resolution, rendering, and update-safety.
//!
//! Templates are versioned project skeletons. Materializing one renders its
//! file tree against the build context; a manifest written beside the output
//! records what was substituted and the content hash of every rendered file,
//! so a later update can detect user edits and refuse to clobber them.

pub mod engine;
pub mod manifest;
pub mod reference;

use std::path::PathBuf;

use thiserror::Error;

use crate::tools::ToolError;

pub use engine::{MaterializedTemplate, TemplateEngine};
pub use manifest::{FileRecord, TemplateManifest};
pub use reference::{ResolvedTemplate, TemplateMeta, TemplateReference, TemplateSource};

/// Errors from template resolution and rendering.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error(
        "template `{name}` {version} requires freighter {compat}, but this is freighter {orchestrator}"
    )]
    Incompatible {
        name: String,
        version: semver::Version,
        compat: semver::VersionReq,
        orchestrator: semver::Version,
    },

    #[error("template `{name}` is {found}, but the reference requires {required}")]
    VersionUnsatisfied {
        name: String,
        found: semver::Version,
        required: semver::VersionReq,
    },

    #[error("no value for placeholder `{variable}` in template file {}", file.display())]
    MissingVariable { variable: String, file: PathBuf },

    #[error("failed to render template file {}: {message}", file.display())]
    RenderFailed { file: PathBuf, message: String },

    #[error("malformed template at {}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },

    #[error(
        "configuration declares no template source (set `template.path` or `template.archive`)"
    )]
    NoSource,

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
