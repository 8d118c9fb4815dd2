//! External toolchain discovery, caching, and invocation.

pub mod cache;

use std::path::PathBuf;

use thiserror::Error;

pub use cache::{Downloader, HttpDownloader, ToolCache, ToolHandle, ToolSpec};

/// Errors from tool discovery, artifact fetching, and tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool `{tool}` not found")]
    NotFound {
        tool: String,
        /// How the operator might install it, if known.
        install_hint: Option<String>,
    },

    #[error(
        "tool `{tool}` at {} is version {found}, but {required} is required",
        path.display()
    )]
    VersionMismatch {
        tool: String,
        path: PathBuf,
        found: semver::Version,
        required: semver::VersionReq,
    },

    #[error("tool `{tool}` timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    #[error("checksum mismatch for {locator}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        locator: String,
        expected: String,
        actual: String,
    },

    #[error("failed to download {locator}: {message}")]
    Download { locator: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The captured outcome of one external tool invocation.
///
/// The cache never interprets exit codes; callers apply their own tool's
/// conventions.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Exit code, when the process exited normally.
    pub exit_code: Option<i32>,

    /// Captured standard output, lossily decoded.
    pub stdout: String,

    /// Captured standard error, lossily decoded.
    pub stderr: String,
}

impl ExecutionResult {
    /// Conventional success check (exit code zero).
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}
