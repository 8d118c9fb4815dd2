//! User-friendly diagnostic messages.
//!
//! Every error surfaced to an operator should carry the root cause and a
//! suggested fix, not just a message.

use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when no manifest file is found.
    pub const NO_MANIFEST: &str = "help: Run `freighter new <name>` to create a new project";

    /// Suggestion when a required tool is missing.
    pub const TOOL_MISSING: &str =
        "help: Run `freighter doctor` to see which tools are missing and how to install them";

    /// Suggestion when a stage fails.
    pub const STAGE_FAILED: &str = "help: Re-run with `--verbose` for the full tool output";

    /// Suggestion when a template conflict is reported.
    pub const TEMPLATE_CONFLICT: &str =
        "help: Re-run `freighter update --force` to overwrite locally modified files";

    /// Suggestion for download failures.
    pub const FETCH_FAILED: &str = "help: Check your network connection and retry";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
    Help,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
            Severity::Help => write!(f, "help"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related location (file path)
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Error,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Warning,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a file location.
    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let severity_str = if color {
            match self.severity {
                Severity::Error => "\x1b[1;31merror\x1b[0m",
                Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
                Severity::Note => "\x1b[1;36mnote\x1b[0m",
                Severity::Help => "\x1b[1;32mhelp\x1b[0m",
            }
        } else {
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Note => "note",
                Severity::Help => "help",
            }
        };

        output.push_str(&format!("{}: {}\n", severity_str, self.message));

        if let Some(ref path) = self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }

        for ctx in &self.context {
            output.push_str(&format!("  = {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            output.push('\n');
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// No backend registered for a requested (platform, format) pair.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("no backend registered for `{platform}:{format}`")]
#[diagnostic(code(freighter::registry::unknown_target))]
pub struct UnknownTargetDiagnostic {
    pub platform: String,
    pub format: String,
    #[help]
    pub known: Option<String>,
}

/// A (platform, format) pair was registered twice with different backends.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("backend `{incoming}` conflicts with `{existing}` for `{platform}:{format}`")]
#[diagnostic(
    code(freighter::registry::conflicting_registration),
    help("Each (platform, format) pair may only be claimed by one backend")
)]
pub struct ConflictingRegistrationDiagnostic {
    pub platform: String,
    pub format: String,
    pub existing: String,
    pub incoming: String,
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_formatting() {
        let diag = Diagnostic::error("tool `xcodebuild` not found")
            .with_context("searched the configured override, the managed cache, and PATH")
            .with_suggestion("Install the Xcode command line tools")
            .with_suggestion(suggestions::TOOL_MISSING);

        let output = diag.format(false);
        assert!(output.contains("error: tool `xcodebuild` not found"));
        assert!(output.contains("searched the configured override"));
        assert!(output.contains("help: consider:"));
        assert!(output.contains("1. Install the Xcode"));
    }

    #[test]
    fn test_warning_with_location() {
        let diag = Diagnostic::warning("file was modified locally; skipping")
            .with_location("app/main.py");

        let output = diag.format(false);
        assert!(output.contains("warning:"));
        assert!(output.contains("--> app/main.py"));
    }
}
