//! Target identity: platforms and output formats.
//!
//! Platforms are a closed set known to the orchestrator; output formats are
//! an open set defined by whichever backends are registered (e.g. "app",
//! "dmg", "appimage", "xcode").

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A supported target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Macos,
    Linux,
    Windows,
    Ios,
    Android,
    Web,
}

impl Platform {
    /// All known platforms, in display order.
    pub const ALL: [Platform; 6] = [
        Platform::Macos,
        Platform::Linux,
        Platform::Windows,
        Platform::Ios,
        Platform::Android,
        Platform::Web,
    ];

    /// Get the platform name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Macos => "macos",
            Platform::Linux => "linux",
            Platform::Windows => "windows",
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Web => "web",
        }
    }

    /// The platform matching the running host, if packaging for it makes sense.
    pub fn host() -> Option<Platform> {
        if cfg!(target_os = "macos") {
            Some(Platform::Macos)
        } else if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else if cfg!(target_os = "windows") {
            Some(Platform::Windows)
        } else {
            None
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = PlatformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        for platform in Platform::ALL {
            if platform.as_str() == lowered {
                return Ok(platform);
            }
        }
        Err(PlatformParseError {
            input: s.to_string(),
            suggestion: closest_platform(&lowered),
        })
    }
}

/// Error returned when parsing an unknown platform name.
#[derive(Debug, Clone, Error)]
pub struct PlatformParseError {
    pub input: String,
    pub suggestion: Option<Platform>,
}

impl fmt::Display for PlatformParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown platform `{}`", self.input)?;
        match self.suggestion {
            Some(p) => write!(f, ", did you mean `{}`?", p),
            None => {
                let names: Vec<_> = Platform::ALL.iter().map(|p| p.as_str()).collect();
                write!(f, ", valid values: {}", names.join(", "))
            }
        }
    }
}

/// Pick the known platform closest to the input, if any is close enough.
fn closest_platform(input: &str) -> Option<Platform> {
    Platform::ALL
        .iter()
        .map(|p| (edit_distance(input, p.as_str()), *p))
        .filter(|(dist, _)| *dist <= 2)
        .min_by_key(|(dist, _)| *dist)
        .map(|(_, p)| p)
}

/// Levenshtein distance, small inputs only.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// An output format identifier: lowercase ascii letters, digits, and dashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OutputFormat(String);

impl OutputFormat {
    /// Validate and create an output format identifier.
    pub fn new(name: impl Into<String>) -> Result<Self, FormatParseError> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !name.starts_with('-')
            && !name.ends_with('-');

        if valid {
            Ok(OutputFormat(name))
        } else {
            Err(FormatParseError(name))
        }
    }

    /// Get the format name as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OutputFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputFormat::new(s)
    }
}

impl TryFrom<String> for OutputFormat {
    type Error = FormatParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        OutputFormat::new(s)
    }
}

impl From<OutputFormat> for String {
    fn from(f: OutputFormat) -> String {
        f.0
    }
}

/// Error returned when validating an output format identifier.
#[derive(Debug, Clone, Error)]
#[error("invalid output format `{0}`: expected lowercase letters, digits, and dashes")]
pub struct FormatParseError(pub String);

/// A (platform, output format) pair identifying one packaging target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetPair {
    pub platform: Platform,
    pub format: OutputFormat,
}

impl TargetPair {
    /// Create a target pair.
    pub fn new(platform: Platform, format: OutputFormat) -> Self {
        TargetPair { platform, format }
    }
}

impl fmt::Display for TargetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.format)
    }
}
