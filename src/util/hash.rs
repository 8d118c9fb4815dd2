//! Hashing utilities for content digests and stage fingerprints.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Compute the SHA256 digest of a byte slice, hex-encoded.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute the SHA256 digest of a string, hex-encoded.
pub fn sha256_str(s: &str) -> String {
    sha256_bytes(s.as_bytes())
}

/// Compute the SHA256 digest of a file, hex-encoded.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Accumulates the inputs that determined a stage's output into one digest.
///
/// Components are separated so that `["ab", "c"]` and `["a", "bc"]` hash
/// differently.
#[derive(Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    /// Create an empty fingerprint builder.
    pub fn new() -> Self {
        Fingerprint {
            hasher: Sha256::new(),
        }
    }

    /// Add a string component.
    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update(s.as_bytes());
        self.hasher.update(b"\0"); // Separator
        self
    }

    /// Add a keyed component (e.g. a tool name and its detected version).
    pub fn update_entry(&mut self, key: &str, value: &str) -> &mut Self {
        self.update_str(key);
        self.update_str(value);
        self
    }

    /// Add an optional string component, distinguishing absent from empty.
    pub fn update_opt(&mut self, opt: Option<&str>) -> &mut Self {
        match opt {
            Some(s) => {
                self.hasher.update(b"\x01");
                self.update_str(s);
            }
            None => {
                self.hasher.update(b"\x00");
            }
        }
        self
    }

    /// Finalize and return the fingerprint as a hex string.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    /// Finalize and return a short fingerprint (first 16 chars).
    pub fn finish_short(self) -> String {
        self.finish()[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sha256_str() {
        let hash = sha256_str("hello");
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_sha256_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.txt");
        std::fs::write(&path, "hello").unwrap();

        let hash = sha256_file(&path).unwrap();
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_fingerprint_components_are_separated() {
        let fp1 = {
            let mut fp = Fingerprint::new();
            fp.update_str("ab").update_str("c");
            fp.finish()
        };

        let fp2 = {
            let mut fp = Fingerprint::new();
            fp.update_str("a").update_str("bc");
            fp.finish()
        };

        assert_ne!(fp1, fp2);
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let build = || {
            let mut fp = Fingerprint::new();
            fp.update_entry("xcodebuild", "15.2.0");
            fp.update_opt(Some("1.0.0"));
            fp.finish_short()
        };

        assert_eq!(build(), build());
        assert_eq!(build().len(), 16);
    }

    #[test]
    fn test_fingerprint_opt_absent_vs_empty() {
        let absent = {
            let mut fp = Fingerprint::new();
            fp.update_opt(None);
            fp.finish()
        };
        let empty = {
            let mut fp = Fingerprint::new();
            fp.update_opt(Some(""));
            fp.finish()
        };
        assert_ne!(absent, empty);
    }
}
