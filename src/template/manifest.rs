//! The persisted template manifest.
//!
//! One manifest lives beside each materialized skeleton. It maps every
//! rendered file to the variable values substituted into it and the hash of
//! the content that was written, which is what lets `update` tell a
//! regenerated file from one the user edited.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Per-file provenance: what was substituted, and what was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// SHA256 of the file content as rendered.
    pub content_hash: String,

    /// Variable values substituted into this file (empty for verbatim
    /// copies).
    pub variables: BTreeMap<String, serde_json::Value>,
}

/// Manifest for one materialized skeleton.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateManifest {
    /// Name of the template that produced the skeleton.
    pub template_name: String,

    /// Version of the template that produced the skeleton.
    pub template_version: String,

    /// Records keyed by skeleton-relative file path (forward slashes).
    pub files: BTreeMap<String, FileRecord>,
}

impl TemplateManifest {
    /// File name of the manifest inside a skeleton directory.
    pub const FILE_NAME: &'static str = ".freighter-template.json";

    /// Load a manifest from a skeleton directory.
    ///
    /// Returns `None` when no manifest exists (a skeleton not produced by
    /// freighter, or one predating manifests).
    pub fn load(skeleton_dir: &Path) -> Result<Option<Self>> {
        let path = skeleton_dir.join(Self::FILE_NAME);
        if !path.is_file() {
            return Ok(None);
        }

        let contents = crate::util::fs::read_to_string(&path)?;
        let manifest = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse template manifest: {}", path.display()))?;
        Ok(Some(manifest))
    }

    /// Save the manifest into a skeleton directory.
    pub fn save(&self, skeleton_dir: &Path) -> Result<()> {
        let path = skeleton_dir.join(Self::FILE_NAME);
        let contents =
            serde_json::to_string_pretty(self).context("failed to serialize template manifest")?;
        crate::util::fs::write_string(&path, &contents)?;
        Ok(())
    }

    /// Look up the record for a skeleton-relative path.
    pub fn record(&self, rel_path: &str) -> Option<&FileRecord> {
        self.files.get(rel_path)
    }
}
