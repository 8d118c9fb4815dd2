//! Persisted stage completion records.
//!
//! One store lives under the output root per (application, platform,
//! format), holding a flat stage-to-record map. Records must survive
//! process restarts, and a corrupted or missing store is treated as "no
//! stage has run yet", never as fatal.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::stage::Stage;

/// Proof that a stage completed, with the fingerprint of the inputs that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// The completed stage.
    pub stage: Stage,

    /// Completion time, unix seconds.
    pub completed_at: u64,

    /// Digest of the inputs (config hash, template version, tool versions)
    /// that produced the stage's output.
    pub fingerprint: String,
}

impl StageRecord {
    /// Create a record stamped with the current time.
    pub fn new(stage: Stage, fingerprint: impl Into<String>) -> Self {
        let completed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        StageRecord {
            stage,
            completed_at,
            fingerprint: fingerprint.into(),
        }
    }
}

/// The on-disk stage-to-record map for one target.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StageRecordStore {
    records: BTreeMap<String, StageRecord>,
}

impl StageRecordStore {
    /// Load a store, treating missing or corrupted files as empty.
    pub fn load(path: &Path) -> Self {
        if !path.is_file() {
            return StageRecordStore::default();
        }

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!("failed to read stage records {}: {}", path.display(), e);
                return StageRecordStore::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(
                    "discarding corrupted stage records {}: {}",
                    path.display(),
                    e
                );
                StageRecordStore::default()
            }
        }
    }

    /// Save the store, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("failed to encode records")?;
        crate::util::fs::write_string(path, &contents)?;
        Ok(())
    }

    /// The record for a stage, if one exists.
    pub fn get(&self, stage: Stage) -> Option<&StageRecord> {
        self.records.get(stage.as_str())
    }

    /// Insert or replace a stage's record.
    pub fn insert(&mut self, record: StageRecord) {
        self.records.insert(record.stage.as_str().to_string(), record);
    }

    /// Drop a stage's record.
    pub fn remove(&mut self, stage: Stage) {
        self.records.remove(stage.as_str());
    }

    /// Whether a stage's record exists and carries the given fingerprint.
    pub fn matches(&self, stage: Stage, fingerprint: &str) -> bool {
        self.get(stage)
            .map(|r| r.fingerprint == fingerprint)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".freighter/stages-macos-dmg.json");

        let mut store = StageRecordStore::default();
        store.insert(StageRecord::new(Stage::Create, "fp1"));
        store.insert(StageRecord::new(Stage::Build, "fp1"));
        store.save(&path).unwrap();

        let loaded = StageRecordStore::load(&path);
        assert!(loaded.matches(Stage::Create, "fp1"));
        assert!(loaded.matches(Stage::Build, "fp1"));
        assert!(!loaded.matches(Stage::Build, "fp2"));
        assert!(loaded.get(Stage::Package).is_none());
    }

    #[test]
    fn test_missing_store_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = StageRecordStore::load(&tmp.path().join("nope.json"));
        assert!(store.get(Stage::Create).is_none());
    }

    #[test]
    fn test_corrupted_store_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stages.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = StageRecordStore::load(&path);
        assert!(store.get(Stage::Create).is_none());
    }

    #[test]
    fn test_remove() {
        let mut store = StageRecordStore::default();
        store.insert(StageRecord::new(Stage::Build, "fp"));
        store.remove(Stage::Build);
        assert!(store.get(Stage::Build).is_none());
    }
}
