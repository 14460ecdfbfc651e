//! Persisted map from quarantined file back to its original location.

use crate::core::fsops::{read_json, write_json_atomic, RetryPolicy};
use crate::error::PersistenceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// `quarantine path -> original path` for every file currently quarantined
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuarantineManifest {
    entries: BTreeMap<PathBuf, PathBuf>,
}

impl QuarantineManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from disk; a missing file yields an empty manifest
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        Ok(read_json(path)?.unwrap_or_default())
    }

    pub fn save(&self, path: &Path, retry: &RetryPolicy) -> Result<(), PersistenceError> {
        write_json_atomic(self, path, retry)
    }

    /// Add the moves from a quarantine report (original -> quarantine)
    pub fn record_moves(&mut self, moved: &BTreeMap<PathBuf, PathBuf>) {
        for (original, quarantined) in moved {
            self.entries.insert(quarantined.clone(), original.clone());
        }
    }

    /// Drop entries whose files were put back
    pub fn forget<'a, I>(&mut self, quarantined: I)
    where
        I: IntoIterator<Item = &'a PathBuf>,
    {
        for path in quarantined {
            self.entries.remove(path);
        }
    }

    pub fn original_of(&self, quarantined: &Path) -> Option<&PathBuf> {
        self.entries.get(quarantined)
    }

    pub fn entries(&self) -> &BTreeMap<PathBuf, PathBuf> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
