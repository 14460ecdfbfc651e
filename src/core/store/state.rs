//! The three persisted state files, saved together.

use super::MetadataStore;
use crate::core::fsops::{AtomicWriter, RetryPolicy};
use crate::core::grouper::GroupingIndex;
use crate::core::quarantine::QuarantineManifest;
use crate::error::PersistenceError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Locations of the persisted state files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub metadata: PathBuf,
    pub grouping: PathBuf,
    pub manifest: PathBuf,
}

impl StatePaths {
    pub const METADATA_FILE: &'static str = "consolidated_metadata.json";
    pub const GROUPING_FILE: &'static str = "grouping_index.json";
    pub const MANIFEST_FILE: &'static str = "quarantine_manifest.json";

    pub fn in_dir(dir: &Path) -> Self {
        Self {
            metadata: dir.join(Self::METADATA_FILE),
            grouping: dir.join(Self::GROUPING_FILE),
            manifest: dir.join(Self::MANIFEST_FILE),
        }
    }
}

/// Everything the engine persists between runs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveState {
    pub store: MetadataStore,
    pub grouping: GroupingIndex,
    pub manifest: QuarantineManifest,
}

impl ArchiveState {
    /// Load all three files; missing files start empty.
    ///
    /// Quarantine marks are reconciled with the manifest and the disk, so
    /// a save that stopped between renames does not leave files stranded.
    pub fn load(paths: &StatePaths) -> Result<Self, PersistenceError> {
        let mut state = Self {
            store: MetadataStore::load(&paths.metadata)?,
            grouping: GroupingIndex::load(&paths.grouping)?,
            manifest: QuarantineManifest::load(&paths.manifest)?,
        };

        let repaired = state.reconcile();
        if repaired > 0 {
            tracing::warn!("Repaired {} quarantine entries that disagreed with the disk", repaired);
        }
        Ok(state)
    }

    /// Make record quarantine marks and manifest entries agree, using the
    /// file system to break ties:
    /// - a file present at its original path and absent from quarantine is live
    /// - a file present only in quarantine is quarantined
    ///
    /// Cases the disk cannot decide are left alone. Returns the number of
    /// changes.
    pub fn reconcile(&mut self) -> usize {
        let mut changes = 0;

        let marked: Vec<(PathBuf, PathBuf)> = self
            .store
            .iter()
            .filter_map(|r| r.quarantine_path.clone().map(|q| (r.path.clone(), q)))
            .collect();
        for (original, quarantined) in marked {
            if !quarantined.exists() && original.exists() {
                tracing::warn!(
                    "{} is back in place, clearing its quarantine mark",
                    original.display()
                );
                if let Some(record) = self.store.get_mut(&original) {
                    record.quarantine_path = None;
                }
                self.manifest.forget([&quarantined]);
                changes += 1;
            } else if quarantined.exists() && self.manifest.original_of(&quarantined).is_none() {
                tracing::warn!(
                    "{} is quarantined but missing from the manifest, re-adding it",
                    quarantined.display()
                );
                self.manifest
                    .record_moves(&BTreeMap::from([(original, quarantined)]));
                changes += 1;
            }
        }

        let listed: Vec<(PathBuf, PathBuf)> = self
            .manifest
            .entries()
            .iter()
            .map(|(q, o)| (q.clone(), o.clone()))
            .collect();
        for (quarantined, original) in listed {
            let Some(record) = self.store.get_mut(&original) else {
                continue;
            };
            if record.quarantine_path.as_ref() == Some(&quarantined) {
                continue;
            }
            if quarantined.exists() && !original.exists() {
                tracing::warn!(
                    "{} is only in quarantine, marking its record",
                    original.display()
                );
                record.quarantine_path = Some(quarantined);
                changes += 1;
            } else if !quarantined.exists() && original.exists() {
                tracing::warn!(
                    "{} is back in place, dropping its manifest entry",
                    original.display()
                );
                self.manifest.forget([&quarantined]);
                changes += 1;
            }
        }

        changes
    }

    /// Stage all three files, then rename each into place.
    ///
    /// Staging fails before any rename if a file cannot be written. The
    /// renames themselves happen one by one and are not atomic as a group:
    /// if a later rename fails, earlier files already hold the new state.
    /// Callers that roll back must save again, and [`ArchiveState::load`]
    /// reconciles quarantine marks that a partial save left behind.
    pub fn save(&self, paths: &StatePaths, retry: &RetryPolicy) -> Result<(), PersistenceError> {
        let writer = AtomicWriter::new(*retry);
        let staged = [
            writer.stage_json(&self.store, &paths.metadata)?,
            writer.stage_json(&self.grouping, &paths.grouping)?,
            writer.stage_json(&self.manifest, &paths.manifest)?,
        ];

        for write in staged {
            write.commit()?;
        }

        tracing::debug!(
            "saved {} records, {} groups, {} quarantined files",
            self.store.len(),
            self.grouping.len(),
            self.manifest.len()
        );
        Ok(())
    }
}
