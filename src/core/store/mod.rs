//! # Store Module
//!
//! In-memory map from canonical path to [`FileRecord`], persisted as the
//! "consolidated metadata" JSON file.
//!
//! Iteration is in path order, which makes every downstream step
//! (grouping, clustering, keeper choice) deterministic across runs and
//! across save/load cycles.
//!
//! The store is only mutated by the orchestrating thread.
//! [`ArchiveState`] bundles it with the grouping index and quarantine
//! manifest so the three files are saved together.

mod state;

pub use state::{ArchiveState, StatePaths};

use crate::core::fsops::{read_json, write_json_atomic, RetryPolicy};
use crate::core::hasher::ContentDigest;
use crate::core::record::FileRecord;
use crate::error::PersistenceError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Counts from [`MetadataStore::ingest`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub inserted: usize,
    pub updated: usize,
}

/// Path-keyed collection of file records
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetadataStore {
    records: BTreeMap<PathBuf, FileRecord>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from disk; a missing file yields an empty store
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let records: Option<BTreeMap<PathBuf, FileRecord>> = read_json(path)?;
        let records = records.unwrap_or_default();

        for (key, record) in &records {
            if key != &record.path {
                return Err(PersistenceError::Corrupted {
                    path: path.to_path_buf(),
                    reason: format!(
                        "entry {} holds a record for {}",
                        key.display(),
                        record.path.display()
                    ),
                });
            }
        }

        tracing::debug!("loaded {} records from {}", records.len(), path.display());
        Ok(Self { records })
    }

    /// Persist atomically
    pub fn save(&self, path: &Path, retry: &RetryPolicy) -> Result<(), PersistenceError> {
        write_json_atomic(&self.records, path, retry)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(path)
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.records.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut FileRecord> {
        self.records.get_mut(path)
    }

    /// Insert or replace the record for its path
    pub fn insert(&mut self, record: FileRecord) -> Option<FileRecord> {
        self.records.insert(record.path.clone(), record)
    }

    pub fn remove(&mut self, path: &Path) -> Option<FileRecord> {
        self.records.remove(path)
    }

    /// Records in path order
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.records.keys()
    }

    /// Merge externally extracted records.
    ///
    /// New paths are inserted. Known paths keep their history: incoming
    /// observations are appended (identical entries skipped), and a changed
    /// size invalidates the stored hash.
    pub fn ingest<I>(&mut self, incoming: I) -> IngestStats
    where
        I: IntoIterator<Item = FileRecord>,
    {
        let mut stats = IngestStats::default();

        for record in incoming {
            match self.records.get_mut(&record.path) {
                Some(existing) => {
                    if existing.size != record.size {
                        existing.size = record.size;
                        existing.content_hash = None;
                    }
                    if record.content_hash.is_some() {
                        existing.content_hash = record.content_hash;
                    }
                    if !record.name.is_empty() {
                        existing.name = record.name.clone();
                    }
                    existing.absorb(&record);
                    stats.updated += 1;
                }
                None => {
                    self.records.insert(record.path.clone(), record);
                    stats.inserted += 1;
                }
            }
        }

        stats
    }

    /// Store a computed digest; returns false for unknown paths
    pub fn set_hash(&mut self, path: &Path, digest: ContentDigest) -> bool {
        match self.records.get_mut(path) {
            Some(record) => {
                record.content_hash = Some(digest);
                true
            }
            None => false,
        }
    }

    /// Copies of the records for `paths`, in the given order
    pub fn snapshot(&self, paths: &[PathBuf]) -> Vec<FileRecord> {
        paths
            .iter()
            .filter_map(|p| self.records.get(p).cloned())
            .collect()
    }

    /// Overwrite records with earlier copies
    pub fn restore_snapshot(&mut self, records: Vec<FileRecord>) {
        for record in records {
            self.records.insert(record.path.clone(), record);
        }
    }
}
