//! Persisted grouping index: set key -> member paths.

use super::DuplicateSet;
use crate::core::fsops::{read_json, write_json_atomic, RetryPolicy};
use crate::error::PersistenceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Which files belong to which duplicate set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupingIndex {
    groups: BTreeMap<String, Vec<PathBuf>>,
}

impl GroupingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from freshly grouped sets
    pub fn from_sets(sets: &[DuplicateSet]) -> Self {
        Self {
            groups: sets.iter().map(|s| (s.key(), s.paths())).collect(),
        }
    }

    /// Load from disk; a missing file yields an empty index
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        Ok(Self {
            groups: read_json(path)?.unwrap_or_default(),
        })
    }

    pub fn save(&self, path: &Path, retry: &RetryPolicy) -> Result<(), PersistenceError> {
        write_json_atomic(&self.groups, path, retry)
    }

    pub fn get(&self, key: &str) -> Option<&Vec<PathBuf>> {
        self.groups.get(key)
    }

    /// Replace (`Some`) or drop (`None`) the entry for `key`
    pub fn set(&mut self, key: &str, members: Option<Vec<PathBuf>>) {
        match members {
            Some(members) => {
                self.groups.insert(key.to_string(), members);
            }
            None => {
                self.groups.remove(key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<PathBuf>)> {
        self.groups.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::ContentDigest;
    use crate::core::record::FileRecord;
    use tempfile::TempDir;

    fn set() -> DuplicateSet {
        let digest = ContentDigest::from_bytes([3; 32]);
        DuplicateSet {
            digest,
            records: vec![
                FileRecord::new("/a/x.jpg", 1).with_hash(digest),
                FileRecord::new("/b/x.jpg", 1).with_hash(digest),
            ],
        }
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grouping_index.json");
        let index = GroupingIndex::from_sets(&[set()]);

        index.save(&path, &RetryPolicy::default()).unwrap();

        assert_eq!(GroupingIndex::load(&path).unwrap(), index);
    }

    #[test]
    fn set_replaces_and_removes() {
        let mut index = GroupingIndex::from_sets(&[set()]);
        let key = set().key();

        index.set(&key, Some(vec![PathBuf::from("/a/x.jpg")]));
        assert_eq!(index.get(&key).unwrap().len(), 1);

        index.set(&key, None);
        assert!(index.is_empty());
    }
}
