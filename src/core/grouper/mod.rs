//! # Grouper Module
//!
//! Finds candidate duplicate sets in two passes.
//!
//! ## How It Works
//! 1. Drop records that are quarantined or no longer on disk
//! 2. Bucket the rest by `(name, size)` - cheap, no file reads
//! 3. Split every bucket with two or more members by content digest
//! 4. Keep content buckets with two or more members
//!
//! Buckets and their members come out in first-seen order, so a fixed
//! input always yields the same sets in the same order.

mod index;

pub use index::GroupingIndex;

use crate::core::hasher::ContentDigest;
use crate::core::record::FileRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;

/// Coarse grouping key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameSizeKey {
    pub name: String,
    pub size: u64,
}

impl NameSizeKey {
    pub fn of(record: &FileRecord) -> Self {
        Self {
            name: record.name.clone(),
            size: record.size,
        }
    }
}

/// Records sharing one key, in first-seen order
#[derive(Debug, Clone)]
pub struct Bucket<'a, K> {
    pub key: K,
    pub members: Vec<&'a FileRecord>,
}

/// Bucket records by `key_fn`; records for which it returns `None` are skipped.
///
/// Buckets are ordered by the first record that produced their key.
pub fn group_by<'a, K, I, F>(records: I, key_fn: F) -> Vec<Bucket<'a, K>>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = &'a FileRecord>,
    F: Fn(&FileRecord) -> Option<K>,
{
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut buckets: Vec<Bucket<'a, K>> = Vec::new();

    for record in records {
        let Some(key) = key_fn(record) else {
            continue;
        };
        match positions.get(&key) {
            Some(&i) => buckets[i].members.push(record),
            None => {
                positions.insert(key.clone(), buckets.len());
                buckets.push(Bucket {
                    key,
                    members: vec![record],
                });
            }
        }
    }

    buckets
}

/// First grouping level
pub fn group_by_name_size<'a, I>(records: I) -> Vec<Bucket<'a, NameSizeKey>>
where
    I: IntoIterator<Item = &'a FileRecord>,
{
    group_by(records, |r| Some(NameSizeKey::of(r)))
}

/// Second grouping level; records without a digest are skipped
pub fn group_by_content<'a, I>(records: I) -> Vec<Bucket<'a, ContentDigest>>
where
    I: IntoIterator<Item = &'a FileRecord>,
{
    group_by(records, |r| r.content_hash)
}

/// Byte-identical files that are candidates for collapsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateSet {
    pub digest: ContentDigest,
    pub records: Vec<FileRecord>,
}

impl DuplicateSet {
    /// Stable identifier used in the grouping index, journal and events.
    ///
    /// `name|size|digest`: identical bytes stored under two names form two
    /// sets, so the digest alone is not unique.
    pub fn key(&self) -> String {
        match self.records.first() {
            Some(first) => format!("{}|{}|{}", first.name, first.size, self.digest.to_hex()),
            None => self.digest.to_hex(),
        }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.records.iter().map(|r| r.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bytes freed if all but one copy are quarantined
    pub fn reclaimable_bytes(&self) -> u64 {
        self.records
            .iter()
            .skip(1)
            .map(|r| r.size)
            .sum()
    }
}

/// Result of a grouping pass
#[derive(Debug, Clone, Default)]
pub struct GroupingOutcome {
    pub sets: Vec<DuplicateSet>,
    /// Listed in the store but absent on disk
    pub missing: Vec<PathBuf>,
    /// In a multi-member name/size bucket but without a digest
    pub unhashed: Vec<PathBuf>,
}

/// Two-level duplicate grouper
#[derive(Debug, Clone)]
pub struct DuplicateGrouper {
    check_disk: bool,
}

impl DuplicateGrouper {
    /// Grouper that prunes records whose file is gone
    pub fn new() -> Self {
        Self { check_disk: true }
    }

    /// Grouper that trusts the records without touching the file system
    pub fn in_memory() -> Self {
        Self { check_disk: false }
    }

    fn is_present(&self, record: &FileRecord) -> bool {
        !self.check_disk || record.path.is_file()
    }

    /// Split live records from quarantined and missing ones
    pub fn live_records<'a, I>(&self, records: I) -> (Vec<&'a FileRecord>, Vec<PathBuf>)
    where
        I: IntoIterator<Item = &'a FileRecord>,
    {
        let mut live = Vec::new();
        let mut missing = Vec::new();

        for record in records {
            if record.is_quarantined() {
                continue;
            }
            if self.is_present(record) {
                live.push(record);
            } else {
                tracing::warn!(
                    "{} is in the metadata store but missing on disk, skipping",
                    record.path.display()
                );
                missing.push(record.path.clone());
            }
        }

        (live, missing)
    }

    /// Paths that must be hashed before `candidate_sets` can see them
    pub fn needs_hashing<'a, I>(&self, records: I) -> Vec<PathBuf>
    where
        I: IntoIterator<Item = &'a FileRecord>,
    {
        let (live, _) = self.live_records(records);
        group_by_name_size(live)
            .into_iter()
            .filter(|b| b.members.len() >= 2)
            .flat_map(|b| b.members.into_iter())
            .filter(|r| r.content_hash.is_none())
            .map(|r| r.path.clone())
            .collect()
    }

    /// Run both grouping levels
    pub fn candidate_sets<'a, I>(&self, records: I) -> GroupingOutcome
    where
        I: IntoIterator<Item = &'a FileRecord>,
    {
        let (live, missing) = self.live_records(records);
        let mut outcome = GroupingOutcome {
            missing,
            ..GroupingOutcome::default()
        };

        for bucket in group_by_name_size(live) {
            if bucket.members.len() < 2 {
                continue;
            }

            outcome.unhashed.extend(
                bucket
                    .members
                    .iter()
                    .filter(|r| r.content_hash.is_none())
                    .map(|r| r.path.clone()),
            );

            for content in group_by_content(bucket.members.iter().copied()) {
                if content.members.len() < 2 {
                    continue;
                }
                outcome.sets.push(DuplicateSet {
                    digest: content.key,
                    records: content.members.into_iter().cloned().collect(),
                });
            }
        }

        outcome
    }
}

impl Default for DuplicateGrouper {
    fn default() -> Self {
        Self::new()
    }
}
