//! # Resolver Module
//!
//! Decides which files of a duplicate set survive.
//!
//! - Single-cluster sets never reach a [`Resolver`]: [`AutomaticResolver`]
//!   keeps the record with the richest metadata and merges everything
//!   into it.
//! - Multi-cluster sets are handed to a [`Resolver`] (a human prompt, a
//!   policy, or a closure). The engine waits for the returned value; no
//!   thread blocks inside the engine.

mod traits;

pub use traits::{Resolution, Resolver};

use crate::core::cluster::ConflictCluster;
use crate::core::record::FileRecord;

/// Resolution for sets whose metadata all agrees
#[derive(Debug, Clone, Copy, Default)]
pub struct AutomaticResolver;

impl AutomaticResolver {
    /// Index of the keeper: most observations, ties go to the earliest record
    pub fn keeper_index(records: &[FileRecord]) -> Option<usize> {
        records
            .iter()
            .enumerate()
            .max_by(|(i, a), (j, b)| {
                a.observation_count()
                    .cmp(&b.observation_count())
                    .then_with(|| j.cmp(i))
            })
            .map(|(i, _)| i)
    }

    /// Keep one record of the cluster, discard the others
    pub fn resolve(&self, cluster: &ConflictCluster) -> Option<Resolution> {
        let keeper = Self::keeper_index(&cluster.records)?;
        Some(Resolution {
            keepers: vec![cluster.records[keeper].path.clone()],
            discards: cluster
                .records
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != keeper)
                .map(|(_, r)| r.path.clone())
                .collect(),
            chosen_timestamp: None,
            chosen_geotag: None,
        })
    }
}

/// Leaves every conflicting set for later
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferResolver;

impl Resolver for DeferResolver {
    fn resolve(&mut self, clusters: &[ConflictCluster]) -> Option<Resolution> {
        tracing::debug!("deferring set with {} conflict clusters", clusters.len());
        None
    }
}
