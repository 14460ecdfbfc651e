//! Resolver contract for conflicting duplicate sets.

use crate::core::cluster::ConflictCluster;
use crate::core::record::{GeoTag, Observation};
use crate::error::ResolverError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// A decision about which files of a duplicate set survive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub keepers: Vec<PathBuf>,
    pub discards: Vec<PathBuf>,
    pub chosen_timestamp: Option<NaiveDateTime>,
    pub chosen_geotag: Option<GeoTag>,
}

impl Resolution {
    /// The explicit metadata choice, if any
    pub fn choice(&self) -> Option<Observation> {
        let choice = Observation::new(self.chosen_timestamp, self.chosen_geotag);
        (!choice.is_empty()).then_some(choice)
    }

    /// Keep the files of one cluster, discard the rest, and adopt that
    /// cluster's metadata as the explicit choice.
    ///
    /// Returns `None` if `index` is out of range.
    pub fn keep_cluster(clusters: &[ConflictCluster], index: usize) -> Option<Self> {
        let chosen = clusters.get(index)?;
        let resolved = chosen.resolved();

        Some(Self {
            keepers: chosen.paths(),
            discards: clusters
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .flat_map(|(_, c)| c.paths())
                .collect(),
            chosen_timestamp: resolved.timestamp,
            chosen_geotag: resolved.geotag,
        })
    }

    /// Check that keepers and discards partition `members` and at least
    /// one file is kept.
    pub fn validate(&self, set_key: &str, members: &[PathBuf]) -> Result<(), ResolverError> {
        if self.keepers.is_empty() {
            return Err(ResolverError::EmptyKeepers {
                set_key: set_key.to_string(),
            });
        }

        let known: HashSet<&PathBuf> = members.iter().collect();
        let mut assigned: HashSet<&PathBuf> = HashSet::new();

        for path in self.keepers.iter().chain(self.discards.iter()) {
            if !known.contains(path) {
                return Err(ResolverError::UnknownFile {
                    set_key: set_key.to_string(),
                    path: path.clone(),
                });
            }
            if !assigned.insert(path) {
                return Err(ResolverError::Overlap {
                    set_key: set_key.to_string(),
                    path: path.clone(),
                });
            }
        }

        if let Some(path) = members.iter().find(|p| !assigned.contains(p)) {
            return Err(ResolverError::Unassigned {
                set_key: set_key.to_string(),
                path: path.clone(),
            });
        }

        Ok(())
    }
}

/// Decides conflicting duplicate sets.
///
/// Called synchronously, only when a set splits into more than one
/// conflict cluster. Returning `None` defers the set: nothing is moved
/// and nothing is merged.
pub trait Resolver {
    fn resolve(&mut self, clusters: &[ConflictCluster]) -> Option<Resolution>;
}

impl<F> Resolver for F
where
    F: FnMut(&[ConflictCluster]) -> Option<Resolution>,
{
    fn resolve(&mut self, clusters: &[ConflictCluster]) -> Option<Resolution> {
        self(clusters)
    }
}
