//! # Cluster Module
//!
//! Splits a set of byte-identical files into groups whose metadata agrees.
//!
//! ## How It Works
//! Records are visited in discovery order. Each joins the first existing
//! cluster whose *every* member it tolerant-matches, otherwise it starts a
//! new cluster. The result partitions the set.
//!
//! - one cluster: all metadata is compatible, the set is collapsed
//!   automatically
//! - several clusters: at least two files disagree about when or where the
//!   photo was taken, and a resolver has to pick
//!
//! The pass is greedy, so with A~B, B~C but not A~C the partition depends
//! on input order. Input order is stable, so the output is too.

mod tolerance;

pub use tolerance::{
    haversine_m, Tolerance, DEFAULT_GEO_TOLERANCE_M, DEFAULT_TIME_TOLERANCE, EARTH_RADIUS_M,
};

use crate::core::grouper::DuplicateSet;
use crate::core::merge::{MergedMetadata, MetadataMerger};
use crate::core::record::{FileRecord, Observation};
use crate::core::resolver::AutomaticResolver;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Records whose metadata pairwise agrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictCluster {
    pub records: Vec<FileRecord>,
}

impl ConflictCluster {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.records.iter().map(|r| r.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Best timestamp and geotag across the cluster, in member order
    pub fn resolved(&self) -> Observation {
        Observation::new(
            self.records.iter().find_map(|r| r.best_timestamp()),
            self.records.iter().find_map(|r| r.best_geotag()),
        )
    }
}

/// Outcome of clustering one duplicate set
#[derive(Debug, Clone, PartialEq)]
pub enum PendingDecision {
    /// Metadata agrees; no human needed
    Automatic {
        keeper: PathBuf,
        merged: MergedMetadata,
        discards: Vec<PathBuf>,
    },
    /// Metadata disagrees; a resolver must choose
    NeedsManualChoice { clusters: Vec<ConflictCluster> },
}

impl PendingDecision {
    pub fn is_automatic(&self) -> bool {
        matches!(self, PendingDecision::Automatic { .. })
    }
}

/// Greedy tolerant-match clusterer
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictClusterer {
    tolerance: Tolerance,
}

impl ConflictClusterer {
    pub fn new(tolerance: Tolerance) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> &Tolerance {
        &self.tolerance
    }

    /// Partition `records` into conflict clusters
    pub fn cluster(&self, records: &[FileRecord]) -> Vec<ConflictCluster> {
        let mut clusters: Vec<ConflictCluster> = Vec::new();

        for record in records {
            let home = clusters.iter_mut().find(|c| {
                c.records
                    .iter()
                    .all(|member| self.tolerance.records_match(member, record))
            });

            match home {
                Some(cluster) => cluster.records.push(record.clone()),
                None => clusters.push(ConflictCluster {
                    records: vec![record.clone()],
                }),
            }
        }

        clusters
    }

    /// Cluster a duplicate set and decide whether it can be collapsed
    /// without asking anyone
    pub fn decide(&self, set: &DuplicateSet) -> PendingDecision {
        let mut clusters = self.cluster(&set.records);

        if clusters.len() == 1 {
            let cluster = clusters.remove(0);
            if let Some(resolution) = AutomaticResolver.resolve(&cluster) {
                if let Some(keeper) = resolution.keepers.into_iter().next() {
                    return PendingDecision::Automatic {
                        keeper,
                        merged: MetadataMerger::new().merge(&set.records),
                        discards: resolution.discards,
                    };
                }
            }
            clusters.push(cluster);
        }

        PendingDecision::NeedsManualChoice { clusters }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::ContentDigest;
    use crate::core::record::{GeoTag, ObservationSource};
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn timed(path: &str, time: NaiveDateTime) -> FileRecord {
        FileRecord::new(path, 100).with_observation(ObservationSource::Exif, Observation::at(time))
    }

    fn set(records: Vec<FileRecord>) -> DuplicateSet {
        DuplicateSet {
            digest: ContentDigest::from_bytes([0; 32]),
            records,
        }
    }

    #[test]
    fn four_seconds_apart_is_automatic() {
        let decision = ConflictClusterer::default().decide(&set(vec![
            timed("/a/x.jpg", ts(12, 0, 0)),
            timed("/b/x.jpg", ts(12, 0, 4)),
        ]));

        match decision {
            PendingDecision::Automatic {
                keeper,
                merged,
                discards,
            } => {
                assert_eq!(keeper, PathBuf::from("/a/x.jpg"));
                assert_eq!(discards.len(), 1);
                assert_eq!(merged.exif_observations.len(), 2);
            }
            other => panic!("expected automatic decision, got {other:?}"),
        }
    }

    #[test]
    fn one_hour_apart_needs_a_human() {
        let decision = ConflictClusterer::default().decide(&set(vec![
            timed("/a/x.jpg", ts(12, 0, 0)),
            timed("/b/x.jpg", ts(13, 0, 0)),
        ]));

        match decision {
            PendingDecision::NeedsManualChoice { clusters } => assert_eq!(clusters.len(), 2),
            other => panic!("expected manual choice, got {other:?}"),
        }
    }

    #[test]
    fn clusters_partition_the_input() {
        let records = vec![
            timed("/1", ts(12, 0, 0)),
            timed("/2", ts(13, 0, 0)),
            timed("/3", ts(12, 0, 3)),
            FileRecord::new("/4", 100),
            timed("/5", ts(13, 0, 5)),
        ];

        let clusters = ConflictClusterer::default().cluster(&records);

        let mut all: Vec<_> = clusters.iter().flat_map(|c| c.paths()).collect();
        all.sort();
        assert_eq!(all.len(), records.len());
        all.dedup();
        assert_eq!(all.len(), records.len());
        assert!(clusters.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn every_pair_in_a_cluster_matches() {
        let records: Vec<_> = (0..12)
            .map(|i| timed(&format!("/{i}"), ts(12, 0, (i * 3) as u32)))
            .collect();
        let clusterer = ConflictClusterer::default();

        for cluster in clusterer.cluster(&records) {
            for a in &cluster.records {
                for b in &cluster.records {
                    assert!(clusterer.tolerance().records_match(a, b));
                }
            }
        }
    }

    #[test]
    fn clustering_is_repeatable() {
        let records: Vec<_> = (0..10)
            .map(|i| timed(&format!("/{i}"), ts(12, 0, (i * 4) as u32)))
            .collect();
        let clusterer = ConflictClusterer::default();
        assert_eq!(clusterer.cluster(&records), clusterer.cluster(&records));
    }

    #[test]
    fn greedy_chain_depends_on_order() {
        // A~B and B~C, but A and C are 8 seconds apart.
        let a = timed("/a", ts(12, 0, 0));
        let b = timed("/b", ts(12, 0, 4));
        let c = timed("/c", ts(12, 0, 8));
        let clusterer = ConflictClusterer::default();

        let abc = clusterer.cluster(&[a.clone(), b.clone(), c.clone()]);
        assert_eq!(abc.len(), 2);
        assert_eq!(abc[0].paths(), vec![PathBuf::from("/a"), PathBuf::from("/b")]);

        let bac = clusterer.cluster(&[b, a, c]);
        assert_eq!(bac.len(), 2);
        assert_eq!(bac[1].paths(), vec![PathBuf::from("/c")]);
    }

    #[test]
    fn missing_geotag_on_one_side_splits() {
        let with_geo = timed("/a", ts(12, 0, 0)).with_observation(
            ObservationSource::Tool,
            Observation::new(None, Some(GeoTag::new(1.0, 1.0))),
        );
        let without = timed("/b", ts(12, 0, 0));

        let clusters = ConflictClusterer::default().cluster(&[with_geo, without]);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn metadata_less_copies_need_a_human() {
        let decision = ConflictClusterer::default().decide(&set(vec![
            FileRecord::new("/a/x.jpg", 1),
            FileRecord::new("/b/x.jpg", 1),
        ]));
        assert!(!decision.is_automatic());
    }

    #[test]
    fn cluster_resolved_view_uses_first_known_values() {
        let geo = GeoTag::new(3.0, 4.0);
        let cluster = ConflictCluster {
            records: vec![
                timed("/a", ts(12, 0, 0)),
                timed("/b", ts(12, 0, 1))
                    .with_observation(ObservationSource::Tool, Observation::new(None, Some(geo))),
            ],
        };
        assert_eq!(cluster.resolved(), Observation::new(Some(ts(12, 0, 0)), Some(geo)));
    }
}
