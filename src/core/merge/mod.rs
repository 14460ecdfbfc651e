//! # Merge Module
//!
//! Unions the observation lists of records collapsed into one survivor.
//!
//! Merging never discards information: every distinct `(timestamp, geotag)`
//! pair seen in any input survives, once, in first-seen order. An explicit
//! choice made while resolving a conflict is placed first in the user list
//! so that prioritized lookups pick it up.

use crate::core::record::{FileRecord, Observation, ObservationSource};
use serde::{Deserialize, Serialize};

/// Observation lists for a surviving record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedMetadata {
    pub exif_observations: Vec<Observation>,
    pub filename_observations: Vec<Observation>,
    pub tool_observations: Vec<Observation>,
    pub user_observations: Vec<Observation>,
    pub duration: Option<f64>,
}

impl MergedMetadata {
    pub fn observations(&self, source: ObservationSource) -> &[Observation] {
        match source {
            ObservationSource::User => &self.user_observations,
            ObservationSource::Exif => &self.exif_observations,
            ObservationSource::Tool => &self.tool_observations,
            ObservationSource::Filename => &self.filename_observations,
        }
    }

    fn observations_mut(&mut self, source: ObservationSource) -> &mut Vec<Observation> {
        match source {
            ObservationSource::User => &mut self.user_observations,
            ObservationSource::Exif => &mut self.exif_observations,
            ObservationSource::Tool => &mut self.tool_observations,
            ObservationSource::Filename => &mut self.filename_observations,
        }
    }

    pub fn observation_count(&self) -> usize {
        ObservationSource::PRIORITY
            .iter()
            .map(|s| self.observations(*s).len())
            .sum()
    }

    /// Replace the record's observation lists with the merged ones
    pub fn apply_to(&self, record: &mut FileRecord) {
        for source in ObservationSource::PRIORITY {
            *record.observations_mut(source) = self.observations(source).to_vec();
        }
        if self.duration.is_some() {
            record.duration = self.duration;
        }
    }
}

/// Computes merged metadata for duplicate sets
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataMerger;

impl MetadataMerger {
    pub fn new() -> Self {
        Self
    }

    /// De-duplicated union of every observation list
    pub fn merge(&self, records: &[FileRecord]) -> MergedMetadata {
        let mut merged = MergedMetadata::default();

        for record in records {
            for source in ObservationSource::PRIORITY {
                let list = merged.observations_mut(source);
                for observation in record.observations(source) {
                    if !list.contains(observation) {
                        list.push(*observation);
                    }
                }
            }
            if merged.duration.is_none() {
                merged.duration = record.duration;
            }
        }

        merged
    }

    /// Merge, then put an explicit choice first in the user list.
    ///
    /// An empty choice (no timestamp, no geotag) is ignored.
    pub fn merge_with_choice(
        &self,
        records: &[FileRecord],
        choice: Option<Observation>,
    ) -> MergedMetadata {
        let mut merged = self.merge(records);

        if let Some(choice) = choice.filter(|c| !c.is_empty()) {
            merged.user_observations.retain(|o| o != &choice);
            merged.user_observations.insert(0, choice);
        }

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::GeoTag;
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, s)
            .unwrap()
    }

    fn sorted(list: &[Observation]) -> Vec<String> {
        let mut keys: Vec<_> = list.iter().map(|o| format!("{:?}", o)).collect();
        keys.sort();
        keys
    }

    fn record_a() -> FileRecord {
        FileRecord::new("/a/x.jpg", 1)
            .with_observation(ObservationSource::Exif, Observation::at(ts(0)))
            .with_observation(ObservationSource::Filename, Observation::at(ts(0)))
    }

    fn record_b() -> FileRecord {
        FileRecord::new("/b/x.jpg", 1)
            .with_observation(ObservationSource::Exif, Observation::at(ts(0)))
            .with_observation(ObservationSource::Exif, Observation::at(ts(3)))
            .with_observation(
                ObservationSource::Tool,
                Observation::new(None, Some(GeoTag::new(1.0, 2.0))),
            )
    }

    #[test]
    fn merge_is_deduplicated_union() {
        let merged = MetadataMerger::new().merge(&[record_a(), record_b()]);

        assert_eq!(
            merged.exif_observations,
            vec![Observation::at(ts(0)), Observation::at(ts(3))]
        );
        assert_eq!(merged.filename_observations.len(), 1);
        assert_eq!(merged.tool_observations.len(), 1);
        assert_eq!(merged.observation_count(), 4);
    }

    #[test]
    fn merge_is_order_independent_as_a_set() {
        let merger = MetadataMerger::new();
        let ab = merger.merge(&[record_a(), record_b()]);
        let ba = merger.merge(&[record_b(), record_a()]);

        for source in ObservationSource::PRIORITY {
            assert_eq!(sorted(ab.observations(source)), sorted(ba.observations(source)));
        }
    }

    #[test]
    fn merge_is_associative() {
        let merger = MetadataMerger::new();
        let c = FileRecord::new("/c/x.jpg", 1)
            .with_observation(ObservationSource::User, Observation::at(ts(9)));

        let mut ab = FileRecord::new("/ab", 1);
        merger.merge(&[record_a(), record_b()]).apply_to(&mut ab);
        let left = merger.merge(&[ab, c.clone()]);

        let mut bc = FileRecord::new("/bc", 1);
        merger.merge(&[record_b(), c]).apply_to(&mut bc);
        let right = merger.merge(&[record_a(), bc]);

        for source in ObservationSource::PRIORITY {
            assert_eq!(sorted(left.observations(source)), sorted(right.observations(source)));
        }
    }

    #[test]
    fn choice_is_prepended_without_losing_history() {
        let earlier = Observation::at(ts(1));
        let chosen = Observation::new(Some(ts(0)), Some(GeoTag::new(5.0, 5.0)));
        let records = vec![
            record_a().with_observation(ObservationSource::User, earlier),
            record_b().with_observation(ObservationSource::User, chosen),
        ];

        let merged = MetadataMerger::new().merge_with_choice(&records, Some(chosen));

        assert_eq!(merged.user_observations, vec![chosen, earlier]);
    }

    #[test]
    fn empty_choice_is_ignored() {
        let merged = MetadataMerger::new().merge_with_choice(&[record_a()], Some(Observation::default()));
        assert!(merged.user_observations.is_empty());
    }

    #[test]
    fn apply_overwrites_lists_and_keeps_known_duration() {
        let mut video = FileRecord::new("/v.mp4", 1);
        video.duration = Some(12.5);
        let merged = MetadataMerger::new().merge(&[record_a()]);

        merged.apply_to(&mut video);

        assert_eq!(video.exif_observations, record_a().exif_observations);
        assert_eq!(video.duration, Some(12.5));
    }
}
