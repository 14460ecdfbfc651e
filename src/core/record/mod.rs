//! # Record Module
//!
//! The per-file metadata record handed to the engine by upstream extractors.
//!
//! A record carries four append-only observation lists, one per source:
//! - `exif_observations` - values read from embedded EXIF tags
//! - `filename_observations` - values parsed from camera naming patterns
//! - `tool_observations` - values reported by media probing tools
//! - `user_observations` - explicit choices, highest priority
//!
//! The lists keep raw history; [`FileRecord::best_timestamp`] and
//! [`FileRecord::best_geotag`] give the prioritized view.

use crate::core::hasher::ContentDigest;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A GPS position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTag {
    pub lat: f64,
    pub lon: f64,
}

impl GeoTag {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl std::fmt::Display for GeoTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lon)
    }
}

/// One observation of capture time and/or location
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
    #[serde(default)]
    pub geotag: Option<GeoTag>,
}

impl Observation {
    pub fn new(timestamp: Option<NaiveDateTime>, geotag: Option<GeoTag>) -> Self {
        Self { timestamp, geotag }
    }

    pub fn at(timestamp: NaiveDateTime) -> Self {
        Self::new(Some(timestamp), None)
    }

    /// Neither timestamp nor geotag
    pub fn is_empty(&self) -> bool {
        self.timestamp.is_none() && self.geotag.is_none()
    }
}

/// Which list an observation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationSource {
    User,
    Exif,
    Tool,
    Filename,
}

impl ObservationSource {
    /// Sources from highest to lowest priority
    pub const PRIORITY: [ObservationSource; 4] = [
        ObservationSource::User,
        ObservationSource::Exif,
        ObservationSource::Tool,
        ObservationSource::Filename,
    ];
}

/// Metadata for one file in the archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Canonical path, unique within the store
    pub path: PathBuf,
    /// File name including extension
    pub name: String,
    /// File size in bytes
    pub size: u64,
    /// SHA-256 of the file contents, computed lazily
    #[serde(default)]
    pub content_hash: Option<ContentDigest>,
    /// Media length in seconds (videos)
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub exif_observations: Vec<Observation>,
    #[serde(default)]
    pub filename_observations: Vec<Observation>,
    #[serde(default)]
    pub tool_observations: Vec<Observation>,
    #[serde(default)]
    pub user_observations: Vec<Observation>,
    /// Where the file currently sits if it has been quarantined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarantine_path: Option<PathBuf>,
}

impl FileRecord {
    /// Create a metadata-less record; the name is taken from the path
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            name,
            size,
            content_hash: None,
            duration: None,
            exif_observations: Vec::new(),
            filename_observations: Vec::new(),
            tool_observations: Vec::new(),
            user_observations: Vec::new(),
            quarantine_path: None,
        }
    }

    pub fn with_hash(mut self, digest: ContentDigest) -> Self {
        self.content_hash = Some(digest);
        self
    }

    pub fn with_observation(mut self, source: ObservationSource, observation: Observation) -> Self {
        self.observations_mut(source).push(observation);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn observations(&self, source: ObservationSource) -> &[Observation] {
        match source {
            ObservationSource::User => &self.user_observations,
            ObservationSource::Exif => &self.exif_observations,
            ObservationSource::Tool => &self.tool_observations,
            ObservationSource::Filename => &self.filename_observations,
        }
    }

    pub fn observations_mut(&mut self, source: ObservationSource) -> &mut Vec<Observation> {
        match source {
            ObservationSource::User => &mut self.user_observations,
            ObservationSource::Exif => &mut self.exif_observations,
            ObservationSource::Tool => &mut self.tool_observations,
            ObservationSource::Filename => &mut self.filename_observations,
        }
    }

    /// All observations in priority order
    pub fn prioritized(&self) -> impl Iterator<Item = &Observation> {
        ObservationSource::PRIORITY
            .iter()
            .flat_map(move |source| self.observations(*source).iter())
    }

    pub fn observation_count(&self) -> usize {
        self.exif_observations.len()
            + self.filename_observations.len()
            + self.tool_observations.len()
            + self.user_observations.len()
    }

    /// First timestamp in priority order (user, exif, tool, filename)
    pub fn best_timestamp(&self) -> Option<NaiveDateTime> {
        self.prioritized().find_map(|o| o.timestamp)
    }

    /// First geotag in priority order (user, exif, tool, filename)
    pub fn best_geotag(&self) -> Option<GeoTag> {
        self.prioritized().find_map(|o| o.geotag)
    }

    /// The record's resolved observation used for conflict matching
    pub fn resolved(&self) -> Observation {
        Observation::new(self.best_timestamp(), self.best_geotag())
    }

    /// Whether any source supplied a timestamp or geotag
    pub fn has_metadata(&self) -> bool {
        !self.resolved().is_empty()
    }

    pub fn is_quarantined(&self) -> bool {
        self.quarantine_path.is_some()
    }

    /// Append observations from another record of the same file,
    /// skipping entries that are already present
    pub fn absorb(&mut self, other: &FileRecord) {
        for source in ObservationSource::PRIORITY {
            let incoming = other.observations(source).to_vec();
            let list = self.observations_mut(source);
            for observation in incoming {
                if !list.contains(&observation) {
                    list.push(observation);
                }
            }
        }
        if self.duration.is_none() {
            self.duration = other.duration;
        }
    }
}
