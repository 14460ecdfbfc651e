//! Tolerant equality for capture time and location.

use crate::core::record::{FileRecord, GeoTag, Observation};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Mean Earth radius in meters (IUGG)
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Default maximum capture time difference
pub const DEFAULT_TIME_TOLERANCE: Duration = Duration::from_secs(5);

/// Default maximum distance between geotags
pub const DEFAULT_GEO_TOLERANCE_M: f64 = 10.0;

/// How far two observations may differ and still agree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub time: Duration,
    pub geo_meters: f64,
}

impl Tolerance {
    pub fn new(time: Duration, geo_meters: f64) -> Self {
        Self { time, geo_meters }
    }

    /// Inclusive: a difference equal to the tolerance matches
    pub fn times_match(&self, a: NaiveDateTime, b: NaiveDateTime) -> bool {
        let delta = if a >= b { a - b } else { b - a };
        delta.to_std().map(|d| d <= self.time).unwrap_or(false)
    }

    /// Inclusive: a distance equal to the tolerance matches
    pub fn places_match(&self, a: GeoTag, b: GeoTag) -> bool {
        haversine_m(a, b) <= self.geo_meters
    }

    /// Both dimensions must match. Per dimension: both present -> within
    /// tolerance; only one present -> mismatch; neither -> match.
    pub fn observations_match(&self, a: &Observation, b: &Observation) -> bool {
        let time_ok = match (a.timestamp, b.timestamp) {
            (Some(x), Some(y)) => self.times_match(x, y),
            (None, None) => true,
            _ => false,
        };
        let geo_ok = match (a.geotag, b.geotag) {
            (Some(x), Some(y)) => self.places_match(x, y),
            (None, None) => true,
            _ => false,
        };
        time_ok && geo_ok
    }

    /// Compare the prioritized views of two records.
    ///
    /// A record with no timestamp and no geotag never matches.
    pub fn records_match(&self, a: &FileRecord, b: &FileRecord) -> bool {
        if !a.has_metadata() || !b.has_metadata() {
            return false;
        }
        self.observations_match(&a.resolved(), &b.resolved())
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_TOLERANCE, DEFAULT_GEO_TOLERANCE_M)
    }
}

/// Great-circle distance in meters
pub fn haversine_m(a: GeoTag, b: GeoTag) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}
