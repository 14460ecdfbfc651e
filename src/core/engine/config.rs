//! Engine configuration and its builder.

use crate::core::cluster::Tolerance;
use crate::core::fsops::RetryPolicy;
use crate::core::hasher::{default_workers, HasherConfig, ContentHasher, MAX_CHUNK_SIZE};
use crate::core::store::StatePaths;
use crate::error::DedupError;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-user data directory
pub const APP_DIR_NAME: &str = "archive-dedup";

/// `<data dir>/archive-dedup`, if the platform has a data directory
pub fn default_state_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_DIR_NAME))
}

/// Explicit context for every engine entry point
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Where the persisted state files live
    pub state_dir: PathBuf,
    /// Flat directory receiving discarded duplicates
    pub quarantine_dir: PathBuf,
    pub tolerance: Tolerance,
    pub retry: RetryPolicy,
    /// Hash read buffer in bytes
    pub chunk_size: usize,
    /// Hash worker threads
    pub workers: usize,
}

impl EngineConfig {
    pub fn builder(state_dir: impl Into<PathBuf>) -> EngineConfigBuilder {
        EngineConfigBuilder::new(state_dir)
    }

    pub fn state_paths(&self) -> StatePaths {
        StatePaths::in_dir(&self.state_dir)
    }

    pub(crate) fn hasher(&self) -> ContentHasher {
        HasherConfig::new()
            .chunk_size(self.chunk_size)
            .workers(self.workers)
            .build()
    }
}

/// Builder for [`EngineConfig`]
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    state_dir: PathBuf,
    quarantine_dir: Option<PathBuf>,
    tolerance: Tolerance,
    retry: RetryPolicy,
    chunk_size: usize,
    workers: usize,
}

impl EngineConfigBuilder {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            quarantine_dir: None,
            tolerance: Tolerance::default(),
            retry: RetryPolicy::default(),
            chunk_size: MAX_CHUNK_SIZE,
            workers: default_workers(),
        }
    }

    /// Defaults to `<state_dir>/quarantine`
    pub fn quarantine_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.quarantine_dir = Some(dir.into());
        self
    }

    pub fn tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn time_tolerance(mut self, time: Duration) -> Self {
        self.tolerance.time = time;
        self
    }

    pub fn geo_tolerance_m(mut self, meters: f64) -> Self {
        self.tolerance.geo_meters = meters;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Clamped to 4-64 KiB by the hasher
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn build(self) -> Result<EngineConfig, DedupError> {
        let geo = self.tolerance.geo_meters;
        if !geo.is_finite() || geo < 0.0 {
            return Err(DedupError::Config(format!(
                "geo tolerance must be a non-negative number of meters, got {geo}"
            )));
        }

        let quarantine_dir = self
            .quarantine_dir
            .unwrap_or_else(|| self.state_dir.join("quarantine"));

        if same_dir(&quarantine_dir, &self.state_dir) {
            return Err(DedupError::Config(format!(
                "quarantine directory {} must differ from the state directory",
                quarantine_dir.display()
            )));
        }

        Ok(EngineConfig {
            state_dir: self.state_dir,
            quarantine_dir,
            tolerance: self.tolerance,
            retry: self.retry,
            chunk_size: self.chunk_size,
            workers: self.workers,
        })
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
