//! # Scanner Module
//!
//! Discovers photos and videos on disk and turns them into bare
//! [`FileRecord`]s (path, name, size) ready for the metadata store.
//!
//! EXIF and media-probe values come from upstream extractors and are
//! ingested separately; the scanner only contributes what the file name
//! says about the capture time, as a `filename` observation.
//!
//! ## Example
//! ```rust,ignore
//! use archive_dedup::core::scanner::{MediaScanner, ScanConfig, WalkDirScanner};
//!
//! let scanner = WalkDirScanner::new(ScanConfig::default());
//! let result = scanner.scan(&["/archive/takeout".into()])?;
//! store.ingest(result.records);
//! ```

mod filename;
mod filter;
mod walker;

pub use filename::FilenameParser;
pub use filter::MediaFilter;
pub use walker::{ScanConfig, WalkDirScanner};

use crate::core::record::FileRecord;
use crate::error::ScanError;
use crate::events::EventSender;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Broad media category, decided by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "mp4" | "mov" | "m4v" | "avi" | "mkv" | "3gp" | "mts" => MediaKind::Video,
            _ => MediaKind::Photo,
        }
    }
}

/// Result of a scan operation
#[derive(Debug, Default)]
pub struct ScanResult {
    /// One record per discovered file, in walk order
    pub records: Vec<FileRecord>,
    /// Entries that could not be read (non-fatal)
    pub errors: Vec<ScanError>,
    pub photos: usize,
    pub videos: usize,
}

/// Media discovery
///
/// Implement this trait to feed the engine from somewhere other than a
/// directory walk (tests, remote listings).
pub trait MediaScanner: Send + Sync {
    fn scan(&self, roots: &[PathBuf]) -> Result<ScanResult, ScanError>;

    fn scan_with_events(
        &self,
        roots: &[PathBuf],
        events: &EventSender,
    ) -> Result<ScanResult, ScanError>;
}
