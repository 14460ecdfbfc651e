//! Directory walking implementation using walkdir.

use super::filter::{is_hidden, MediaFilter};
use super::{FilenameParser, MediaKind, MediaScanner, ScanResult};
use crate::core::record::{FileRecord, Observation, ObservationSource};
use crate::error::ScanError;
use crate::events::{null_sender, Event, EventSender, ScanEvent};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Configuration for the directory scanner
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Whether to include hidden files and directories
    pub include_hidden: bool,
    /// Maximum directory depth (None = unlimited)
    pub max_depth: Option<usize>,
    /// Custom extensions to include (None = use defaults)
    pub extensions: Option<Vec<String>>,
    /// Directories never descended into (quarantine, state)
    pub exclude: Vec<PathBuf>,
}

/// Scanner implementation using the walkdir crate
pub struct WalkDirScanner {
    config: ScanConfig,
    filter: MediaFilter,
    names: FilenameParser,
    exclude: Vec<PathBuf>,
}

impl WalkDirScanner {
    pub fn new(config: ScanConfig) -> Self {
        let mut filter = MediaFilter::new().with_hidden(config.include_hidden);
        if let Some(ref extensions) = config.extensions {
            filter = filter.with_extensions(extensions.clone());
        }

        let exclude = config
            .exclude
            .iter()
            .map(|p| fs::canonicalize(p).unwrap_or_else(|_| p.clone()))
            .collect();

        Self {
            config,
            filter,
            names: FilenameParser::new(),
            exclude,
        }
    }

    fn descend_into(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        if !self.config.include_hidden && is_hidden(entry.path()) {
            return false;
        }
        !self.exclude.iter().any(|ex| entry.path() == ex.as_path())
    }

    fn record_for(&self, path: &Path, size: u64) -> FileRecord {
        let record = FileRecord::new(path, size);
        match self.names.parse(&record.name) {
            Some(taken) => record.with_observation(ObservationSource::Filename, Observation::at(taken)),
            None => record,
        }
    }

    fn scan_root(&self, root: &Path, events: &EventSender, result: &mut ScanResult) -> Result<(), ScanError> {
        let root = fs::canonicalize(root)
            .ok()
            .filter(|p| p.is_dir())
            .ok_or_else(|| ScanError::DirectoryNotFound {
                path: root.to_path_buf(),
            })?;

        let mut walker = WalkDir::new(&root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name();
        if let Some(depth) = self.config.max_depth {
            walker = walker.max_depth(depth);
        }

        for entry in walker.into_iter().filter_entry(|e| self.descend_into(e)) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    let error = ScanError::ReadEntry {
                        path: path.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!("{}", error);
                    events.send(Event::Scan(ScanEvent::Error {
                        path,
                        message: error.to_string(),
                    }));
                    result.errors.push(error);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.filter.should_include(entry.path()) {
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => {
                    let path = entry.path();
                    match self.filter.kind(path) {
                        MediaKind::Photo => result.photos += 1,
                        MediaKind::Video => result.videos += 1,
                    }
                    events.send(Event::Scan(ScanEvent::FileFound {
                        path: path.to_path_buf(),
                    }));
                    result.records.push(self.record_for(path, metadata.len()));
                }
                Err(e) => {
                    let error = ScanError::ReadEntry {
                        path: entry.path().to_path_buf(),
                        reason: e.to_string(),
                    };
                    tracing::warn!("{}", error);
                    result.errors.push(error);
                }
            }
        }

        Ok(())
    }
}

impl MediaScanner for WalkDirScanner {
    fn scan(&self, roots: &[PathBuf]) -> Result<ScanResult, ScanError> {
        self.scan_with_events(roots, &null_sender())
    }

    /// Walk every root; a missing root is recorded and the others are
    /// still scanned
    fn scan_with_events(
        &self,
        roots: &[PathBuf],
        events: &EventSender,
    ) -> Result<ScanResult, ScanError> {
        events.send(Event::Scan(ScanEvent::Started {
            roots: roots.to_vec(),
        }));

        let mut result = ScanResult::default();
        for root in roots {
            if let Err(e) = self.scan_root(root, events, &mut result) {
                tracing::warn!("Skipping {}: {}", root.display(), e);
                result.errors.push(e);
            }
        }

        tracing::info!(
            "Found {} photos and {} videos under {} root(s)",
            result.photos,
            result.videos,
            roots.len()
        );
        events.send(Event::Scan(ScanEvent::Completed {
            total_files: result.records.len(),
        }));

        Ok(result)
    }
}
