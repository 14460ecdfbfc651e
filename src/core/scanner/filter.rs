//! File filtering logic for the scanner.

use super::MediaKind;
use std::collections::HashSet;
use std::path::Path;

const DEFAULT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "heic", "heif", "gif", "webp", "tif", "tiff", "dng", "cr2", "nef",
    "arw", "mp4", "mov", "m4v", "avi", "mkv", "3gp", "mts",
];

/// Decides which files are media the engine should track
pub struct MediaFilter {
    extensions: HashSet<String>,
    include_hidden: bool,
}

impl MediaFilter {
    /// Filter accepting common photo and video extensions
    pub fn new() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            include_hidden: false,
        }
    }

    /// Include hidden files (starting with .)
    pub fn with_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Override the accepted extensions
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    pub fn should_include(&self, path: &Path) -> bool {
        if !self.include_hidden && is_hidden(path) {
            return false;
        }

        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }

    pub fn kind(&self, path: &Path) -> MediaKind {
        path.extension()
            .and_then(|e| e.to_str())
            .map(MediaKind::from_extension)
            .unwrap_or(MediaKind::Photo)
    }
}

impl Default for MediaFilter {
    fn default() -> Self {
        Self::new()
    }
}

pub(super) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
