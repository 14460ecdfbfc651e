//! # Error Module
//!
//! Error types for the deduplication engine.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, file names, what went wrong
//! - **Per-file problems are recoverable** - missing files, hash failures and
//!   single failed moves are collected into summaries, not propagated
//! - **Step-level problems stop the run** - persistence failures and an
//!   unusable quarantine directory

use std::path::PathBuf;
use thiserror::Error;

/// Top-level engine error
#[derive(Error, Debug)]
pub enum DedupError {
    #[error("Hashing error: {0}")]
    Hash(#[from] HashError),

    #[error("Quarantine error: {0}")]
    Quarantine(#[from] QuarantineError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DedupError {
    /// Whether this error must stop processing of further duplicate sets
    pub fn is_fatal(&self) -> bool {
        match self {
            DedupError::Persistence(_) | DedupError::Config(_) => true,
            DedupError::Quarantine(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Errors that occur while computing content digests
#[derive(Error, Debug)]
pub enum HashError {
    #[error("File listed in metadata but missing on disk: {path}")]
    MissingFile { path: PathBuf },

    #[error("Failed to read {path} for hashing: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hash worker pool could not be started: {0}")]
    WorkerPool(String),
}

impl HashError {
    pub(crate) fn from_io(path: PathBuf, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            HashError::MissingFile { path }
        } else {
            HashError::Io { path, source }
        }
    }
}

/// Errors that occur while moving files into or out of quarantine
#[derive(Error, Debug)]
pub enum QuarantineError {
    #[error("Quarantine directory {path} cannot be created: {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot restore to {path}: a file already exists there")]
    RestoreTargetOccupied { path: PathBuf },

    #[error("Quarantined copy is missing: {path}")]
    QuarantinedFileMissing { path: PathBuf },

    #[error("Source file has no file name: {path}")]
    NoFileName { path: PathBuf },
}

impl QuarantineError {
    /// Only an unusable quarantine directory stops the run
    pub fn is_fatal(&self) -> bool {
        matches!(self, QuarantineError::DirectoryUnavailable { .. })
    }
}

/// Errors that occur while reading or writing persisted state
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to write {path} after {attempts} attempt(s): {source}")]
    WriteFailed {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file {path} is corrupted ({reason}). Restore it from a backup or delete it to start fresh.")]
    Corrupted { path: PathBuf, reason: String },

    #[error("Failed to serialize state for {path}: {reason}")]
    SerializationFailed { path: PathBuf, reason: String },
}

/// A resolver returned keeper/discard sets that break its contract
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error("Resolver kept no files for set {set_key}")]
    EmptyKeepers { set_key: String },

    #[error("Resolver listed {path} as both keeper and discard in set {set_key}")]
    Overlap { set_key: String, path: PathBuf },

    #[error("Resolver referenced {path}, which is not in set {set_key}")]
    UnknownFile { set_key: String, path: PathBuf },

    #[error("Resolver left {path} unassigned in set {set_key}")]
    Unassigned { set_key: String, path: PathBuf },
}

/// Errors that occur while discovering media files
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Failed to read {path}: {reason}")]
    ReadEntry { path: PathBuf, reason: String },
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, DedupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_classified_from_io() {
        let err = HashError::from_io(
            PathBuf::from("/photos/a.jpg"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(matches!(err, HashError::MissingFile { .. }));

        let err = HashError::from_io(
            PathBuf::from("/photos/a.jpg"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, HashError::Io { .. }));
    }

    #[test]
    fn persistence_errors_are_fatal() {
        let err = DedupError::from(PersistenceError::Corrupted {
            path: PathBuf::from("/state/consolidated_metadata.json"),
            reason: "EOF".to_string(),
        });
        assert!(err.is_fatal());
        assert!(err.to_string().contains("delete it to start fresh"));
    }

    #[test]
    fn only_directory_failures_are_fatal_quarantine_errors() {
        let dir = QuarantineError::DirectoryUnavailable {
            path: PathBuf::from("/q"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        let occupied = QuarantineError::RestoreTargetOccupied {
            path: PathBuf::from("/a/x.jpg"),
        };
        assert!(DedupError::from(dir).is_fatal());
        assert!(!DedupError::from(occupied).is_fatal());
    }

    #[test]
    fn resolver_error_includes_path() {
        let err = ResolverError::Unassigned {
            set_key: "abc".to_string(),
            path: PathBuf::from("/a/y.jpg"),
        };
        assert!(err.to_string().contains("/a/y.jpg"));
        assert!(!DedupError::from(err).is_fatal());
    }
}
