//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by the deduplication engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Media discovery events
    Scan(ScanEvent),
    /// Content hashing events
    Hash(HashEvent),
    /// Grouping and clustering events
    Group(GroupEvent),
    /// Quarantine and restore events
    Quarantine(QuarantineEvent),
    /// Engine-level events
    Engine(EngineEvent),
}

/// Events during media discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// Scanning has started
    Started { roots: Vec<PathBuf> },
    /// A media file was found
    FileFound { path: PathBuf },
    /// An entry could not be read (non-fatal)
    Error { path: PathBuf, message: String },
    /// Scanning completed
    Completed { total_files: usize },
}

/// Events during the hashing phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HashEvent {
    /// Hashing has started
    Started { total_files: usize },
    /// Progress update during hashing
    Progress(HashProgress),
    /// A file could not be hashed and was excluded
    Error { path: PathBuf, message: String },
    /// Hashing completed
    Completed { hashed: usize, failed: usize },
}

/// Progress information during hashing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashProgress {
    /// Number of files hashed so far
    pub completed: usize,
    /// Total number of files to hash
    pub total: usize,
    /// File just hashed
    pub current_path: PathBuf,
}

/// Events during grouping and clustering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GroupEvent {
    /// A file listed in the store is absent on disk
    MissingFile { path: PathBuf },
    /// Grouping finished
    SetsFound { sets: usize, files: usize },
    /// A duplicate set was collapsed
    SetCollapsed {
        set_key: String,
        kept: usize,
        quarantined: usize,
    },
    /// A duplicate set needs a human and was deferred
    SetDeferred { set_key: String, clusters: usize },
    /// A resolver answer was rejected
    SetRejected { set_key: String, message: String },
}

/// Events from the quarantine mover
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QuarantineEvent {
    /// A file was moved into quarantine
    Moved { from: PathBuf, to: PathBuf },
    /// A file could not be moved; siblings are unaffected
    MoveFailed { path: PathBuf, message: String },
    /// A file was moved back to its original location
    Restored { from: PathBuf, to: PathBuf },
    /// A file could not be restored
    RestoreFailed { path: PathBuf, message: String },
}

/// Engine-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A run has started
    Started,
    /// Moving to a new phase
    PhaseChanged { phase: EnginePhase },
    /// State was persisted
    StateSaved,
    /// The last group action was undone
    Undone { restored: usize },
    /// The run completed
    Completed { summary: RunStats },
    /// The run was cancelled between duplicate sets
    Cancelled,
    /// The run stopped on a fatal error
    Error { message: String },
}

/// Phases of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnginePhase {
    Grouping,
    Hashing,
    Resolving,
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnginePhase::Grouping => write!(f, "Grouping"),
            EnginePhase::Hashing => write!(f, "Hashing"),
            EnginePhase::Resolving => write!(f, "Resolving"),
        }
    }
}

/// Counters reported when a run completes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub sets_found: usize,
    pub sets_collapsed: usize,
    /// Sets where no discard could be moved; every file is still in place
    pub sets_failed: usize,
    pub sets_deferred: usize,
    pub sets_rejected: usize,
    pub files_quarantined: usize,
    pub bytes_reclaimed: u64,
}
