//! # Core Module
//!
//! The UI-agnostic deduplication engine.
//!
//! ## Modules
//! - `record` - Per-file metadata observations
//! - `store` - Consolidated metadata store and persisted state
//! - `scanner` - Discovers photos and videos in directories
//! - `hasher` - SHA-256 content digests
//! - `grouper` - Name/size then content grouping into duplicate sets
//! - `cluster` - Splits a set by timestamp/geotag agreement
//! - `merge` - Union of metadata across a set
//! - `resolver` - Keeper/discard decisions for conflicting sets
//! - `quarantine` - Moves discards aside and back
//! - `journal` - Undo of set actions
//! - `fsops` - Retries and atomic writes
//! - `engine` - Orchestrates a full run

pub mod cluster;
pub mod engine;
pub mod fsops;
pub mod grouper;
pub mod hasher;
pub mod journal;
pub mod merge;
pub mod quarantine;
pub mod record;
pub mod resolver;
pub mod scanner;
pub mod store;

// Re-export commonly used types
pub use cluster::{ConflictCluster, ConflictClusterer, PendingDecision, Tolerance};
pub use engine::{
    CancellationToken, DedupEngine, DetectionReport, EngineConfig, RunSummary, SetOutcome,
};
pub use grouper::DuplicateSet;
pub use hasher::ContentDigest;
pub use record::{FileRecord, GeoTag, Observation, ObservationSource};
pub use resolver::{Resolution, Resolver};
