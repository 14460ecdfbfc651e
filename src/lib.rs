//! # Archive Dedup
//!
//! Removes duplicate photos and videos from exported archives without
//! losing the metadata each copy carried.
//!
//! ## Core Philosophy
//! - **Never delete** - discards go to a quarantine directory and can come back
//! - **Never guess** - copies that disagree on when or where go to a resolver
//! - **Keep everything known** - survivors carry the union of all observations
//!
//! ## Architecture
//! - `core` - The deduplication engine
//! - `events` - Event-driven progress reporting
//! - `error` - Error types
//! - `cli` - Command-line interface (binary only)

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{DedupError, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default tracing subscriber");
}
