//! # archive-dedup CLI
//!
//! Command-line interface for the archive deduplicator.
//!
//! ## Usage
//! ```bash
//! archive-dedup scan ~/Takeout
//! archive-dedup dedupe --on-conflict ask
//! RUST_LOG=archive_dedup=debug archive-dedup dedupe --dry-run
//! ```

mod cli;

use archive_dedup::Result;

fn main() -> Result<()> {
    archive_dedup::init_tracing();
    cli::run()
}
