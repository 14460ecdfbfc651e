//! # Hasher Module
//!
//! Computes SHA-256 content digests for exact duplicate detection.
//!
//! ## How It Works
//! 1. Open the file and read it front to back through a fixed-size buffer
//! 2. Feed every chunk into SHA-256
//! 3. The digest depends only on the bytes, never on the path or name
//!
//! Files are never loaded into memory whole, so multi-gigabyte videos hash
//! with the same footprint as thumbnails.
//!
//! ## Parallelism
//! Hashing is the only parallel step of the engine. [`ContentHasher::hash_batch`]
//! runs on a dedicated rayon pool (CPU count - 1 workers by default) and
//! returns results in input order; callers merge them on one thread.
//!
//! ## Example
//! ```rust,ignore
//! use archive_dedup::core::hasher::HasherConfig;
//!
//! let hasher = HasherConfig::new().chunk_size(16 * 1024).build();
//! let digest = hasher.hash_file(&path)?;
//! ```

mod digest;

pub use digest::ContentDigest;

use crate::error::HashError;
use crate::events::{null_sender, Event, EventSender, HashEvent, HashProgress};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Smallest read buffer accepted by the builder
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;
/// Largest read buffer accepted by the builder
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;

/// Worker count for hashing: one core is left for the orchestrating thread
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Configuration builder for the content hasher
#[derive(Debug, Clone)]
pub struct HasherConfig {
    /// Read buffer size in bytes (4-64 KiB)
    chunk_size: usize,
    /// Threads used by `hash_batch`
    workers: usize,
}

impl HasherConfig {
    /// Create a new hasher configuration with defaults
    pub fn new() -> Self {
        Self {
            chunk_size: MAX_CHUNK_SIZE,
            workers: default_workers(),
        }
    }

    /// Set the read buffer size, clamped to 4-64 KiB
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self
    }

    /// Set the number of hashing threads (at least one)
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Build the hasher
    pub fn build(self) -> ContentHasher {
        ContentHasher {
            chunk_size: self.chunk_size,
            workers: self.workers,
        }
    }
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Streams files through SHA-256
#[derive(Debug, Clone)]
pub struct ContentHasher {
    chunk_size: usize,
    workers: usize,
}

impl ContentHasher {
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Hash one file.
    ///
    /// A missing file yields [`HashError::MissingFile`]; any other read
    /// failure yields [`HashError::Io`].
    pub fn hash_file(&self, path: &Path) -> Result<ContentDigest, HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path.to_path_buf(), e))?;
        self.hash_reader(file)
            .map_err(|e| HashError::from_io(path.to_path_buf(), e))
    }

    /// Hash any reader sequentially in `chunk_size` pieces
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> std::io::Result<ContentDigest> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..read]);
        }

        Ok(ContentDigest::from_bytes(hasher.finalize().into()))
    }

    /// Hash many files on a bounded worker pool.
    ///
    /// Results come back in the same order as `paths`.
    pub fn hash_batch(&self, paths: &[PathBuf]) -> Vec<(PathBuf, Result<ContentDigest, HashError>)> {
        self.hash_batch_with_events(paths, &null_sender())
    }

    /// Hash many files, emitting progress events
    pub fn hash_batch_with_events(
        &self,
        paths: &[PathBuf],
        events: &EventSender,
    ) -> Vec<(PathBuf, Result<ContentDigest, HashError>)> {
        let total = paths.len();
        events.send(Event::Hash(HashEvent::Started { total_files: total }));

        let completed = AtomicUsize::new(0);
        let hash_one = |path: &PathBuf| {
            let result = self.hash_file(path);
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            match &result {
                Ok(_) => events.send(Event::Hash(HashEvent::Progress(HashProgress {
                    completed: done,
                    total,
                    current_path: path.clone(),
                }))),
                Err(e) => events.send(Event::Hash(HashEvent::Error {
                    path: path.clone(),
                    message: e.to_string(),
                })),
            }
            (path.clone(), result)
        };

        let results: Vec<_> = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("hash-worker-{i}"))
            .build()
        {
            Ok(pool) => pool.install(|| paths.par_iter().map(hash_one).collect()),
            Err(e) => {
                tracing::warn!("hash pool unavailable ({e}), hashing on the current thread");
                paths.iter().map(hash_one).collect()
            }
        };

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        events.send(Event::Hash(HashEvent::Completed {
            hashed: total - failed,
            failed,
        }));

        results
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        HasherConfig::new().build()
    }
}
