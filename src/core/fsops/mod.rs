//! # File Operations Module
//!
//! Shared helpers for every file-system mutation the engine performs.
//!
//! - [`retry_io`] - bounded retry with exponential backoff for transient
//!   failures (a reader briefly holding a file open, interrupted calls).
//!   Quarantine moves and state persistence both go through it.
//! - [`write_atomic`] - temp file in the destination directory, flush,
//!   fsync, rename over the destination. A reader never observes a
//!   partially written file, and a failed write leaves the old one intact.

mod atomic;

pub use atomic::{write_atomic, write_json_atomic, read_json, AtomicWriter, StagedWrite};

use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub factor: u32,
}

impl RetryPolicy {
    pub fn new(attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            initial_backoff,
            factor: 2,
        }
    }

    /// A single attempt, no retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay after the given failed attempt (1-based)
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        self.initial_backoff
            .saturating_mul(self.factor.saturating_pow(exponent))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

/// Whether an I/O error is worth retrying
pub fn is_transient(error: &io::Error) -> bool {
    match error.kind() {
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => true,
        _ => is_sharing_violation(error),
    }
}

#[cfg(windows)]
fn is_sharing_violation(error: &io::Error) -> bool {
    // ERROR_ACCESS_DENIED, ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    matches!(error.raw_os_error(), Some(5) | Some(32) | Some(33))
}

#[cfg(not(windows))]
fn is_sharing_violation(error: &io::Error) -> bool {
    // EBUSY / ETXTBSY
    matches!(error.raw_os_error(), Some(16) | Some(26))
}

/// Run `op`, retrying transient failures according to `policy`.
///
/// Returns the last error together with the number of attempts made.
pub fn retry_io<T, F>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, (io::Error, u32)>
where
    F: FnMut() -> io::Result<T>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.attempts && is_transient(&e) => {
                let delay = policy.backoff_after(attempt);
                tracing::debug!(
                    "{what} failed on attempt {attempt}/{} ({e}), retrying in {delay:?}",
                    policy.attempts
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err((e, attempt)),
        }
    }
}
