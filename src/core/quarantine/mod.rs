//! # Quarantine Module
//!
//! Moves discarded duplicates into a flat quarantine directory instead of
//! deleting them, and moves them back on undo.
//!
//! ## Naming
//! A file keeps its name when it can. If `x.jpg` is taken (on disk, or by
//! an earlier file in the same call) the next free of `x (1).jpg`,
//! `x (2).jpg`, ... is used.
//!
//! ## Moving
//! `fs::rename` first. If that fails (different volume, for example) the
//! file is copied, the copy's size is verified, and only then is the
//! source removed. A failed copy never leaves a half-written file behind.
//!
//! One failing file never affects its siblings: the caller gets the exact
//! map of files that moved plus a list of the ones that did not.

mod manifest;

pub use manifest::QuarantineManifest;

use crate::core::fsops::{retry_io, RetryPolicy};
use crate::error::QuarantineError;
use crate::events::{null_sender, Event, EventSender, QuarantineEvent};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Result of a [`QuarantineMover::quarantine`] call
#[derive(Debug, Default)]
pub struct QuarantineReport {
    /// Original path -> quarantine path, for every file that moved
    pub moved: BTreeMap<PathBuf, PathBuf>,
    /// Files that stayed where they were
    pub failures: Vec<(PathBuf, QuarantineError)>,
}

impl QuarantineReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of a [`QuarantineMover::restore`] call
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Quarantine path -> original path, for every file put back
    pub restored: BTreeMap<PathBuf, PathBuf>,
    /// Quarantine paths that could not be put back
    pub failures: Vec<(PathBuf, QuarantineError)>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Moves files into and out of the quarantine directory
#[derive(Clone)]
pub struct QuarantineMover {
    dir: PathBuf,
    retry: RetryPolicy,
    events: EventSender,
}

impl QuarantineMover {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            retry: RetryPolicy::default(),
            events: null_sender(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the quarantine directory if needed
    pub fn ensure_dir(&self) -> Result<(), QuarantineError> {
        fs::create_dir_all(&self.dir).map_err(|source| QuarantineError::DirectoryUnavailable {
            path: self.dir.clone(),
            source,
        })
    }

    /// Move every path into quarantine.
    ///
    /// Only an unusable quarantine directory is an error; per-file
    /// problems end up in [`QuarantineReport::failures`].
    pub fn quarantine(&self, paths: &[PathBuf]) -> Result<QuarantineReport, QuarantineError> {
        self.ensure_dir()?;

        let mut report = QuarantineReport::default();
        let mut claimed: HashSet<PathBuf> = HashSet::new();

        for path in paths {
            match self.quarantine_one(path, &mut claimed) {
                Ok(dest) => {
                    tracing::info!("Quarantined {} -> {}", path.display(), dest.display());
                    self.events.send(Event::Quarantine(QuarantineEvent::Moved {
                        from: path.clone(),
                        to: dest.clone(),
                    }));
                    report.moved.insert(path.clone(), dest);
                }
                Err(e) => {
                    tracing::warn!("Could not quarantine {}: {}", path.display(), e);
                    self.events.send(Event::Quarantine(QuarantineEvent::MoveFailed {
                        path: path.clone(),
                        message: e.to_string(),
                    }));
                    report.failures.push((path.clone(), e));
                }
            }
        }

        Ok(report)
    }

    fn quarantine_one(
        &self,
        path: &Path,
        claimed: &mut HashSet<PathBuf>,
    ) -> Result<PathBuf, QuarantineError> {
        let file_name = path
            .file_name()
            .ok_or_else(|| QuarantineError::NoFileName {
                path: path.to_path_buf(),
            })?;

        let dest = free_destination(&self.dir, Path::new(file_name), claimed);
        claimed.insert(dest.clone());

        move_file(path, &dest, &self.retry).map_err(|source| QuarantineError::MoveFailed {
            from: path.to_path_buf(),
            to: dest.clone(),
            source,
        })?;

        Ok(dest)
    }

    /// Move quarantined files back to their original locations.
    ///
    /// `map` is quarantine path -> original path. An occupied original
    /// location fails that entry only.
    pub fn restore(&self, map: &BTreeMap<PathBuf, PathBuf>) -> RestoreReport {
        let mut report = RestoreReport::default();

        for (quarantined, original) in map {
            match self.restore_one(quarantined, original) {
                Ok(()) => {
                    tracing::info!(
                        "Restored {} -> {}",
                        quarantined.display(),
                        original.display()
                    );
                    self.events.send(Event::Quarantine(QuarantineEvent::Restored {
                        from: quarantined.clone(),
                        to: original.clone(),
                    }));
                    report.restored.insert(quarantined.clone(), original.clone());
                }
                Err(e) => {
                    tracing::warn!("Could not restore {}: {}", quarantined.display(), e);
                    self.events.send(Event::Quarantine(QuarantineEvent::RestoreFailed {
                        path: quarantined.clone(),
                        message: e.to_string(),
                    }));
                    report.failures.push((quarantined.clone(), e));
                }
            }
        }

        report
    }

    fn restore_one(&self, quarantined: &Path, original: &Path) -> Result<(), QuarantineError> {
        if !quarantined.exists() {
            return Err(QuarantineError::QuarantinedFileMissing {
                path: quarantined.to_path_buf(),
            });
        }
        if original.exists() {
            return Err(QuarantineError::RestoreTargetOccupied {
                path: original.to_path_buf(),
            });
        }

        let move_failed = |source: io::Error| QuarantineError::MoveFailed {
            from: quarantined.to_path_buf(),
            to: original.to_path_buf(),
            source,
        };

        if let Some(parent) = original.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(move_failed)?;
        }

        move_file(quarantined, original, &self.retry).map_err(move_failed)
    }
}

/// First of `name.ext`, `name (1).ext`, `name (2).ext`, ... that is free
/// on disk and not in `claimed`
pub fn free_destination(dir: &Path, file_name: &Path, claimed: &HashSet<PathBuf>) -> PathBuf {
    let is_free = |candidate: &Path| !candidate.exists() && !claimed.contains(candidate);

    let first = dir.join(file_name);
    if is_free(&first) {
        return first;
    }

    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = file_name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n: u64 = 1;
    loop {
        let candidate = dir.join(format!("{stem} ({n}){ext}"));
        if is_free(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Rename `from` to `to`, falling back to copy + verify + delete.
///
/// `to` must not exist.
pub(crate) fn move_file(from: &Path, to: &Path, retry: &RetryPolicy) -> io::Result<()> {
    let rename_err = match retry_io(retry, "rename", || fs::rename(from, to)) {
        Ok(()) => return Ok(()),
        Err((e, _)) => e,
    };

    if rename_err.kind() == io::ErrorKind::NotFound {
        return Err(rename_err);
    }

    tracing::debug!(
        "rename {} -> {} failed ({}), copying instead",
        from.display(),
        to.display(),
        rename_err
    );
    copy_then_remove(from, to, retry)
}

fn copy_then_remove(from: &Path, to: &Path, retry: &RetryPolicy) -> io::Result<()> {
    let source_size = fs::metadata(from)?.len();

    if let Err(e) = retry_io(retry, "copy", || fs::copy(from, to)) {
        let _ = fs::remove_file(to);
        return Err(e.0);
    }

    let dest_size = fs::metadata(to)?.len();
    if dest_size != source_size {
        let _ = fs::remove_file(to);
        return Err(io::Error::other(format!(
            "copy verification failed: source {source_size} bytes, destination {dest_size} bytes"
        )));
    }

    if let Err((e, _)) = retry_io(retry, "remove source", || fs::remove_file(from)) {
        // Leave exactly one copy in place.
        let _ = fs::remove_file(to);
        return Err(e);
    }

    Ok(())
}
