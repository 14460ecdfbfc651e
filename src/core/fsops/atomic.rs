//! Crash-safe persistence using temp file + rename.

use super::{retry_io, RetryPolicy};
use crate::error::PersistenceError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Writes files so that the destination is either the old or the new
/// content, never a mix.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicWriter {
    retry: RetryPolicy,
}

impl AtomicWriter {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Write `data` to a sibling temp file and fsync it.
    ///
    /// The destination is not touched until [`StagedWrite::commit`].
    /// Dropping the staged write removes the temp file.
    pub fn stage(&self, data: &[u8], dest: &Path) -> Result<StagedWrite, PersistenceError> {
        let write_failed = |source: io::Error| PersistenceError::WriteFailed {
            path: dest.to_path_buf(),
            attempts: 1,
            source,
        };

        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(write_failed)?;

        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".to_string());

        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".tmp")
            .tempfile_in(&parent)
            .map_err(write_failed)?;

        temp.write_all(data).map_err(write_failed)?;
        temp.flush().map_err(write_failed)?;
        temp.as_file().sync_all().map_err(write_failed)?;

        Ok(StagedWrite {
            temp,
            dest: dest.to_path_buf(),
            retry: self.retry,
        })
    }

    /// Serialize `value` as pretty JSON and stage it
    pub fn stage_json<T: Serialize + ?Sized>(
        &self,
        value: &T,
        dest: &Path,
    ) -> Result<StagedWrite, PersistenceError> {
        let data =
            serde_json::to_vec_pretty(value).map_err(|e| PersistenceError::SerializationFailed {
                path: dest.to_path_buf(),
                reason: e.to_string(),
            })?;
        self.stage(&data, dest)
    }

    /// Stage and commit in one step
    pub fn write(&self, data: &[u8], dest: &Path) -> Result<(), PersistenceError> {
        self.stage(data, dest)?.commit()
    }
}

/// A fully written temp file waiting to be renamed over its destination
#[derive(Debug)]
pub struct StagedWrite {
    temp: NamedTempFile,
    dest: PathBuf,
    retry: RetryPolicy,
}

impl StagedWrite {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    pub fn destination(&self) -> &Path {
        &self.dest
    }

    /// Atomically rename the temp file over the destination
    pub fn commit(self) -> Result<(), PersistenceError> {
        let StagedWrite { temp, dest, retry } = self;
        let mut pending = Some(temp);

        let result = retry_io(&retry, "state rename", || match pending.take() {
            Some(temp) => match temp.persist(&dest) {
                Ok(_) => Ok(()),
                Err(e) => {
                    pending = Some(e.file);
                    Err(e.error)
                }
            },
            None => Err(io::Error::other("temp file already consumed")),
        });

        // Any temp file still held here is deleted on drop.
        drop(pending);

        result.map_err(|(source, attempts)| PersistenceError::WriteFailed {
            path: dest.clone(),
            attempts,
            source,
        })?;

        sync_parent_dir(&dest);
        Ok(())
    }
}

#[cfg(unix)]
fn sync_parent_dir(dest: &Path) {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_dest: &Path) {}

/// Atomically replace `dest` with `data`
pub fn write_atomic(data: &[u8], dest: &Path, retry: &RetryPolicy) -> Result<(), PersistenceError> {
    AtomicWriter::new(*retry).write(data, dest)
}

/// Serialize `value` as pretty JSON and atomically replace `dest`
pub fn write_json_atomic<T: Serialize + ?Sized>(
    value: &T,
    dest: &Path,
    retry: &RetryPolicy,
) -> Result<(), PersistenceError> {
    AtomicWriter::new(*retry).stage_json(value, dest)?.commit()
}

/// Read a JSON state file; a missing file is `Ok(None)`
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| PersistenceError::Corrupted {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
