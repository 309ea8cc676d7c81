//! Skip-if-exists persistence with atomic writes
//!
//! A destination that exists is a completed unit of work. Writes therefore go
//! to a temporary file in the destination directory, are flushed and fsynced,
//! and only then renamed into place, so the destination is never observable
//! half-written.

use serde::Serialize;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Result of one sink invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    /// Destination already existed; the producer was not invoked
    Skipped,
    /// Producer ran and its result was committed
    Written {
        /// Bytes committed to the destination
        bytes: u64,
    },
}

impl SinkOutcome {
    /// Whether the destination already existed
    pub fn is_skipped(&self) -> bool {
        matches!(self, SinkOutcome::Skipped)
    }
}

/// Sink errors
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Skip-if-exists wrappers around a producer
///
/// ```no_run
/// use slack_exporter::resume::{ResumableSink, SinkError, SinkOutcome};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), SinkError> {
/// let outcome = ResumableSink::json(Path::new("export/users.json"), || async {
///     Ok::<_, SinkError>(serde_json::json!([{"id": "U1"}]))
/// })
/// .await?;
/// assert!(matches!(outcome, SinkOutcome::Written { .. } | SinkOutcome::Skipped));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ResumableSink;

impl ResumableSink {
    /// Persist the producer's value as pretty-printed JSON unless `path` exists
    ///
    /// # Errors
    /// Producer errors pass through unchanged; serialization and IO failures are
    /// converted from [`SinkError`]. In every error case the destination stays absent.
    pub async fn json<F, Fut, T, E>(path: &Path, producer: F) -> Result<SinkOutcome, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize,
        E: From<SinkError>,
    {
        if Self::is_done(path) {
            return Ok(SinkOutcome::Skipped);
        }

        let value = producer().await?;
        let bytes = serde_json::to_vec_pretty(&value).map_err(|e| {
            SinkError::SerializationError(format!("{}: {e}", path.display()))
        })?;
        let written = Self::write_atomic(path, &bytes)?;
        Ok(SinkOutcome::Written { bytes: written })
    }

    /// Persist the producer's raw bytes unless `path` exists
    pub async fn bytes<F, Fut, B, E>(path: &Path, producer: F) -> Result<SinkOutcome, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<B, E>>,
        B: AsRef<[u8]>,
        E: From<SinkError>,
    {
        if Self::is_done(path) {
            return Ok(SinkOutcome::Skipped);
        }

        let data = producer().await?;
        let written = Self::write_atomic(path, data.as_ref())?;
        Ok(SinkOutcome::Written { bytes: written })
    }

    /// Whether `path` already holds a completed result
    pub fn is_done(path: &Path) -> bool {
        let done = path.exists();
        if done {
            debug!(path = %path.display(), "Destination exists, skipping");
        }
        done
    }

    /// Stage `data` then commit it to `path`
    pub fn write_atomic(path: &Path, data: &[u8]) -> Result<u64, SinkError> {
        Self::stage(path, data)?.commit()
    }

    /// Write `data` to a temporary file beside `path`, flushed and fsynced
    ///
    /// Creates missing parent directories. Nothing is visible at `path` until
    /// [`StagedWrite::commit`]; dropping the returned value removes the temporary file.
    pub fn stage(path: &Path, data: &[u8]) -> Result<StagedWrite, SinkError> {
        let parent_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent_dir).map_err(|e| {
            SinkError::IoError(format!(
                "Failed to create directory {}: {e}",
                parent_dir.display()
            ))
        })?;

        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .map_err(|e| SinkError::IoError(format!("Failed to create temp file: {e}")))?;

        temp_file
            .write_all(data)
            .map_err(|e| SinkError::IoError(format!("Failed to write to temp file: {e}")))?;

        // Data must be on disk before the rename makes it visible
        temp_file
            .flush()
            .map_err(|e| SinkError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| SinkError::IoError(format!("Failed to sync temp file: {e}")))?;

        Ok(StagedWrite {
            temp_file,
            destination: path.to_path_buf(),
            bytes: data.len() as u64,
        })
    }
}

/// Fully written temporary file awaiting its rename into place
#[derive(Debug)]
pub struct StagedWrite {
    temp_file: NamedTempFile,
    destination: PathBuf,
    bytes: u64,
}

impl StagedWrite {
    /// Temporary file path
    pub fn temp_path(&self) -> &Path {
        self.temp_file.path()
    }

    /// Final destination
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Atomically rename into place, then fsync the parent directory
    pub fn commit(self) -> Result<u64, SinkError> {
        let Self {
            temp_file,
            destination,
            bytes,
        } = self;

        temp_file.persist(&destination).map_err(|e| {
            SinkError::IoError(format!(
                "Failed to persist temp file to {}: {e}",
                destination.display()
            ))
        })?;

        // Fsync parent directory so the rename itself is durable
        if let Some(parent) = destination.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        debug!(path = %destination.display(), bytes, "Committed");
        Ok(bytes)
    }
}
