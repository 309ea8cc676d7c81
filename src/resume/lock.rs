//! Advisory lock over an export root
//!
//! Skip-if-exists makes sequential re-runs safe, but two runs against the same
//! root at the same moment could both claim a unit. The first run takes an
//! exclusive fd-lock on `<root>/.export.lock`; a second one fails fast.

use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lock errors
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another process holds the lock
    #[error("export root is locked by another run ({})", .0.display())]
    Held(PathBuf),

    /// Lock file could not be opened or locked
    #[error("lock error: {0}")]
    IoError(String),
}

/// Exclusive lock held for the lifetime of a run
pub struct ExportLock {
    path: PathBuf,
    // Keeps the descriptor (and with it the OS lock) open
    _lock: RwLock<File>,
}

impl std::fmt::Debug for ExportLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportLock").field("path", &self.path).finish()
    }
}

impl ExportLock {
    /// Try to take the lock at `path` without blocking
    ///
    /// Returns [`LockError::Held`] immediately if another handle holds it.
    pub fn try_acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LockError::IoError(e.to_string()))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| LockError::IoError(format!("Failed to open lock file: {e}")))?;

        let mut lock = RwLock::new(file);

        match lock.try_write() {
            Ok(guard) => {
                // The lock is released when the descriptor closes, not when the guard drops
                std::mem::forget(guard);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                return Err(LockError::Held(path.to_path_buf()));
            }
            Err(e) => {
                return Err(LockError::IoError(format!("Failed to acquire lock: {e}")));
            }
        }

        debug!(path = %path.display(), "Export lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
        })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
