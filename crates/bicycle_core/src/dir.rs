//! Data directory layout and locking.
//!
//! ```text
//! <path>/
//! ├─ LOCK      # advisory lock, one engine per directory
//! └─ wal.log   # write-ahead log holding records, indexes and the catalog
//! ```

use crate::error::CoreResult;
use bicycle_storage::StorageError;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "wal.log";

/// An opened data directory. The lock is held until drop.
#[derive(Debug)]
pub struct DataDir {
    path: PathBuf,
    lock: File,
}

impl DataDir {
    /// Opens `path`, creating it if allowed, and takes the directory lock.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another engine holds the lock,
    /// [`StorageError::InvalidOperation`] if the directory is missing and
    /// may not be created or the path is not a directory, and
    /// [`StorageError::IoFailure`] for other filesystem failures.
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(StorageError::invalid_operation(format!(
                    "data directory does not exist: {}",
                    path.display()
                ))
                .into());
            }
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(StorageError::invalid_operation(format!(
                "not a directory: {}",
                path.display()
            ))
            .into());
        }

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked.into());
        }

        Ok(Self {
            path: path.to_path_buf(),
            lock,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the write-ahead log path.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }
}

impl Drop for DataDir {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.lock) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release directory lock");
        }
    }
}
