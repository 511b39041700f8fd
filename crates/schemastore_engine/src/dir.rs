//! Database directory management.
//!
//! ```text
//! <db_path>/
//! ├─ LOCK          # Advisory lock for single-process access
//! └─ commit.log    # Append-only commit log
//! ```

use crate::error::{EngineError, EngineResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "commit.log";

/// An opened database directory holding the exclusive lock.
///
/// The lock is released when this value is dropped.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens a database directory and acquires its lock.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the directory is missing and
    ///   `create_if_missing` is false
    /// - [`EngineError::AlreadyExists`] if a database exists and
    ///   `error_if_exists` is set
    /// - [`EngineError::Locked`] if another handle holds the lock
    pub fn open(path: &Path, create_if_missing: bool, error_if_exists: bool) -> EngineResult<Self> {
        if path.exists() {
            if error_if_exists && path.join(LOG_FILE).exists() {
                return Err(EngineError::AlreadyExists {
                    path: path.display().to_string(),
                });
            }
        } else if create_if_missing {
            fs::create_dir_all(path)?;
        } else {
            return Err(EngineError::NotFound {
                path: path.display().to_string(),
            });
        }

        if !path.is_dir() {
            return Err(EngineError::invalid_operation(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(EngineError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the commit log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }
}
