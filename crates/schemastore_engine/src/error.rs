//! Error types for engine operations.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur inside the engine.
///
/// An optimistic commit conflict is not an error: `commit` reports it as
/// `Ok(false)`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The commit log is corrupted.
    #[error("commit log corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Byte offset of the damaged record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Another process holds the database directory lock.
    #[error("database locked: another process has exclusive access")]
    Locked,

    /// The database directory does not exist and creation was disabled.
    #[error("database does not exist: {path}")]
    NotFound {
        /// The missing path.
        path: String,
    },

    /// The database exists and `error_if_exists` was set.
    #[error("database already exists: {path}")]
    AlreadyExists {
        /// The existing path.
        path: String,
    },

    /// The engine has been closed.
    #[error("engine is closed")]
    Closed,

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Why the operation is invalid.
        message: String,
    },
}

impl EngineError {
    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
