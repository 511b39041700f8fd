//! Engine configuration.

use std::path::{Path, PathBuf};

/// Configuration for opening an engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Database directory. `None` opens a purely in-memory engine.
    pub path: Option<PathBuf>,

    /// Whether to create the database directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to error if the database already exists.
    pub error_if_exists: bool,

    /// Whether to sync the commit log on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Bytes of log writes accumulated before an automatic sync when
    /// `sync_on_commit` is disabled.
    pub write_buffer_size: usize,

    /// Advisory read cache size in bytes. The engine keeps all data
    /// resident, so this value is only recorded.
    pub cache_size: usize,

    /// Emit a `tracing::debug!` event for every write and commit.
    pub debug_logging: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: None,
            create_if_missing: true,
            error_if_exists: false,
            sync_on_commit: true,
            write_buffer_size: 64 * 1024 * 1024, // 64 MB
            cache_size: 128 * 1024 * 1024,       // 128 MB
            debug_logging: false,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration for an on-disk database at `path`.
    #[must_use]
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to error if the database exists.
    #[must_use]
    pub const fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets whether to sync the log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the write buffer size in bytes.
    #[must_use]
    pub const fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Sets the advisory cache size in bytes.
    #[must_use]
    pub const fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    /// Enables or disables per-operation debug events.
    #[must_use]
    pub const fn debug_logging(mut self, value: bool) -> Self {
        self.debug_logging = value;
        self
    }
}
