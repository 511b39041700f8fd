//! Commit log devices.
//!
//! A log device is an append-only byte sink. The engine owns the record
//! format; devices never interpret what they store.

mod file;
mod memory;

pub use file::FileLog;
pub use memory::MemoryLog;

use crate::error::EngineResult;

/// An append-only byte store backing the commit log.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_all` returns every byte appended since the last truncation
/// - `sync` makes all appended bytes durable
pub trait LogDevice: Send + Sync {
    /// Appends data and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> EngineResult<u64>;

    /// Reads the entire contents of the device.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read_all(&self) -> EngineResult<Vec<u8>>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> EngineResult<()>;

    /// Syncs data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> EngineResult<()>;

    /// Returns the current size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> EngineResult<u64>;

    /// Truncates the device to `new_size` bytes.
    ///
    /// Used to drop a torn tail record found during replay.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` exceeds the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> EngineResult<()>;
}
