use super::LogDevice;
use crate::error::{EngineError, EngineResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory log device.
///
/// Clones share the same buffer, which lets tests hand one clone to an
/// engine and inspect or reuse the bytes through another.
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    data: Arc<RwLock<Vec<u8>>>,
}

impl MemoryLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log pre-filled with `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl LogDevice for MemoryLog {
    fn append(&mut self, data: &[u8]) -> EngineResult<u64> {
        let mut buffer = self.data.write();
        let offset = buffer.len() as u64;
        buffer.extend_from_slice(data);
        Ok(offset)
    }

    fn read_all(&self) -> EngineResult<Vec<u8>> {
        Ok(self.data.read().clone())
    }

    fn flush(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn size(&self) -> EngineResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> EngineResult<()> {
        let mut buffer = self.data.write();
        let current = buffer.len() as u64;
        if new_size > current {
            return Err(EngineError::invalid_operation(format!(
                "cannot truncate log to {new_size} bytes, current size is {current}"
            )));
        }
        // new_size <= len, which always fits in usize
        buffer.truncate(new_size as usize);
        Ok(())
    }
}
