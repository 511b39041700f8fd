use super::LogDevice;
use crate::error::{EngineError, EngineResult};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file-backed log device.
///
/// `flush()` pushes data to the OS; `sync()` calls `File::sync_all()`.
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    file: RwLock<File>,
    size: RwLock<u64>,
}

impl FileLog {
    /// Opens or creates the log file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> EngineResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            size: RwLock::new(size),
        })
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogDevice for FileLog {
    fn append(&mut self, data: &[u8]) -> EngineResult<u64> {
        let mut file = self.file.write();
        let mut size = self.size.write();

        let offset = *size;
        if data.is_empty() {
            return Ok(offset);
        }
        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        *size += data.len() as u64;

        Ok(offset)
    }

    fn read_all(&self) -> EngineResult<Vec<u8>> {
        let mut file = self.file.write();
        let mut buffer = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn flush(&mut self) -> EngineResult<()> {
        self.file.write().flush()?;
        Ok(())
    }

    fn sync(&mut self) -> EngineResult<()> {
        self.file.write().sync_all()?;
        Ok(())
    }

    fn size(&self) -> EngineResult<u64> {
        Ok(*self.size.read())
    }

    fn truncate(&mut self, new_size: u64) -> EngineResult<()> {
        let file = self.file.write();
        let mut size = self.size.write();

        if new_size > *size {
            return Err(EngineError::invalid_operation(format!(
                "cannot truncate {} to {new_size} bytes, current size is {}",
                self.path.display(),
                *size
            )));
        }

        file.set_len(new_size)?;
        file.sync_all()?;
        *size = new_size;

        Ok(())
    }
}
