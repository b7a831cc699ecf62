// Block device abstraction for FAT volumes
// All higher layers address the device by absolute byte offset

use crate::{FatError, FatResult};
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A seekable, byte-addressable store holding a formatted volume.
///
/// Implementations must honor absolute byte offsets; no sector abstraction
/// is exposed here. Short transfers are errors.
pub trait BlockDevice {
    /// Read exactly `len` bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, len: usize) -> FatResult<Vec<u8>>;

    /// Write all of `data` starting at `offset`.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> FatResult<()>;

    /// Total size of the device in bytes.
    fn size(&mut self) -> FatResult<u64>;
}

/// A block device backed by an image file on the host filesystem.
#[derive(Debug)]
pub struct FileDevice {
    file: File,
}

impl FileDevice {
    /// Open an image file for read/write access.
    pub fn open<P: AsRef<Path>>(path: P) -> FatResult<Self> {
        let path = path.as_ref();
        debug!("Opening image file: {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                FatError::DeviceNotOpen(format!("{}: {}", path.display(), e))
            })?;

        Ok(Self { file })
    }

    /// Wrap an already-open file handle.
    pub fn from_file(file: File) -> Self {
        Self { file }
    }

    /// Flush pending writes to the host filesystem.
    pub fn flush(&mut self) -> FatResult<()> {
        self.file.flush().map_err(FatError::write)
    }
}

impl BlockDevice for FileDevice {
    fn read_at(&mut self, offset: u64, len: usize) -> FatResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(FatError::read)?;

        let mut buffer = vec![0u8; len];
        self.file.read_exact(&mut buffer).map_err(FatError::read)?;

        Ok(buffer)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> FatResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(FatError::write)?;

        self.file.write_all(data).map_err(FatError::write)
    }

    fn size(&mut self) -> FatResult<u64> {
        let meta = self.file.metadata().map_err(FatError::read)?;
        Ok(meta.len())
    }
}

/// An in-memory block device.
///
/// Used by tests and by embedders that already hold the image in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDevice {
    data: Vec<u8>,
}

impl MemoryDevice {
    /// Create a zero-filled device of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
        }
    }

    /// Wrap an existing image buffer.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Borrow the underlying image bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the device and return the image bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl BlockDevice for MemoryDevice {
    fn read_at(&mut self, offset: u64, len: usize) -> FatResult<Vec<u8>> {
        let start = offset as usize;
        let end = start.checked_add(len).ok_or_else(|| {
            FatError::ReadError(format!("read of {} bytes at {} overflows", len, offset))
        })?;

        if end > self.data.len() {
            return Err(FatError::ReadError(format!(
                "read of {} bytes at offset {} exceeds device size {}",
                len,
                offset,
                self.data.len()
            )));
        }

        Ok(self.data[start..end].to_vec())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> FatResult<()> {
        let start = offset as usize;
        let end = start.checked_add(data.len()).ok_or_else(|| {
            FatError::WriteError(format!(
                "write of {} bytes at {} overflows",
                data.len(),
                offset
            ))
        })?;

        if end > self.data.len() {
            return Err(FatError::WriteError(format!(
                "write of {} bytes at offset {} exceeds device size {}",
                data.len(),
                offset,
                self.data.len()
            )));
        }

        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn size(&mut self) -> FatResult<u64> {
        Ok(self.data.len() as u64)
    }
}
