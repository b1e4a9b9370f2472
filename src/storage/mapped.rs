//! Read-only memory mapping of an append-only data file.
//!
//! All reads go through the mapping. Writes go through a plain file handle
//! inside [`MappedRegion::with_write_access`], which drops the mapping first
//! and maps the grown file again afterwards. The region itself has no lock;
//! the storage engine keeps each region behind a `RwLock`, so a write scope
//! (which needs `&mut self`) can never overlap a read.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};

use crate::storage::error::{IoContext, StorageError, StorageResult};

/// Memory-mapped view over one data file.
#[derive(Debug)]
pub struct MappedRegion {
    path: PathBuf,

    /// `None` while the file is empty or during a write scope.
    mmap: Option<Mmap>,
}

impl MappedRegion {
    /// Opens (creating if needed) the file at `path` and maps it.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_path(&path)?;

        let mut region = Self { path, mmap: None };
        region.remap()?;
        Ok(region)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current mapped length in bytes (zero for an empty file).
    pub fn len(&self) -> u64 {
        self.mmap.as_ref().map_or(0, |m| m.len() as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The mapped bytes, empty when the file has no content.
    pub fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn slice(&self, offset: u64, len: u64) -> StorageResult<&[u8]> {
        let size = self.len();
        let end = offset.checked_add(len).filter(|end| *end <= size);
        match end {
            Some(end) => Ok(&self.bytes()[offset as usize..end as usize]),
            None => Err(StorageError::OutOfBounds { offset, len, size }),
        }
    }

    /// Borrow everything from `offset` to the end of the mapping.
    pub fn tail(&self, offset: u64) -> StorageResult<&[u8]> {
        let size = self.len();
        if offset >= size {
            return Err(StorageError::OutOfBounds {
                offset,
                len: 1,
                size,
            });
        }
        Ok(&self.bytes()[offset as usize..])
    }

    /// Runs `write` against a writable handle positioned by the caller.
    ///
    /// The mapping is dropped before the file is opened for writing and
    /// rebuilt once `write` returns, whether it succeeded or not. The
    /// closure receives the file and its length before the write.
    pub fn with_write_access<T>(
        &mut self,
        write: impl FnOnce(&mut File, u64) -> StorageResult<T>,
    ) -> StorageResult<T> {
        self.mmap = None;

        let result = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .with_path(&self.path)
            .and_then(|mut file| {
                let size = file.metadata().with_path(&self.path)?.len();
                let value = write(&mut file, size)?;
                file.sync_data().with_path(&self.path)?;
                Ok(value)
            });

        self.remap()?;
        result
    }

    fn remap(&mut self) -> StorageResult<()> {
        let file = File::open(&self.path).with_path(&self.path)?;
        let size = file.metadata().with_path(&self.path)?.len();

        self.mmap = if size == 0 {
            None
        } else {
            // SAFETY: the file is only ever appended to through
            // `with_write_access`, which drops this mapping first.
            let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|source| {
                StorageError::Mapping {
                    path: self.path.clone(),
                    source,
                }
            })?;
            Some(mmap)
        };
        Ok(())
    }
}
