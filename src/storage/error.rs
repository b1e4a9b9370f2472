use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to map '{path}' into memory: {source}")]
    Mapping {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Read of {len} bytes at offset {offset} exceeds mapped size {size}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("Failed to encode payload: {0}")]
    PayloadEncode(String),

    #[error("Failed to decode payload at offset {offset}: {reason}")]
    PayloadDecode { offset: u64, reason: String },

    #[error("Failed to decode position record on line {line}: {reason}")]
    PositionDecode { line: usize, reason: String },

    #[error("Collection '{0}' is not registered with the storage engine")]
    UnknownCollection(String),

    #[error("No live position record for vector '{id}'")]
    PositionNotFound { id: String },
}

impl StorageError {
    /// I/O and mapping failures leave the store in an unknown state; the
    /// caller must not keep writing to it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Mapping { .. })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Attach the offending path to an `io::Error`.
pub(crate) trait IoContext<T> {
    fn with_path(self, path: &std::path::Path) -> StorageResult<T>;
}

impl<T> IoContext<T> for Result<T, std::io::Error> {
    fn with_path(self, path: &std::path::Path) -> StorageResult<T> {
        self.map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
