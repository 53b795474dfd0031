//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of a file.
    #[error("read beyond end of file: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current file size.
        size: u64,
    },

    /// Another owner holds the directory lock.
    #[error("directory locked: another owner has exclusive access to {path}")]
    Locked {
        /// The locked directory.
        path: String,
    },

    /// The directory does not exist or is not a directory.
    #[error("invalid directory: {0}")]
    InvalidDirectory(String),
}

impl StorageError {
    /// Creates an error for a simulated I/O failure.
    pub(crate) fn simulated(operation: &str) -> Self {
        Self::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("simulated I/O failure during {operation}"),
        ))
    }
}
