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

    /// Attempted to access bytes beyond the end of the region.
    #[error("access beyond end of storage: offset {offset}, len {len}, capacity {capacity}")]
    OutOfBounds {
        /// The requested offset.
        offset: u64,
        /// The requested length.
        len: usize,
        /// The current capacity.
        capacity: u64,
    },

    /// A write was attempted on a read-only region.
    #[error("storage is read-only")]
    ReadOnly,

    /// The requested capacity cannot be mapped on this platform.
    #[error("invalid capacity: {0} bytes")]
    InvalidCapacity(u64),
}

impl StorageError {
    /// Returns true if the underlying I/O error is "not found".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}
