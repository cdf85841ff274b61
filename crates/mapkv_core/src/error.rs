//! Error types for MapKV core.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in MapKV core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] mapkv_storage::StorageError),

    /// Record codec error.
    #[error("codec error: {0}")]
    Codec(#[from] mapkv_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store identity is unusable (empty or path-like id).
    #[error("invalid store identity: {message}")]
    InvalidIdentity {
        /// Why the identity was rejected.
        message: String,
    },

    /// The encryption key is longer than the supported maximum.
    #[error("invalid encryption key: {len} bytes, at most {max} allowed")]
    InvalidKey {
        /// Length of the rejected key.
        len: usize,
        /// Maximum key length.
        max: usize,
    },

    /// The store directory or file cannot be used.
    #[error("invalid path {}: {message}", path.display())]
    InvalidPath {
        /// The offending path.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// The store was closed, or no process-wide registry exists.
    #[error("store is not initialized or has been closed")]
    NotInitialized,

    /// A mutation was attempted on a read-only store.
    #[error("store is read-only")]
    ReadOnlyViolation,

    /// The data file contains a record that cannot be decoded.
    #[error("corrupt record: {message}")]
    CorruptRecord {
        /// Description of the corruption.
        message: String,
    },

    /// Re-encrypting the store failed; the previous file is intact.
    #[error("recrypt failed: {message}")]
    RecryptFailure {
        /// Description of the failure.
        message: String,
    },

    /// The supplied encryption key does not match the store.
    #[error("encryption key does not match the store")]
    KeyMismatch,

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed.
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Unknown store mode.
    #[error("invalid mode: {value}")]
    InvalidMode {
        /// The rejected mode value.
        value: String,
    },
}

impl CoreError {
    /// Creates an invalid identity error.
    pub fn invalid_identity(message: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            message: message.into(),
        }
    }

    /// Creates an invalid key error.
    pub fn invalid_key(len: usize, max: usize) -> Self {
        Self::InvalidKey { len, max }
    }

    /// Creates an invalid path error.
    pub fn invalid_path(path: &Path, message: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Creates a corrupt record error.
    pub fn corrupt_record(message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            message: message.into(),
        }
    }

    /// Creates a recrypt failure error.
    pub fn recrypt_failure(message: impl Into<String>) -> Self {
        Self::RecryptFailure {
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid mode error.
    pub fn invalid_mode(value: impl Into<String>) -> Self {
        Self::InvalidMode {
            value: value.into(),
        }
    }

    /// Returns true if the error means the stored bytes are damaged.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        match self {
            Self::CorruptRecord { .. } | Self::DecryptionFailed { .. } => true,
            Self::Codec(e) => e.is_corruption(),
            _ => false,
        }
    }
}
