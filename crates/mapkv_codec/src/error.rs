//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The record is malformed or does not match its checksum.
    #[error("corrupt record: {message}")]
    CorruptRecord {
        /// Description of the defect.
        message: String,
    },

    /// The input ended before the record was complete.
    #[error("unexpected end of input: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required to finish the read.
        needed: usize,
        /// Bytes remaining in the input.
        available: usize,
    },

    /// A key or value is too large for a 32-bit length prefix.
    #[error("size limit exceeded: {size} bytes exceeds maximum of {max_allowed}")]
    SizeLimitExceeded {
        /// The offending size.
        size: usize,
        /// The maximum allowed size.
        max_allowed: usize,
    },
}

impl CodecError {
    /// Creates a corrupt record error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            message: message.into(),
        }
    }

    /// Creates a truncation error.
    pub fn truncated(needed: usize, available: usize) -> Self {
        Self::Truncated { needed, available }
    }

    /// Returns true if the error means the log ends in an unusable record.
    ///
    /// Both truncation and corruption are treated the same way by recovery.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::CorruptRecord { .. } | Self::Truncated { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CodecError::corrupt("bad tag 9");
        assert_eq!(err.to_string(), "corrupt record: bad tag 9");

        let err = CodecError::truncated(8, 3);
        assert_eq!(
            err.to_string(),
            "unexpected end of input: needed 8 bytes, 3 available"
        );
    }

    #[test]
    fn corruption_classification() {
        assert!(CodecError::corrupt("x").is_corruption());
        assert!(CodecError::truncated(1, 0).is_corruption());
        assert!(!CodecError::SizeLimitExceeded {
            size: 10,
            max_allowed: 5
        }
        .is_corruption());
    }
}
