//! Byte views used for blob values.
//!
//! A [`Buffer`] either borrows caller memory without copying or shares an
//! owned, reference-counted allocation.
//!
//! ## Lifetime contract
//!
//! A borrowed buffer is only valid while the slice it was created from is
//! alive; the borrow checker enforces this through `'a`. Anything that must
//! outlive the caller (for example a record appended to the log) copies the
//! bytes first, see [`Buffer::into_owned`].

use bytes::Bytes;
use std::ops::Deref;

/// An immutable byte view over borrowed or shared memory.
#[derive(Debug, Clone)]
pub enum Buffer<'a> {
    /// Zero-copy view into memory owned by someone else.
    Borrowed(&'a [u8]),
    /// Shared owned memory; cloning is cheap.
    Shared(Bytes),
}

impl<'a> Buffer<'a> {
    /// Wraps a slice without copying.
    #[must_use]
    pub const fn borrowed(data: &'a [u8]) -> Self {
        Self::Borrowed(data)
    }

    /// Copies a slice into a new owned buffer.
    #[must_use]
    pub fn copy_from(data: &[u8]) -> Buffer<'static> {
        Buffer::Shared(Bytes::copy_from_slice(data))
    }

    /// Returns the bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Borrowed(data) => data,
            Self::Shared(bytes) => bytes,
        }
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Returns true if the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Returns true if the buffer borrows external memory.
    #[must_use]
    pub fn is_borrowed(&self) -> bool {
        matches!(self, Self::Borrowed(_))
    }

    /// Detaches the buffer from any borrow.
    ///
    /// Borrowed views are copied; shared buffers are returned as is.
    #[must_use]
    pub fn into_owned(self) -> Buffer<'static> {
        match self {
            Self::Borrowed(data) => Buffer::copy_from(data),
            Self::Shared(bytes) => Buffer::Shared(bytes),
        }
    }

    /// Converts into shared bytes, copying only when borrowed.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Borrowed(data) => Bytes::copy_from_slice(data),
            Self::Shared(bytes) => bytes,
        }
    }
}

impl Deref for Buffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for Buffer<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl PartialEq for Buffer<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Buffer<'_> {}

impl<'a> From<&'a [u8]> for Buffer<'a> {
    fn from(data: &'a [u8]) -> Self {
        Self::Borrowed(data)
    }
}

impl From<Vec<u8>> for Buffer<'static> {
    fn from(data: Vec<u8>) -> Self {
        Self::Shared(Bytes::from(data))
    }
}

impl From<Bytes> for Buffer<'static> {
    fn from(bytes: Bytes) -> Self {
        Self::Shared(bytes)
    }
}
