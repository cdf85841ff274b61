//! Storage backend trait definition.

use crate::error::{StorageError, StorageResult};

/// A fixed-capacity byte region that backs a MapKV log.
///
/// Backends are **opaque byte stores**. They know nothing about headers,
/// frames or encryption; the engine owns all format interpretation.
///
/// # Invariants
///
/// - Bytes in `[0, capacity)` are always readable
/// - Growing a region zero-fills the new tail
/// - `replace` is atomic: afterwards the region holds either the complete
///   old content or the complete new image, never a mix
///
/// # Implementors
///
/// - [`super::MmapBackend`] - memory-mapped file
/// - [`super::InMemoryBackend`] - for testing and ephemeral stores
pub trait StorageBackend: Send + Sync {
    /// Returns the whole region.
    fn as_slice(&self) -> &[u8];

    /// Writes `data` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write would extend past the capacity or the
    /// region is read-only.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Returns the current capacity in bytes.
    fn capacity(&self) -> u64;

    /// Changes the capacity, zero-filling any new bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the region is read-only or cannot be resized.
    fn resize(&mut self, new_capacity: u64) -> StorageResult<()>;

    /// Flushes the given range to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush_range(&mut self, offset: u64, len: usize) -> StorageResult<()>;

    /// Flushes everything, including file metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Atomically replaces the whole content with `image`, padded with zeroes
    /// up to `capacity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the new content could not be made durable. The
    /// old content is left untouched in that case.
    fn replace(&mut self, image: &[u8], capacity: u64) -> StorageResult<()>;

    /// Re-reads the region from its source, picking up changes made by
    /// other processes (growth or replacement).
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be reopened.
    fn reload(&mut self) -> StorageResult<()>;

    /// Returns true if writes are rejected.
    fn is_read_only(&self) -> bool;

    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range extends past the capacity.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<&[u8]> {
        let data = self.as_slice();
        let range = checked_range(offset, len, data.len() as u64)?;
        Ok(&data[range])
    }
}

/// Validates `[offset, offset + len)` against `capacity`.
pub(crate) fn checked_range(
    offset: u64,
    len: usize,
    capacity: u64,
) -> StorageResult<std::ops::Range<usize>> {
    let end = offset.saturating_add(len as u64);
    if end > capacity {
        return Err(StorageError::OutOfBounds {
            offset,
            len,
            capacity,
        });
    }
    Ok(offset as usize..end as usize)
}
