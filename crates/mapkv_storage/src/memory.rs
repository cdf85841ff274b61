//! In-memory storage backend for testing.

use crate::backend::{checked_range, StorageBackend};
use crate::error::{StorageError, StorageResult};

/// An in-memory storage backend.
///
/// This backend stores all data in memory and is suitable for:
/// - Unit tests
/// - Ephemeral stores that don't need persistence
///
/// # Example
///
/// ```rust
/// use mapkv_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::with_capacity(16);
/// backend.write_at(4, b"data").unwrap();
/// assert_eq!(backend.read_at(4, 4).unwrap(), b"data");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: Vec<u8>,
    read_only: bool,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a zero-filled backend of the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            read_only: false,
        }
    }

    /// Creates a new in-memory backend with pre-existing data.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data,
            read_only: false,
        }
    }

    /// Creates a read-only backend over pre-existing data.
    #[must_use]
    pub fn read_only(data: Vec<u8>) -> Self {
        Self {
            data,
            read_only: true,
        }
    }

    /// Returns a copy of all data in the backend.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.clone()
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        Ok(())
    }
}

impl StorageBackend for InMemoryBackend {
    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        self.ensure_writable()?;
        let range = checked_range(offset, data.len(), self.data.len() as u64)?;
        self.data[range].copy_from_slice(data);
        Ok(())
    }

    fn capacity(&self) -> u64 {
        self.data.len() as u64
    }

    fn resize(&mut self, new_capacity: u64) -> StorageResult<()> {
        self.ensure_writable()?;
        let new_len =
            usize::try_from(new_capacity).map_err(|_| StorageError::InvalidCapacity(new_capacity))?;
        self.data.resize(new_len, 0);
        Ok(())
    }

    fn flush_range(&mut self, offset: u64, len: usize) -> StorageResult<()> {
        checked_range(offset, len, self.data.len() as u64)?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        // In-memory backend has nothing to sync
        Ok(())
    }

    fn replace(&mut self, image: &[u8], capacity: u64) -> StorageResult<()> {
        self.ensure_writable()?;
        let len = usize::try_from(capacity)
            .ok()
            .filter(|len| *len >= image.len())
            .ok_or(StorageError::InvalidCapacity(capacity))?;
        let mut data = vec![0u8; len];
        data[..image.len()].copy_from_slice(image);
        self.data = data;
        Ok(())
    }

    fn reload(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.capacity(), 0);
        assert!(backend.data().is_empty());
    }

    #[test]
    fn memory_write_and_read() {
        let mut backend = InMemoryBackend::with_capacity(16);
        backend.write_at(0, b"hello").unwrap();
        backend.write_at(5, b" world").unwrap();
        assert_eq!(backend.read_at(0, 11).unwrap(), b"hello world");
        assert_eq!(backend.read_at(6, 5).unwrap(), b"world");
    }

    #[test]
    fn memory_write_past_end_fails() {
        let mut backend = InMemoryBackend::with_capacity(4);
        let result = backend.write_at(2, b"abc");
        assert!(matches!(result, Err(StorageError::OutOfBounds { .. })));
    }

    #[test]
    fn memory_read_past_end_fails() {
        let backend = InMemoryBackend::with_capacity(4);
        assert!(matches!(
            backend.read_at(3, 2),
            Err(StorageError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn memory_resize_zero_fills() {
        let mut backend = InMemoryBackend::with_data(vec![1, 2]);
        backend.resize(4).unwrap();
        assert_eq!(backend.data(), vec![1, 2, 0, 0]);
        backend.resize(1).unwrap();
        assert_eq!(backend.data(), vec![1]);
    }

    #[test]
    fn memory_replace_pads_to_capacity() {
        let mut backend = InMemoryBackend::with_data(vec![9; 32]);
        backend.replace(b"new", 8).unwrap();
        assert_eq!(backend.data(), b"new\0\0\0\0\0".to_vec());
    }

    #[test]
    fn memory_replace_smaller_than_image_fails() {
        let mut backend = InMemoryBackend::with_data(vec![9; 4]);
        assert!(backend.replace(b"too long", 2).is_err());
        assert_eq!(backend.data(), vec![9; 4]);
    }

    #[test]
    fn memory_read_only_rejects_writes() {
        let mut backend = InMemoryBackend::read_only(vec![0; 8]);
        assert!(backend.is_read_only());
        assert!(matches!(
            backend.write_at(0, b"x"),
            Err(StorageError::ReadOnly)
        ));
        assert!(matches!(backend.resize(16), Err(StorageError::ReadOnly)));
        assert!(matches!(
            backend.replace(b"", 8),
            Err(StorageError::ReadOnly)
        ));
    }

    #[test]
    fn memory_flush_and_sync_succeed() {
        let mut backend = InMemoryBackend::with_capacity(8);
        assert!(backend.flush_range(0, 8).is_ok());
        assert!(backend.sync().is_ok());
        assert!(backend.reload().is_ok());
    }
}
