//! # MapKV Storage
//!
//! Byte-region backends for MapKV stores.
//!
//! This crate provides the lowest-level storage abstraction for MapKV.
//! Backends are **opaque byte regions** - they do not interpret the data
//! they hold.
//!
//! ## Design Principles
//!
//! - A backend is a fixed-capacity region that can be resized or replaced
//! - No knowledge of MapKV headers, frames or encryption
//! - Must be `Send + Sync` so engines can be shared across threads
//! - The engine owns all format interpretation
//!
//! ## Available Backends
//!
//! - [`MmapBackend`] - A memory-mapped file, shared between processes
//! - [`InMemoryBackend`] - For testing and ephemeral stores
//!
//! ## Example
//!
//! ```rust
//! use mapkv_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::with_capacity(32);
//! backend.write_at(0, b"hello world").unwrap();
//! assert_eq!(backend.read_at(0, 11).unwrap(), b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod mmap;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryBackend;
pub use mmap::{MmapBackend, TEMP_SUFFIX};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    proptest! {
        #[test]
        fn mmap_matches_memory_backend(
            writes in proptest::collection::vec((0u64..200, proptest::collection::vec(any::<u8>(), 1..32)), 1..24),
            grow_to in 256u64..1024,
        ) {
            let dir = tempdir().unwrap();
            let mut mapped = MmapBackend::open(&dir.path().join("region"), 256).unwrap();
            let mut memory = InMemoryBackend::with_capacity(256);

            for (offset, data) in &writes {
                mapped.write_at(*offset, data).unwrap();
                memory.write_at(*offset, data).unwrap();
            }
            mapped.resize(grow_to).unwrap();
            memory.resize(grow_to).unwrap();

            prop_assert_eq!(mapped.as_slice(), memory.as_slice());
        }
    }
}
