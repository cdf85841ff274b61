//! Store file layout and cross-process coordination.
//!
//! Every store owns two files inside its directory:
//!
//! ```text
//! <dir>/
//! ├─ <id>        # Data file: header followed by the record log
//! └─ <id>.meta   # Generation/sequence counters, also the lock file
//! ```
//!
//! The meta file is mapped shared, so every process sees counter updates
//! immediately. `sequence` moves on every append; `generation` moves when
//! the data file is rewritten (trim, re-key, clear, compaction) and tells
//! other processes to remap it from scratch.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use mapkv_storage::{MmapBackend, StorageBackend};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Suffix of the meta file name.
pub(crate) const META_SUFFIX: &str = ".meta";
/// Magic bytes at the start of the meta file.
const META_MAGIC: [u8; 4] = *b"MAPM";
/// Size of the meta file mapping.
const META_SIZE: u64 = 4096;
const GENERATION_OFFSET: usize = 8;
const SEQUENCE_OFFSET: usize = 16;

/// Paths of a store's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    dir: PathBuf,
    data: PathBuf,
    meta: PathBuf,
}

impl StorePaths {
    /// Builds the paths of store `id` inside `dir`.
    #[must_use]
    pub fn new(dir: &Path, id: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            data: dir.join(id),
            meta: dir.join(format!("{id}{META_SUFFIX}")),
        }
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the data file.
    #[must_use]
    pub fn data(&self) -> &Path {
        &self.data
    }

    /// Returns the path of the meta file.
    #[must_use]
    pub fn meta(&self) -> &Path {
        &self.meta
    }

    /// Makes sure the directory can hold the store.
    ///
    /// Writable stores create the directory. Read-only stores require the
    /// data file to exist already.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if the directory cannot be created or the
    /// read-only data file is missing.
    pub fn prepare(&self, read_only: bool) -> CoreResult<()> {
        if read_only {
            if !self.data.is_file() {
                return Err(CoreError::invalid_path(
                    &self.data,
                    "read-only store does not exist",
                ));
            }
            return Ok(());
        }

        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)
                .map_err(|e| CoreError::invalid_path(&self.dir, e.to_string()))?;
        }
        if !self.dir.is_dir() {
            return Err(CoreError::invalid_path(&self.dir, "not a directory"));
        }
        Ok(())
    }
}

/// Counters read from the meta file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetaState {
    /// Bumped whenever the data file is replaced.
    pub generation: u64,
    /// Bumped on every append.
    pub sequence: u64,
}

/// The shared-mapped meta file.
#[derive(Debug)]
pub(crate) struct MetaFile {
    backend: MmapBackend,
}

impl MetaFile {
    /// Opens or creates the meta file for writing.
    pub(crate) fn open(path: &Path) -> CoreResult<Self> {
        let mut backend = MmapBackend::open(path, META_SIZE)?;
        if backend.read_at(0, META_MAGIC.len())? != META_MAGIC {
            backend.write_at(0, &[0u8; SEQUENCE_OFFSET + 8])?;
            backend.write_at(0, &META_MAGIC)?;
        }
        Ok(Self { backend })
    }

    /// Opens an existing meta file read-only, if there is one.
    pub(crate) fn open_read_only(path: &Path) -> CoreResult<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        let backend = MmapBackend::open_read_only(path)?;
        Ok(Some(Self { backend }))
    }

    /// Reads the current counters.
    ///
    /// A short or uninitialized file reads as all zero.
    pub(crate) fn state(&self) -> MetaState {
        let data = self.backend.as_slice();
        if data.len() < SEQUENCE_OFFSET + 8 || data[..4] != META_MAGIC {
            return MetaState::default();
        }
        MetaState {
            generation: read_u64(&data[GENERATION_OFFSET..]),
            sequence: read_u64(&data[SEQUENCE_OFFSET..]),
        }
    }

    /// Records an append.
    pub(crate) fn bump_sequence(&mut self) -> CoreResult<MetaState> {
        let mut state = self.state();
        state.sequence = state.sequence.wrapping_add(1);
        self.backend
            .write_at(SEQUENCE_OFFSET as u64, &state.sequence.to_le_bytes())?;
        Ok(state)
    }

    /// Records a rewrite of the data file.
    pub(crate) fn bump_generation(&mut self) -> CoreResult<MetaState> {
        let mut state = self.state();
        state.generation = state.generation.wrapping_add(1);
        self.backend
            .write_at(GENERATION_OFFSET as u64, &state.generation.to_le_bytes())?;
        Ok(state)
    }

    /// Flushes the counters to disk.
    pub(crate) fn sync(&mut self) -> CoreResult<()> {
        Ok(self.backend.sync()?)
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(raw)
}

/// Advisory lock on the meta file shared by every process using the store.
///
/// The lock lives on its own file handle so it is independent of the
/// mapping, which is replaced on reload.
#[derive(Debug)]
pub(crate) struct ProcessLock {
    file: File,
}

impl ProcessLock {
    /// Opens the lock handle.
    pub(crate) fn open(path: &Path, read_only: bool) -> CoreResult<Self> {
        let file = if read_only {
            File::open(path)?
        } else {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?
        };
        Ok(Self { file })
    }

    /// Blocks until no other process holds the lock.
    pub(crate) fn exclusive(&self) -> CoreResult<ProcessLockGuard<'_>> {
        FileExt::lock_exclusive(&self.file)?;
        Ok(ProcessLockGuard { file: &self.file })
    }

    /// Blocks until no other process holds the lock exclusively.
    pub(crate) fn shared(&self) -> CoreResult<ProcessLockGuard<'_>> {
        FileExt::lock_shared(&self.file)?;
        Ok(ProcessLockGuard { file: &self.file })
    }
}

/// Releases the process lock on drop.
#[derive(Debug)]
pub(crate) struct ProcessLockGuard<'a> {
    file: &'a File,
}

impl Drop for ProcessLockGuard<'_> {
    fn drop(&mut self) {
        // Closing the handle would also release it; unlock errors are moot
        let _ = FileExt::unlock(self.file);
    }
}
