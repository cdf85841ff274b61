//! Memory-mapped file backend.
//!
//! The whole file is mapped with `MAP_SHARED`, so writes land in the page
//! cache immediately and become visible to other processes mapping the same
//! file. `flush_range` and `sync` call `msync`/`fsync` for durability.
//!
//! ## Remapping
//!
//! Growing, shrinking and replacing the file all require a new mapping.
//! These take `&mut self`, so the borrow checker guarantees no slice
//! returned by [`StorageBackend::as_slice`] is alive while the old mapping
//! is dropped.
//!
//! ## Atomic replacement
//!
//! `replace` writes the new image to `<path>.tmp`, fsyncs it, renames it over
//! the original and fsyncs the parent directory. A crash before the rename
//! leaves the original file untouched; a crash after it leaves the new one.

use crate::backend::{checked_range, StorageBackend};
use crate::error::{StorageError, StorageResult};
use memmap2::{Mmap, MmapMut};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix of the scratch file `replace` writes before renaming it over the
/// data file.
pub const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug)]
enum Mapping {
    /// Zero-length files cannot be mapped.
    Empty,
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Mapping {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::Empty => &[],
            Self::ReadOnly(map) => map,
            Self::ReadWrite(map) => map,
        }
    }
}

/// A file-backed, memory-mapped storage region.
///
/// # Example
///
/// ```no_run
/// use mapkv_storage::{MmapBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = MmapBackend::open(Path::new("store.bin"), 4096).unwrap();
/// backend.write_at(0, b"persistent").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct MmapBackend {
    path: PathBuf,
    file: File,
    mapping: Mapping,
    read_only: bool,
}

impl MmapBackend {
    /// Opens or creates a read-write mapping of `path`.
    ///
    /// A file shorter than `min_capacity` is extended with zeroes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, resized or mapped.
    pub fn open(path: &Path, min_capacity: u64) -> StorageResult<Self> {
        let file = open_read_write(path)?;
        if file.metadata()?.len() < min_capacity {
            file.set_len(min_capacity)?;
        }
        let mapping = map_file(&file, false)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            mapping,
            read_only: false,
        })
    }

    /// Opens an existing file as a read-only mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be mapped.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let file = File::open(path)?;
        let mapping = map_file(&file, true)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            mapping,
            read_only: true,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(TEMP_SUFFIX);
        self.path.with_file_name(name)
    }

    fn write_temp_image(&self, temp: &Path, image: &[u8], capacity: u64) -> StorageResult<()> {
        let mut file = File::create(temp)?;
        file.set_len(capacity)?;
        file.write_all(image)?;
        file.sync_all()?;
        Ok(())
    }

    fn remap(&mut self) -> StorageResult<()> {
        self.mapping = Mapping::Empty;
        self.mapping = map_file(&self.file, self.read_only)?;
        Ok(())
    }
}

impl StorageBackend for MmapBackend {
    fn as_slice(&self) -> &[u8] {
        self.mapping.as_slice()
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        let capacity = self.capacity();
        match &mut self.mapping {
            Mapping::ReadWrite(map) => {
                let range = checked_range(offset, data.len(), capacity)?;
                map[range].copy_from_slice(data);
                Ok(())
            }
            Mapping::ReadOnly(_) => Err(StorageError::ReadOnly),
            Mapping::Empty if self.read_only => Err(StorageError::ReadOnly),
            Mapping::Empty => Err(StorageError::OutOfBounds {
                offset,
                len: data.len(),
                capacity,
            }),
        }
    }

    fn capacity(&self) -> u64 {
        self.mapping.as_slice().len() as u64
    }

    fn resize(&mut self, new_capacity: u64) -> StorageResult<()> {
        self.ensure_writable()?;
        usize::try_from(new_capacity).map_err(|_| StorageError::InvalidCapacity(new_capacity))?;

        if let Mapping::ReadWrite(map) = &self.mapping {
            map.flush()?;
        }
        debug!(
            path = %self.path.display(),
            from = self.capacity(),
            to = new_capacity,
            "resizing mapping"
        );
        self.mapping = Mapping::Empty;
        self.file.set_len(new_capacity)?;
        self.remap()
    }

    fn flush_range(&mut self, offset: u64, len: usize) -> StorageResult<()> {
        if let Mapping::ReadWrite(map) = &self.mapping {
            let range = checked_range(offset, len, map.len() as u64)?;
            map.flush_range(range.start, range.len())?;
        }
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        if let Mapping::ReadWrite(map) = &self.mapping {
            map.flush()?;
            self.file.sync_all()?;
        }
        Ok(())
    }

    fn replace(&mut self, image: &[u8], capacity: u64) -> StorageResult<()> {
        self.ensure_writable()?;
        if capacity < image.len() as u64 || usize::try_from(capacity).is_err() {
            return Err(StorageError::InvalidCapacity(capacity));
        }

        let temp = self.temp_path();
        if let Err(e) = self.write_temp_image(&temp, image, capacity) {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
        if let Err(e) = fs::rename(&temp, &self.path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        sync_parent_dir(&self.path)?;

        debug!(
            path = %self.path.display(),
            image_len = image.len(),
            capacity,
            "replaced backing file"
        );
        self.reload()
    }

    fn reload(&mut self) -> StorageResult<()> {
        self.mapping = Mapping::Empty;
        self.file = if self.read_only {
            File::open(&self.path)?
        } else {
            open_read_write(&self.path)?
        };
        self.remap()
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

fn open_read_write(path: &Path) -> StorageResult<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

#[allow(unsafe_code)]
fn map_file(file: &File, read_only: bool) -> StorageResult<Mapping> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(Mapping::Empty);
    }
    usize::try_from(len).map_err(|_| StorageError::InvalidCapacity(len))?;

    // SAFETY: memory maps are unsafe because another process may change the
    // file underneath us. Cross-process writers coordinate through the
    // store's advisory lock and only ever append past the readers' view or
    // replace the file by rename, which leaves existing mappings intact.
    // The mapping is owned by `MmapBackend` and every remap requires
    // `&mut self`, so no borrowed slice outlives it.
    let mapping = unsafe {
        if read_only {
            Mapping::ReadOnly(Mmap::map(file)?)
        } else {
            Mapping::ReadWrite(MmapMut::map_mut(file)?)
        }
    };
    Ok(mapping)
}

/// Syncs the parent directory so a rename is durable.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> StorageResult<()> {
    // NTFS journals metadata updates; directory handles cannot be fsynced
    Ok(())
}
