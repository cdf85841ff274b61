//! The store engine.
//!
//! A [`Store`] is one memory-mapped key-value file plus its meta file. All
//! reads are served from an in-memory index rebuilt by replaying the log;
//! every mutation appends one frame and updates the header.
//!
//! # Concurrency
//!
//! - Within a process, a reader-writer lock guards the log and index
//! - In multi-process mode an advisory lock on the meta file serializes
//!   writers across processes, and the meta counters tell readers when to
//!   reload
//! - Listeners run after the lock is released

mod log;

use crate::config::{Config, Mode, StoreIdentity};
use crate::crypto::EncryptionKey;
use crate::dir::{MetaFile, MetaState, ProcessLock, ProcessLockGuard, StorePaths};
use crate::error::{CoreError, CoreResult};
use crate::listeners::{ListenerHandle, ListenerRegistry};
use crate::stats::{StatsSnapshot, StoreStats};
use bytes::Bytes;
use self::log::{LoadReport, Log, MIN_CAPACITY};
use mapkv_codec::{Buffer, Value};
use mapkv_storage::{InMemoryBackend, MmapBackend, StorageBackend};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An open key-value store.
///
/// Obtain one from a [`Registry`](crate::Registry), which shares engines
/// per identity, or open one directly with [`Store::open`].
///
/// ```
/// use mapkv_core::{Config, Store};
///
/// let store = Store::open_in_memory("demo", None, Config::default()).unwrap();
/// store.set_number("answer", 42.0).unwrap();
/// store.set_boolean("enabled", true).unwrap();
///
/// assert_eq!(store.get_number("answer").unwrap(), Some(42.0));
/// assert_eq!(store.all_keys().unwrap(), vec!["answer", "enabled"]);
///
/// // A value of another type reads as absent
/// assert_eq!(store.get_string("answer").unwrap(), None);
/// ```
pub struct Store {
    id: String,
    mode: Mode,
    paths: Option<StorePaths>,
    read_only: bool,
    process_lock: Option<ProcessLock>,
    state: RwLock<Option<OpenState>>,
    listeners: Arc<ListenerRegistry>,
    stats: StoreStats,
}

/// Everything that goes away on close.
struct OpenState {
    log: Log,
    meta: Option<MetaFile>,
    /// Meta counters this process has caught up with.
    seen: MetaState,
    /// Meta counters a read-path refresh last failed on.
    failed: Option<MetaState>,
    key: Option<EncryptionKey>,
}

impl OpenState {
    /// Appends a frame and publishes it to other processes.
    fn append(&mut self, key: &str, value: Option<&Value>) -> CoreResult<(u64, bool)> {
        let appended = self.log.append(key, value)?;
        if let Some(meta) = self.meta.as_mut() {
            if appended.compacted {
                meta.bump_generation()?;
            }
            self.seen = meta.bump_sequence()?;
        }
        Ok((appended.bytes, appended.compacted))
    }

    /// Publishes a replaced data file.
    fn rewritten(&mut self) -> CoreResult<()> {
        if let Some(meta) = self.meta.as_mut() {
            self.seen = meta.bump_generation()?;
        }
        Ok(())
    }
}

impl Store {
    /// Opens the store described by `identity` inside `dir`.
    ///
    /// The store gets its own listener registry; stores opened through a
    /// [`Registry`](crate::Registry) share the registry's.
    ///
    /// # Errors
    ///
    /// - `InvalidIdentity` / `InvalidKey` if the identity is malformed
    /// - `InvalidPath` if the directory is unusable, or the data file is
    ///   missing for a read-only store
    /// - `KeyMismatch` if the key does not match the file
    /// - `CorruptRecord` if the file is not a MapKV data file
    pub fn open(identity: &StoreIdentity, dir: &Path, config: Config) -> CoreResult<Self> {
        Self::open_with_listeners(identity, dir, config, Arc::new(ListenerRegistry::new()))
    }

    pub(crate) fn open_with_listeners(
        identity: &StoreIdentity,
        dir: &Path,
        config: Config,
        listeners: Arc<ListenerRegistry>,
    ) -> CoreResult<Self> {
        identity.validate()?;
        let key = EncryptionKey::optional(identity.encryption_key())?;
        let read_only = identity.is_read_only();
        let mode = identity.mode();

        let paths = StorePaths::new(dir, identity.id());
        paths.prepare(read_only)?;

        let process_lock = match (mode, read_only) {
            (Mode::SingleProcess, _) => None,
            (Mode::MultiProcess, false) => Some(ProcessLock::open(paths.meta(), false)?),
            (Mode::MultiProcess, true) if paths.meta().is_file() => {
                Some(ProcessLock::open(paths.meta(), true)?)
            }
            (Mode::MultiProcess, true) => None,
        };

        let stats = StoreStats::new();
        let open = {
            let _guard = match &process_lock {
                Some(lock) if read_only => Some(lock.shared()?),
                Some(lock) => Some(lock.exclusive()?),
                None => None,
            };

            let mut meta = if read_only {
                MetaFile::open_read_only(paths.meta())?
            } else {
                Some(MetaFile::open(paths.meta())?)
            };

            let backend: Box<dyn StorageBackend> = if read_only {
                Box::new(MmapBackend::open_read_only(paths.data())?)
            } else {
                Box::new(MmapBackend::open(paths.data(), config.initial_capacity)?)
            };
            let (log, report) = Log::open(identity.id(), backend, key.as_ref(), config)?;
            if report.recovered {
                stats.record_recovery();
            }

            let seen = match meta.as_mut() {
                Some(meta) if report.rewritten => meta.bump_generation()?,
                Some(meta) => meta.state(),
                None => MetaState::default(),
            };
            OpenState {
                log,
                meta,
                seen,
                failed: None,
                key,
            }
        };

        info!(
            store = identity.id(),
            mode = %mode,
            path = %paths.data().display(),
            keys = open.log.len(),
            encrypted = open.log.is_encrypted(),
            read_only,
            "opened store"
        );

        Ok(Self {
            id: identity.id().to_string(),
            mode,
            paths: Some(paths),
            read_only,
            process_lock,
            state: RwLock::new(Some(open)),
            listeners,
            stats,
        })
    }

    /// Opens a store that lives only in memory.
    ///
    /// Nothing is persisted and no files are touched. Useful for tests and
    /// scratch data.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentity` or `InvalidKey` for a malformed id or key.
    pub fn open_in_memory(id: &str, key: Option<&[u8]>, config: Config) -> CoreResult<Self> {
        StoreIdentity::new(id).validate()?;
        let key = EncryptionKey::optional(key)?;

        let capacity = config.initial_capacity.max(MIN_CAPACITY);
        let backend = Box::new(InMemoryBackend::with_capacity(capacity as usize));
        let (log, _) = Log::open(id, backend, key.as_ref(), config)?;

        Ok(Self {
            id: id.to_string(),
            mode: Mode::SingleProcess,
            paths: None,
            read_only: false,
            process_lock: None,
            state: RwLock::new(Some(OpenState {
                log,
                meta: None,
                seen: MetaState::default(),
                failed: None,
                key,
            })),
            listeners: Arc::new(ListenerRegistry::new()),
            stats: StoreStats::new(),
        })
    }

    // =========================================================================
    // Locking
    // =========================================================================

    fn is_stale(&self, open: &OpenState) -> bool {
        self.mode.is_multi_process()
            && open
                .meta
                .as_ref()
                .is_some_and(|meta| {
                    let state = meta.state();
                    state != open.seen && open.failed != Some(state)
                })
    }

    fn lock_process(&self) -> CoreResult<Option<ProcessLockGuard<'_>>> {
        match &self.process_lock {
            Some(lock) if self.read_only => lock.shared().map(Some),
            Some(lock) => lock.exclusive().map(Some),
            None => Ok(None),
        }
    }

    /// Loads changes other processes published since the last look.
    fn refresh(&self, open: &mut OpenState) -> CoreResult<()> {
        if !self.mode.is_multi_process() {
            return Ok(());
        }
        let current = match &open.meta {
            Some(meta) => meta.state(),
            None => return Ok(()),
        };
        if current == open.seen {
            return Ok(());
        }

        let report = if current.generation != open.seen.generation {
            debug!(store = %self.id, generation = current.generation, "data file replaced, reloading");
            open.log.reopen(open.key.as_ref())?
        } else {
            match open.log.catch_up() {
                Ok(records) => {
                    debug!(store = %self.id, records, "caught up with appends");
                    LoadReport::default()
                }
                Err(e) => {
                    debug!(store = %self.id, error = %e, "incremental reload failed, reopening");
                    open.log.reopen(open.key.as_ref())?
                }
            }
        };

        if report.recovered {
            self.stats.record_recovery();
        }
        open.seen = match open.meta.as_mut() {
            Some(meta) if report.rewritten && !self.read_only => meta.bump_generation()?,
            _ => current,
        };
        open.failed = None;
        self.stats.record_reload();
        Ok(())
    }

    /// Runs `f` against a current view of the log.
    fn read<T>(&self, f: impl FnOnce(&Log) -> T) -> CoreResult<T> {
        {
            let guard = self.state.read();
            let open = guard.as_ref().ok_or(CoreError::NotInitialized)?;
            if !self.is_stale(open) {
                return Ok(f(&open.log));
            }
        }

        let mut guard = self.state.write();
        let open = guard.as_mut().ok_or(CoreError::NotInitialized)?;
        if self.is_stale(open) {
            let _lock = self.lock_process()?;
            if let Err(e) = self.refresh(open) {
                // Retried once the counters move again, or by the next mutation
                open.failed = open.meta.as_ref().map(MetaFile::state);
                self.stats.record_error();
                warn!(
                    store = %self.id,
                    error = %e,
                    "failed to load changes from another process, serving last snapshot"
                );
            }
        }

        let guard = RwLockWriteGuard::downgrade(guard);
        let open = guard.as_ref().ok_or(CoreError::NotInitialized)?;
        Ok(f(&open.log))
    }

    /// Runs a mutation under the write lock and the exclusive process lock.
    fn mutate<T>(&self, f: impl FnOnce(&mut OpenState) -> CoreResult<T>) -> CoreResult<T> {
        let mut guard = self.state.write();
        let open = guard.as_mut().ok_or(CoreError::NotInitialized)?;
        if self.read_only {
            return Err(CoreError::ReadOnlyViolation);
        }

        let _lock = self.lock_process()?;
        let result = self.refresh(open).and_then(|()| f(open));
        if result.is_err() {
            self.stats.record_error();
        }
        result
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Returns the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` after [`close`](Self::close).
    pub fn get(&self, key: &str) -> CoreResult<Option<Value>> {
        self.stats.record_read();
        self.read(|log| log.get(key).cloned())
    }

    /// Returns the string under `key`; other types read as absent.
    pub fn get_string(&self, key: &str) -> CoreResult<Option<String>> {
        self.stats.record_read();
        self.read(|log| log.get(key).and_then(Value::as_string).map(str::to_string))
    }

    /// Returns the number under `key`; other types read as absent.
    pub fn get_number(&self, key: &str) -> CoreResult<Option<f64>> {
        self.stats.record_read();
        self.read(|log| log.get(key).and_then(Value::as_number))
    }

    /// Returns the boolean under `key`; other types read as absent.
    pub fn get_boolean(&self, key: &str) -> CoreResult<Option<bool>> {
        self.stats.record_read();
        self.read(|log| log.get(key).and_then(Value::as_boolean))
    }

    /// Returns the blob under `key`; other types read as absent.
    ///
    /// The buffer shares the stored bytes.
    pub fn get_blob(&self, key: &str) -> CoreResult<Option<Buffer<'static>>> {
        self.stats.record_read();
        self.read(|log| {
            log.get(key)
                .and_then(Value::as_blob)
                .map(|bytes| Buffer::from(bytes.clone()))
        })
    }

    /// Returns true if `key` holds a value of any type.
    pub fn contains_key(&self, key: &str) -> CoreResult<bool> {
        self.read(|log| log.contains(key))
    }

    /// Returns all keys in ascending order.
    pub fn all_keys(&self) -> CoreResult<Vec<String>> {
        self.read(Log::keys)
    }

    /// Returns the number of keys.
    pub fn count(&self) -> CoreResult<usize> {
        self.read(Log::len)
    }

    /// Returns the log bytes in use, superseded records included.
    pub fn actual_size(&self) -> CoreResult<u64> {
        self.read(Log::actual_size)
    }

    /// Returns the mapped size of the data file.
    pub fn total_size(&self) -> CoreResult<u64> {
        self.read(Log::total_size)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// - `ReadOnlyViolation` on a read-only store
    /// - `NotInitialized` after [`close`](Self::close)
    /// - `Storage` if the file cannot grow
    pub fn set(&self, key: &str, value: impl Into<Value>) -> CoreResult<()> {
        let value = value.into();
        self.mutate(|open| {
            let (bytes, compacted) = open.append(key, Some(&value))?;
            self.stats.record_write(bytes);
            if compacted {
                self.stats.record_compaction();
            }
            Ok(())
        })?;
        self.listeners.notify(&self.id, key);
        Ok(())
    }

    /// Stores a string.
    pub fn set_string(&self, key: &str, value: &str) -> CoreResult<()> {
        self.set(key, value)
    }

    /// Stores a number.
    pub fn set_number(&self, key: &str, value: f64) -> CoreResult<()> {
        self.set(key, value)
    }

    /// Stores a boolean.
    pub fn set_boolean(&self, key: &str, value: bool) -> CoreResult<()> {
        self.set(key, value)
    }

    /// Stores a copy of `value` as a blob.
    pub fn set_blob(&self, key: &str, value: &Buffer<'_>) -> CoreResult<()> {
        self.set(key, Bytes::copy_from_slice(value.as_slice()))
    }

    /// Removes `key`.
    ///
    /// Returns false, and notifies nobody, if the key was absent.
    pub fn remove(&self, key: &str) -> CoreResult<bool> {
        let removed = self.mutate(|open| {
            if !open.log.contains(key) {
                return Ok(false);
            }
            let (bytes, compacted) = open.append(key, None)?;
            self.stats.record_delete(bytes);
            if compacted {
                self.stats.record_compaction();
            }
            Ok(true)
        })?;
        if removed {
            self.listeners.notify(&self.id, key);
        }
        Ok(removed)
    }

    /// Removes every key and shrinks the file to its initial size.
    ///
    /// Listeners are notified once per removed key, in key order.
    pub fn clear_all(&self) -> CoreResult<()> {
        let keys = self.mutate(|open| {
            let keys = open.log.clear()?;
            open.rewritten()?;
            Ok(keys)
        })?;
        debug!(store = %self.id, keys = keys.len(), "cleared store");
        for key in &keys {
            self.listeners.notify(&self.id, key);
        }
        Ok(())
    }

    /// Compacts the log and releases spare memory.
    ///
    /// The file shrinks to the smallest power of two that holds the live
    /// data, but never below the initial capacity. A read-only store only
    /// releases memory.
    pub fn trim(&self) -> CoreResult<()> {
        if self.read_only {
            let mut guard = self.state.write();
            let open = guard.as_mut().ok_or(CoreError::NotInitialized)?;
            open.log.clear_memory_cache();
            return Ok(());
        }

        let compacted = self.mutate(|open| {
            let compact = !open.log.is_compact();
            if compact {
                open.log.compact(true)?;
                open.rewritten()?;
            }
            open.log.clear_memory_cache();
            Ok(compact)
        })?;
        if compacted {
            self.stats.record_compaction();
            debug!(store = %self.id, "trimmed store");
        }
        Ok(())
    }

    /// Re-encrypts the store under `new_key`; an empty key removes
    /// encryption.
    ///
    /// Returns false, leaving the store untouched, if the key is too long
    /// or the rewrite fails.
    pub fn re_key(&self, new_key: &[u8]) -> bool {
        match self.rewrite_key(new_key) {
            Ok(()) => true,
            Err(e) => {
                warn!(store = %self.id, error = %e, "re-key failed");
                false
            }
        }
    }

    /// Like [`re_key`](Self::re_key), but reports why it failed.
    ///
    /// # Errors
    ///
    /// - `InvalidKey` if the key is too long
    /// - `ReadOnlyViolation` / `NotInitialized` as for other mutations
    /// - `RecryptFailure` if the rewrite failed
    pub fn recrypt(&self, new_key: Option<&[u8]>) -> CoreResult<()> {
        self.rewrite_key(new_key.unwrap_or_default())
            .map_err(|e| match e {
                CoreError::NotInitialized
                | CoreError::ReadOnlyViolation
                | CoreError::InvalidKey { .. } => e,
                other => CoreError::recrypt_failure(other.to_string()),
            })
    }

    fn rewrite_key(&self, new_key: &[u8]) -> CoreResult<()> {
        let key = EncryptionKey::optional(Some(new_key))?;
        let encrypted = key.is_some();
        self.mutate(|open| {
            open.log.re_key(key.as_ref())?;
            open.key = key;
            open.rewritten()
        })?;
        self.stats.record_compaction();
        info!(store = %self.id, encrypted, "re-keyed store");
        Ok(())
    }

    /// Flushes the data and meta files to disk.
    pub fn sync(&self) -> CoreResult<()> {
        let mut guard = self.state.write();
        let open = guard.as_mut().ok_or(CoreError::NotInitialized)?;
        if self.read_only {
            return Ok(());
        }
        open.log.sync()?;
        if let Some(meta) = open.meta.as_mut() {
            meta.sync()?;
        }
        Ok(())
    }

    /// Closes the store. Later operations fail with `NotInitialized`.
    ///
    /// Pending writes are flushed on a best-effort basis.
    pub fn close(&self) {
        if !self.read_only {
            if let Err(e) = self.sync() {
                warn!(store = %self.id, error = %e, "failed to flush store on close");
            }
        }
        if self.state.write().take().is_some() {
            info!(store = %self.id, "closed store");
        }
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.read().is_none()
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Registers a callback invoked with `(store_id, key)` after every
    /// change made through this process.
    pub fn add_change_listener<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.listeners.add_listener(&self.id, callback)
    }

    /// Unregisters a listener. Returns false if it was already removed.
    pub fn remove_change_listener(&self, handle: &ListenerHandle) -> bool {
        self.listeners.remove_listener(handle)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Returns the store id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the sharing mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns the store directory, or `None` for an in-memory store.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.paths.as_ref().map(StorePaths::dir)
    }

    /// Returns the data file path, or `None` for an in-memory store.
    #[must_use]
    pub fn data_path(&self) -> Option<&Path> {
        self.paths.as_ref().map(StorePaths::data)
    }

    /// Returns true if mutations are rejected.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns true if records are encrypted. A closed store reads false.
    pub fn is_encrypted(&self) -> bool {
        self.state
            .read()
            .as_ref()
            .is_some_and(|open| open.log.is_encrypted())
    }

    /// Returns counters plus the current size gauges.
    pub fn stats(&self) -> StatsSnapshot {
        let mut snapshot = self.stats.snapshot();
        if let Some(open) = self.state.read().as_ref() {
            snapshot.key_count = open.log.len() as u64;
            snapshot.actual_size = open.log.actual_size();
            snapshot.total_size = open.log.total_size();
        }
        snapshot
    }

    /// Returns true if the store was opened with `identity`'s key and
    /// access mode.
    pub(crate) fn matches(&self, identity: &StoreIdentity) -> bool {
        let key_matches = self.state.read().as_ref().map_or(true, |open| {
            open.key.as_ref().map(EncryptionKey::as_bytes) == identity.encryption_key()
        });
        key_matches && self.read_only == identity.is_read_only()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("path", &self.path())
            .field("read_only", &self.read_only)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Some(mut open) = self.state.get_mut().take() {
            if !self.read_only {
                if let Err(e) = open.log.sync() {
                    warn!(store = %self.id, error = %e, "failed to flush store on drop");
                }
            }
        }
    }
}
