//! Store statistics.
//!
//! Counters are atomic and can be read while operations are in progress.
//!
//! # Usage
//!
//! ```
//! use mapkv_core::{Config, Store};
//!
//! let store = Store::open_in_memory("stats", None, Config::default()).unwrap();
//! store.set_string("k", "v").unwrap();
//! store.get_string("k").unwrap();
//!
//! let stats = store.stats();
//! assert_eq!(stats.writes, 1);
//! assert_eq!(stats.reads, 1);
//! assert_eq!(stats.key_count, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters of one store.
#[derive(Debug, Default)]
pub struct StoreStats {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    bytes_written: AtomicU64,
    compactions: AtomicU64,
    reloads: AtomicU64,
    recoveries: AtomicU64,
    errors: AtomicU64,
}

impl StoreStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self, bytes: u64) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_compaction(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a log truncated or repaired during replay.
    pub(crate) fn record_recovery(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of reads.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the number of appended values.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the number of appended tombstones.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Returns the bytes appended to the log, frame headers included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Returns the number of log rewrites (trim, compaction, re-key).
    pub fn compactions(&self) -> u64 {
        self.compactions.load(Ordering::Relaxed)
    }

    /// Returns how often changes by another process were loaded.
    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }

    /// Returns how often a damaged log tail was dropped.
    pub fn recoveries(&self) -> u64 {
        self.recoveries.load(Ordering::Relaxed)
    }

    /// Returns the number of failed mutations.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of the counters. Size gauges are left at zero.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads(),
            writes: self.writes(),
            deletes: self.deletes(),
            bytes_written: self.bytes_written(),
            compactions: self.compactions(),
            reloads: self.reloads(),
            recoveries: self.recoveries(),
            errors: self.errors(),
            ..StatsSnapshot::default()
        }
    }
}

/// A point-in-time snapshot of store statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Number of reads.
    pub reads: u64,
    /// Number of appended values.
    pub writes: u64,
    /// Number of appended tombstones.
    pub deletes: u64,
    /// Bytes appended to the log.
    pub bytes_written: u64,
    /// Number of log rewrites.
    pub compactions: u64,
    /// Number of cross-process reloads.
    pub reloads: u64,
    /// Number of recovered log tails.
    pub recoveries: u64,
    /// Number of failed mutations.
    pub errors: u64,
    /// Live keys.
    pub key_count: u64,
    /// Log bytes in use, superseded records included.
    pub actual_size: u64,
    /// Bytes mapped.
    pub total_size: u64,
}
