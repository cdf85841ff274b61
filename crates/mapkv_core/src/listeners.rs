//! Change listeners.
//!
//! Listeners are registered per store id and are invoked synchronously on
//! the mutating thread after the store has released its lock, so a
//! callback may read the store or register and remove listeners without
//! deadlocking.
//!
//! # Usage
//!
//! ```
//! use mapkv_core::ListenerRegistry;
//! use std::sync::{Arc, Mutex};
//!
//! let registry = ListenerRegistry::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let sink = Arc::clone(&seen);
//! let handle = registry.add_listener("settings", move |_store, key| {
//!     sink.lock().unwrap().push(key.to_string());
//! });
//!
//! registry.notify("settings", "theme");
//! assert!(registry.remove_listener(&handle));
//! registry.notify("settings", "ignored");
//!
//! assert_eq!(*seen.lock().unwrap(), vec!["theme".to_string()]);
//! ```

use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// A change callback, invoked with `(store_id, key)`.
pub type ChangeCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Identifies one registered listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    store_id: String,
    id: u64,
}

impl ListenerHandle {
    /// Returns the store the listener watches.
    #[must_use]
    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    /// Returns the listener id, unique within its registry.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Listeners of every store opened through one registry.
///
/// - Preserves registration order per store
/// - Removal is idempotent
/// - A panicking listener is logged and skipped; the rest still run
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<String, Vec<(u64, ChangeCallback)>>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `callback` for changes to `store_id`.
    pub fn add_listener<F>(&self, store_id: &str, callback: F) -> ListenerHandle
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .entry(store_id.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        ListenerHandle {
            store_id: store_id.to_string(),
            id,
        }
    }

    /// Unregisters a listener.
    ///
    /// Returns false if it was already removed.
    pub fn remove_listener(&self, handle: &ListenerHandle) -> bool {
        let mut listeners = self.listeners.write();
        let Some(entries) = listeners.get_mut(&handle.store_id) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(id, _)| *id != handle.id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(&handle.store_id);
        }
        removed
    }

    /// Invokes every listener of `store_id` with `key`, in registration order.
    ///
    /// The list is snapshotted first: listeners added or removed by a
    /// callback take effect from the next notification.
    pub fn notify(&self, store_id: &str, key: &str) {
        let snapshot: Vec<(u64, ChangeCallback)> = match self.listeners.read().get(store_id) {
            Some(entries) => entries.clone(),
            None => return,
        };

        for (id, callback) in snapshot {
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(store_id, key)));
            if result.is_err() {
                warn!(store_id, key, listener = id, "change listener panicked");
            }
        }
    }

    /// Returns the number of listeners registered for `store_id`.
    pub fn listener_count(&self, store_id: &str) -> usize {
        self.listeners.read().get(store_id).map_or(0, Vec::len)
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read();
        f.debug_struct("ListenerRegistry")
            .field("stores", &listeners.len())
            .field(
                "listeners",
                &listeners.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}
