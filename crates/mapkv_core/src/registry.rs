//! Instance registry.
//!
//! A [`Registry`] hands out one shared [`Store`] per identity so that every
//! caller in a process sees the same index and listeners. Identities are
//! keyed by id, mode and resolved directory.
//!
//! # Usage
//!
//! ```
//! use mapkv_core::{Config, FixedPathProvider, Registry, StoreIdentity};
//! use std::sync::Arc;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let registry = Registry::new(&FixedPathProvider::new(dir.path()), Config::default());
//!
//! let identity = StoreIdentity::new("settings");
//! let a = registry.acquire(&identity).unwrap();
//! let b = registry.acquire(&identity).unwrap();
//! assert!(Arc::ptr_eq(&a, &b));
//!
//! a.set_string("theme", "dark").unwrap();
//! assert_eq!(b.get_string("theme").unwrap().as_deref(), Some("dark"));
//! ```

use crate::config::{Config, Mode, StoreIdentity};
use crate::error::{CoreError, CoreResult};
use crate::listeners::ListenerRegistry;
use crate::store::Store;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// Id of the store returned by [`Registry::default_identity`].
pub const DEFAULT_STORE_ID: &str = "mapkv.default";

/// Supplies the directories stores live in.
pub trait PathProvider: Send + Sync {
    /// Directory used when neither the identity nor an app group names one.
    fn base_directory(&self) -> PathBuf;

    /// Directory shared with other applications, if the platform has one.
    fn app_group_directory(&self) -> Option<PathBuf> {
        None
    }
}

/// A [`PathProvider`] with fixed directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedPathProvider {
    base: PathBuf,
    app_group: Option<PathBuf>,
}

impl FixedPathProvider {
    /// Creates a provider rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            app_group: None,
        }
    }

    /// Sets the shared app group directory.
    #[must_use]
    pub fn with_app_group(mut self, dir: impl Into<PathBuf>) -> Self {
        self.app_group = Some(dir.into());
        self
    }
}

impl PathProvider for FixedPathProvider {
    fn base_directory(&self) -> PathBuf {
        self.base.clone()
    }

    fn app_group_directory(&self) -> Option<PathBuf> {
        self.app_group.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InstanceKey {
    id: String,
    mode: Mode,
    dir: PathBuf,
}

/// Shares live stores per identity.
pub struct Registry {
    base_dir: PathBuf,
    app_group_dir: Option<PathBuf>,
    config: Config,
    listeners: Arc<ListenerRegistry>,
    instances: Mutex<HashMap<InstanceKey, Arc<Store>>>,
}

impl Registry {
    /// Creates a registry. The provider's directories are resolved once.
    pub fn new(provider: &dyn PathProvider, config: Config) -> Self {
        Self {
            base_dir: provider.base_directory(),
            app_group_dir: provider.app_group_directory(),
            config,
            listeners: Arc::new(ListenerRegistry::new()),
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the live store for `identity`, opening it if needed.
    ///
    /// If the store is already open with a different key or access mode,
    /// the live store is returned and a warning is logged.
    ///
    /// # Errors
    ///
    /// - `InvalidIdentity` for an empty or path-like id
    /// - `InvalidKey` for a key longer than 16 bytes
    /// - `InvalidPath` if the directory is unusable or a read-only store
    ///   does not exist
    /// - Any error from opening the store (`KeyMismatch`, `CorruptRecord`,
    ///   storage errors)
    pub fn acquire(&self, identity: &StoreIdentity) -> CoreResult<Arc<Store>> {
        identity.validate()?;
        let key = self.instance_key(identity);

        // Held across construction so two callers never open the same files
        let mut instances = self.instances.lock();
        if let Some(store) = instances.get(&key) {
            if !store.matches(identity) {
                warn!(
                    store = identity.id(),
                    "store already open with a different key or access mode, returning live instance"
                );
            }
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(Store::open_with_listeners(
            identity,
            &key.dir,
            self.config.clone(),
            Arc::clone(&self.listeners),
        )?);
        instances.insert(key, Arc::clone(&store));
        Ok(store)
    }

    /// Closes and forgets the store for `identity`.
    ///
    /// Returns false if no such store was open. Other holders of the
    /// store see `NotInitialized` from then on.
    pub fn release(&self, identity: &StoreIdentity) -> bool {
        let key = self.instance_key(identity);
        let store = self.instances.lock().remove(&key);
        match store {
            Some(store) => {
                store.close();
                true
            }
            None => false,
        }
    }

    /// Closes every live store.
    pub fn close_all(&self) {
        let stores: Vec<Arc<Store>> = self.instances.lock().drain().map(|(_, s)| s).collect();
        for store in &stores {
            store.close();
        }
        if !stores.is_empty() {
            info!(stores = stores.len(), "closed all stores");
        }
    }

    /// Trims every live store.
    ///
    /// Meant to be wired to the platform's low-memory signal. Failures are
    /// logged and do not stop the other stores from trimming.
    pub fn on_memory_warning(&self) {
        let stores: Vec<Arc<Store>> = self.instances.lock().values().cloned().collect();
        for store in stores {
            if let Err(e) = store.trim() {
                warn!(store = store.id(), error = %e, "trim on memory warning failed");
            }
        }
    }

    /// Returns the identity of the default store.
    #[must_use]
    pub fn default_identity() -> StoreIdentity {
        StoreIdentity::new(DEFAULT_STORE_ID)
    }

    /// Returns the number of live stores.
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }

    /// Returns the listener registry shared by this registry's stores.
    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Returns the directory stores without an explicit path live in.
    pub fn default_directory(&self) -> &Path {
        self.app_group_dir.as_deref().unwrap_or(&self.base_dir)
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn instance_key(&self, identity: &StoreIdentity) -> InstanceKey {
        let dir = identity
            .path()
            .map_or_else(|| self.default_directory().to_path_buf(), Path::to_path_buf);
        InstanceKey {
            id: identity.id().to_string(),
            mode: identity.mode(),
            dir,
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("base_dir", &self.base_dir)
            .field("app_group_dir", &self.app_group_dir)
            .field("instances", &self.instance_count())
            .finish()
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// Installs the process-wide registry.
///
/// Only the first call takes effect; later calls log a warning and return
/// the registry installed first.
pub fn initialize(provider: &dyn PathProvider, config: Config) -> &'static Registry {
    let mut installed = false;
    let registry = GLOBAL.get_or_init(|| {
        installed = true;
        Registry::new(provider, config)
    });
    if installed {
        info!(
            dir = %registry.default_directory().display(),
            "initialized global registry"
        );
    } else {
        warn!("global registry already initialized, ignoring new path provider and config");
    }
    registry
}

/// Returns the process-wide registry.
///
/// # Errors
///
/// Returns `NotInitialized` before [`initialize`] has been called.
pub fn global() -> CoreResult<&'static Registry> {
    GLOBAL.get().ok_or(CoreError::NotInitialized)
}
