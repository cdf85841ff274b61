//! # MapKV Core
//!
//! Memory-mapped key-value store engine.
//!
//! This crate provides:
//! - [`Store`]: a persistent map of string keys to typed values, backed by
//!   an append-only log in a memory-mapped file
//! - [`Registry`]: one shared store per identity, plus a process-wide
//!   registry via [`initialize`] and [`global`]
//! - Change listeners, optional AES-256-GCM encryption at rest, crash
//!   recovery and multi-process sharing
//!
//! ## Example
//!
//! ```
//! use mapkv_core::{Config, FixedPathProvider, Registry, StoreIdentity};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let registry = Registry::new(&FixedPathProvider::new(dir.path()), Config::default());
//!
//! let store = registry
//!     .acquire(&StoreIdentity::new("app").with_encryption_key(b"secret"))
//!     .unwrap();
//! store.set_string("token", "abc").unwrap();
//!
//! assert_eq!(store.get_string("token").unwrap().as_deref(), Some("abc"));
//! assert_eq!(store.get_number("token").unwrap(), None);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
pub mod crypto;
mod dir;
mod error;
mod header;
mod listeners;
mod registry;
mod stats;
mod store;

pub use config::{Config, Mode, StoreIdentity, DEFAULT_INITIAL_CAPACITY};
pub use crypto::{EncryptionKey, RecordCipher};
pub use dir::{MetaState, StorePaths};
pub use error::{CoreError, CoreResult};
pub use header::{Header, HeaderState, FORMAT_VERSION, HEADER_SIZE};
pub use listeners::{ChangeCallback, ListenerHandle, ListenerRegistry};
pub use registry::{
    global, initialize, FixedPathProvider, PathProvider, Registry, DEFAULT_STORE_ID,
};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::Store;

pub use mapkv_codec::{Buffer, Value, ValueKind};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
