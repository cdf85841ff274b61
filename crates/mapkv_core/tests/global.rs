//! The process-wide registry.
//!
//! Kept in its own test binary: the global can only be installed once.

use mapkv_core::{
    global, initialize, Config, CoreError, FixedPathProvider, Registry, StoreIdentity,
};
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn initialize_once_then_global() {
    assert!(matches!(global(), Err(CoreError::NotInitialized)));

    let first = tempdir().unwrap();
    let second = tempdir().unwrap();

    let registry = initialize(
        &FixedPathProvider::new(first.path()),
        Config::new().initial_capacity(8192).sync_on_write(false),
    );
    assert_eq!(registry.default_directory(), first.path());
    assert_eq!(registry.config().initial_capacity, 8192);

    // Later calls keep the first provider and config
    let again = initialize(&FixedPathProvider::new(second.path()), Config::default());
    assert!(std::ptr::eq(registry, again));
    assert_eq!(again.default_directory(), first.path());
    assert!(!again.config().sync_on_write);

    let store = global()
        .unwrap()
        .acquire(&Registry::default_identity())
        .unwrap();
    store.set_string("k", "v").unwrap();
    assert!(first.path().join("mapkv.default").is_file());
    assert_eq!(store.total_size().unwrap(), 8192);

    let same = registry.acquire(&StoreIdentity::new("mapkv.default")).unwrap();
    assert!(Arc::ptr_eq(&store, &same));

    registry.close_all();
    assert!(matches!(store.get("k"), Err(CoreError::NotInitialized)));
}
