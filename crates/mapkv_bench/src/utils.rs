//! Benchmark utilities.

use mapkv_core::{Config, Store, StoreIdentity, Value};
use rand::Rng;
use tempfile::TempDir;

/// Generate random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` distinct keys.
pub fn generate_keys(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("key:{i:08}")).collect()
}

/// Generate entries cycling through every value type.
pub fn generate_entries(count: usize, payload_size: usize) -> Vec<(String, Value)> {
    let mut rng = rand::thread_rng();
    generate_keys(count)
        .into_iter()
        .enumerate()
        .map(|(i, key)| {
            let value = match i % 4 {
                0 => Value::from("x".repeat(payload_size)),
                1 => Value::from(rng.gen::<f64>()),
                2 => Value::from(rng.gen::<bool>()),
                _ => Value::from(random_data(payload_size)),
            };
            (key, value)
        })
        .collect()
}

/// Open a file-backed store in a fresh temporary directory.
///
/// The directory lives as long as the returned `TempDir`.
pub fn temp_store(id: &str, key: Option<&[u8]>, config: Config) -> (TempDir, Store) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let mut identity = StoreIdentity::new(id);
    if let Some(key) = key {
        identity = identity.with_encryption_key(key);
    }
    let store = Store::open(&identity, dir.path(), config).expect("Failed to open store");
    (dir, store)
}
