//! Maintenance commands: trim, rekey.

use super::CommandResult;
use mapkv_core::Store;

/// Compacts the store and reports the space reclaimed.
pub fn trim(store: &Store) -> CommandResult {
    let before = (store.actual_size()?, store.total_size()?);
    store.trim()?;
    let after = (store.actual_size()?, store.total_size()?);

    println!("log:  {} -> {} bytes", before.0, after.0);
    println!("file: {} -> {} bytes", before.1, after.1);
    Ok(())
}

/// Re-encrypts the store, or decrypts it when `new_key` is `None`.
pub fn rekey(store: &Store, new_key: Option<&str>) -> CommandResult {
    store.recrypt(new_key.map(str::as_bytes))?;
    if store.is_encrypted() {
        println!("store re-encrypted");
    } else {
        println!("store is now unencrypted");
    }
    Ok(())
}
