//! Entry commands: get, set, remove, keys, clear.

use super::{decode_hex, render, CommandResult};
use mapkv_core::{Store, Value};

/// Prints the value under `key`.
pub fn get(store: &Store, key: &str) -> CommandResult {
    let value = store
        .get(key)?
        .ok_or_else(|| format!("key {key:?} not found"))?;
    println!("{}", render(&value));
    Ok(())
}

/// Builds a value from the mutually exclusive `set` options.
pub fn parse_value(
    string: Option<String>,
    number: Option<f64>,
    boolean: Option<bool>,
    blob_hex: Option<&str>,
) -> CommandResult<Value> {
    match (string, number, boolean, blob_hex) {
        (Some(s), None, None, None) => Ok(Value::from(s)),
        (None, Some(n), None, None) => Ok(Value::from(n)),
        (None, None, Some(b), None) => Ok(Value::from(b)),
        (None, None, None, Some(hex)) => Ok(Value::from(decode_hex(hex)?)),
        _ => Err("exactly one of --string, --number, --boolean, --blob-hex is required".into()),
    }
}

/// Stores `value` under `key`.
pub fn set(store: &Store, key: &str, value: Value) -> CommandResult {
    let kind = value.kind();
    store.set(key, value)?;
    println!("set {key:?} ({})", kind.name());
    Ok(())
}

/// Removes `key`.
pub fn remove(store: &Store, key: &str) -> CommandResult {
    if store.remove(key)? {
        println!("removed {key:?}");
    } else {
        println!("{key:?} was not present");
    }
    Ok(())
}

/// Lists keys, one per line.
pub fn keys(store: &Store) -> CommandResult {
    for key in store.all_keys()? {
        println!("{key}");
    }
    Ok(())
}

/// Removes every key.
pub fn clear(store: &Store) -> CommandResult {
    let count = store.count()?;
    store.clear_all()?;
    println!("removed {count} keys");
    Ok(())
}
