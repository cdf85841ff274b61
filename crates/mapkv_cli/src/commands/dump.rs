//! Dump command implementation.

use super::{render, to_json, CommandResult, OutputFormat};
use mapkv_core::Store;
use serde_json::{Map, Value as Json};

/// Prints every entry in key order.
pub fn run(store: &Store, format: OutputFormat) -> CommandResult {
    let mut entries = Vec::new();
    for key in store.all_keys()? {
        // A key removed by another process since listing is skipped
        if let Some(value) = store.get(&key)? {
            entries.push((key, value));
        }
    }

    match format {
        OutputFormat::Json => {
            let object: Map<String, Json> = entries
                .iter()
                .map(|(key, value)| (key.clone(), to_json(value)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&object)?);
        }
        OutputFormat::Text => {
            for (key, value) in &entries {
                println!("{key:?} [{}] = {}", value.kind().name(), render(value));
            }
        }
    }
    Ok(())
}
