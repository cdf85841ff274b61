//! Inspect command implementation.

use super::{CommandResult, OutputFormat};
use mapkv_core::{Header, HeaderState, Store, FORMAT_VERSION, HEADER_SIZE};
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store id.
    pub id: String,
    /// Data file path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Sharing mode.
    pub mode: String,
    /// Whether records are encrypted.
    pub encrypted: bool,
    /// Whether the store was opened read-only.
    pub read_only: bool,
    /// Header details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<HeaderInfo>,
    /// Number of live keys.
    pub key_count: u64,
    /// Log bytes in use.
    pub actual_size: u64,
    /// Mapped file size.
    pub total_size: u64,
    /// Share of the mapping in use, 0 to 1.
    pub utilization: f64,
}

/// What the data file header says.
#[derive(Debug, Serialize)]
pub struct HeaderInfo {
    /// Format version this build writes.
    pub format_version: u16,
    /// Whether the header checksum is valid.
    pub checksum_ok: bool,
    /// Log size recorded in the header.
    pub actual_size: u64,
    /// Whether the encrypted flag is set.
    pub encrypted: bool,
}

/// Runs the inspect command.
pub fn run(store: &Store, format: OutputFormat) -> CommandResult {
    let stats = store.stats();
    let header = match store.data_path() {
        Some(path) => read_header(path)?,
        None => None,
    };

    let result = InspectResult {
        id: store.id().to_string(),
        path: store.data_path().map(|p| p.display().to_string()),
        mode: store.mode().to_string(),
        encrypted: store.is_encrypted(),
        read_only: store.is_read_only(),
        header,
        key_count: stats.key_count,
        actual_size: stats.actual_size,
        total_size: stats.total_size,
        utilization: if stats.total_size == 0 {
            0.0
        } else {
            (stats.actual_size + HEADER_SIZE as u64) as f64 / stats.total_size as f64
        },
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

fn read_header(path: &Path) -> CommandResult<Option<HeaderInfo>> {
    let mut bytes = Vec::with_capacity(HEADER_SIZE);
    File::open(path)?
        .take(HEADER_SIZE as u64)
        .read_to_end(&mut bytes)?;

    let (header, checksum_ok): (Header, bool) = match Header::decode(&bytes)? {
        HeaderState::Blank => return Ok(None),
        HeaderState::Valid(header) => (header, true),
        HeaderState::Damaged(header) => (header, false),
    };
    Ok(Some(HeaderInfo {
        format_version: FORMAT_VERSION,
        checksum_ok,
        actual_size: header.actual_size,
        encrypted: header.is_encrypted(),
    }))
}

fn print_text_output(result: &InspectResult) {
    println!("MapKV Store Inspection");
    println!("======================");
    println!();
    println!("Id:        {}", result.id);
    if let Some(path) = &result.path {
        println!("Path:      {path}");
    }
    println!("Mode:      {}", result.mode);
    println!("Encrypted: {}", result.encrypted);
    println!("Read-only: {}", result.read_only);
    println!();
    println!("Storage:");
    println!("  Log size:    {}", format_size(result.actual_size));
    println!("  File size:   {}", format_size(result.total_size));
    println!("  Utilization: {:.1}%", result.utilization * 100.0);
    println!();
    println!("Keys: {}", result.key_count);

    if let Some(header) = &result.header {
        println!();
        println!("Header:");
        println!("  Version:  {}", header.format_version);
        println!(
            "  Checksum: {}",
            if header.checksum_ok { "ok" } else { "MISMATCH" }
        );
        println!("  Log size: {} bytes", header.actual_size);
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
