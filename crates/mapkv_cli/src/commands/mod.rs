//! CLI command implementations.

pub mod data;
pub mod dump;
pub mod inspect;
pub mod maintain;

use clap::ValueEnum;
use mapkv_core::Value;

/// Result type shared by the commands.
pub type CommandResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// How structured output is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Renders a value for text output.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{s:?}"),
        Value::Number(n) => n.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Blob(bytes) => format!("0x{}", encode_hex(bytes)),
    }
}

/// Converts a value to JSON. Blobs become `{"blob": "<hex>"}`.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => serde_json::Value::from(s.as_str()),
        // NaN and infinities have no JSON form
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Blob(bytes) => serde_json::json!({ "blob": encode_hex(bytes) }),
    }
}

/// Lowercase hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Parses hex, ignoring an optional `0x` prefix.
pub fn decode_hex(text: &str) -> CommandResult<Vec<u8>> {
    let text = text.strip_prefix("0x").unwrap_or(text);
    if !text.bytes().all(|b| b.is_ascii_hexdigit()) || text.len() % 2 != 0 {
        return Err(format!("{text:?} is not an even-length hex string").into());
    }

    let mut bytes = Vec::with_capacity(text.len() / 2);
    for i in (0..text.len()).step_by(2) {
        let digits = &text[i..i + 2];
        let byte = u8::from_str_radix(digits, 16)
            .map_err(|_| format!("invalid hex digits {digits:?}"))?;
        bytes.push(byte);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        assert_eq!(encode_hex(&[0x00, 0xAB, 0x7f]), "00ab7f");
        assert_eq!(decode_hex("00ab7f").unwrap(), vec![0x00, 0xAB, 0x7f]);
        assert_eq!(decode_hex("0xFF").unwrap(), vec![0xFF]);
        assert!(decode_hex("").unwrap().is_empty());
    }

    #[test]
    fn bad_hex_is_rejected() {
        assert!(decode_hex("abc").is_err());
        assert!(decode_hex("zz").is_err());
        assert!(decode_hex("é0").is_err());
        assert!(decode_hex("+1").is_err());
    }

    #[test]
    fn render_values() {
        assert_eq!(render(&Value::from("hi")), "\"hi\"");
        assert_eq!(render(&Value::from(1.5)), "1.5");
        assert_eq!(render(&Value::from(true)), "true");
        assert_eq!(render(&Value::from(vec![1u8, 2])), "0x0102");
    }

    #[test]
    fn json_values() {
        assert_eq!(to_json(&Value::from(2.0)), serde_json::json!(2.0));
        assert_eq!(to_json(&Value::from(f64::NAN)), serde_json::Value::Null);
        assert_eq!(
            to_json(&Value::from(vec![0xffu8])),
            serde_json::json!({ "blob": "ff" })
        );
    }
}
