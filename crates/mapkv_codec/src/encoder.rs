//! Log record encoder.
//!
//! ```text
//! frame:  | len: u32 | crc32(body): u32 | body (len bytes) |
//! body:   | tag: u8 | key_len: u32 | key | value |
//! value:  String  -> | len: u32 | utf8 |
//!         Number  -> | f64 LE |
//!         Boolean -> | 0 or 1 |
//!         Blob    -> | len: u32 | bytes |
//!         (tombstone, tag 0, has no value)
//! ```
//!
//! All integers are little-endian.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Tag byte of a tombstone record.
pub const TOMBSTONE_TAG: u8 = 0;

/// Size of the frame header (`len` + `crc`).
pub const FRAME_HEADER_SIZE: usize = 8;

/// Maximum size of a key, value payload or frame body.
pub const MAX_FIELD_SIZE: usize = u32::MAX as usize;

/// Encodes a record body for `key`.
///
/// `None` encodes a tombstone.
///
/// # Errors
///
/// Returns an error if the key or value exceeds [`MAX_FIELD_SIZE`].
pub fn encode_record(key: &str, value: Option<&Value>) -> CodecResult<Vec<u8>> {
    let mut encoder = RecordEncoder::with_capacity(record_len(key, value));
    encoder.encode(key, value)?;
    Ok(encoder.into_bytes())
}

/// Wraps a body in a length-prefixed, checksummed frame.
///
/// # Errors
///
/// Returns an error if the body exceeds [`MAX_FIELD_SIZE`].
pub fn encode_frame(body: &[u8]) -> CodecResult<Vec<u8>> {
    let len = checked_len(body.len())?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(body).to_le_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Number of bytes [`encode_record`] produces.
#[must_use]
pub fn record_len(key: &str, value: Option<&Value>) -> usize {
    1 + 4 + key.len() + value.map_or(0, Value::encoded_len)
}

fn checked_len(len: usize) -> CodecResult<u32> {
    u32::try_from(len).map_err(|_| CodecError::SizeLimitExceeded {
        size: len,
        max_allowed: MAX_FIELD_SIZE,
    })
}

/// Streaming encoder for record bodies.
#[derive(Debug, Default)]
pub struct RecordEncoder {
    buffer: Vec<u8>,
}

impl RecordEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Appends one record body.
    ///
    /// # Errors
    ///
    /// Returns an error if the key or value exceeds [`MAX_FIELD_SIZE`].
    pub fn encode(&mut self, key: &str, value: Option<&Value>) -> CodecResult<()> {
        let key_len = checked_len(key.len())?;
        let tag = value.map_or(TOMBSTONE_TAG, |v| v.kind().as_byte());

        self.buffer.push(tag);
        self.buffer.extend_from_slice(&key_len.to_le_bytes());
        self.buffer.extend_from_slice(key.as_bytes());

        match value {
            None => {}
            Some(Value::String(s)) => self.encode_sized(s.as_bytes())?,
            Some(Value::Number(n)) => self.buffer.extend_from_slice(&n.to_le_bytes()),
            Some(Value::Boolean(b)) => self.buffer.push(u8::from(*b)),
            Some(Value::Blob(b)) => self.encode_sized(b)?,
        }
        Ok(())
    }

    fn encode_sized(&mut self, data: &[u8]) -> CodecResult<()> {
        let len = checked_len(data.len())?;
        self.buffer.extend_from_slice(&len.to_le_bytes());
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Consumes the encoder and returns the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_layout() {
        let body = encode_record("k", Some(&Value::from("ab"))).unwrap();
        assert_eq!(body, vec![1, 1, 0, 0, 0, b'k', 2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn number_layout() {
        let body = encode_record("n", Some(&Value::from(1.0))).unwrap();
        assert_eq!(body[0], 2);
        assert_eq!(&body[6..], &1.0f64.to_le_bytes());
    }

    #[test]
    fn boolean_layout() {
        let body = encode_record("b", Some(&Value::from(true))).unwrap();
        assert_eq!(body, vec![3, 1, 0, 0, 0, b'b', 1]);
    }

    #[test]
    fn tombstone_layout() {
        let body = encode_record("gone", None).unwrap();
        assert_eq!(body, vec![0, 4, 0, 0, 0, b'g', b'o', b'n', b'e']);
    }

    #[test]
    fn record_len_matches_encoding() {
        let values = [
            Some(Value::from("hello")),
            Some(Value::from(3.25)),
            Some(Value::from(false)),
            Some(Value::from(vec![7u8; 33])),
            None,
        ];
        for value in &values {
            let body = encode_record("some-key", value.as_ref()).unwrap();
            assert_eq!(body.len(), record_len("some-key", value.as_ref()));
        }
    }

    #[test]
    fn frame_carries_length_and_crc() {
        let frame = encode_frame(b"payload").unwrap();
        assert_eq!(&frame[..4], &7u32.to_le_bytes());
        assert_eq!(&frame[4..8], &crc32fast::hash(b"payload").to_le_bytes());
        assert_eq!(&frame[8..], b"payload");
    }
}
