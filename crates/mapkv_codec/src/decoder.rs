//! Log record decoder.
//!
//! Decoding never panics on malformed input. Every defect is reported as
//! [`CodecError::CorruptRecord`] or [`CodecError::Truncated`], which the
//! storage engine treats as the end of the usable log.

use crate::encoder::{FRAME_HEADER_SIZE, TOMBSTONE_TAG};
use crate::error::{CodecError, CodecResult};
use crate::value::{Value, ValueKind};
use bytes::Bytes;

/// A decoded record: a key and its value, or a tombstone.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// The key.
    pub key: String,
    /// The value; `None` for a tombstone.
    pub value: Option<Value>,
}

impl Record {
    /// Returns true if this record removes its key.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// Decodes a record body produced by [`crate::encode_record`].
///
/// # Errors
///
/// Returns an error if the body is truncated, has an unknown tag, holds
/// invalid UTF-8, or carries trailing bytes.
pub fn decode_record(body: &[u8]) -> CodecResult<Record> {
    let mut decoder = RecordDecoder::new(body);
    let record = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::corrupt(format!(
            "{} trailing bytes after record",
            decoder.remaining().len()
        )));
    }
    Ok(record)
}

/// Cursor-based decoder for a single record body.
pub struct RecordDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Decode the next record.
    pub fn decode(&mut self) -> CodecResult<Record> {
        let tag = self.read_byte()?;
        let key_bytes = self.read_sized()?;
        let key = std::str::from_utf8(key_bytes)
            .map_err(|_| CodecError::corrupt("key is not valid UTF-8"))?
            .to_string();

        if tag == TOMBSTONE_TAG {
            return Ok(Record { key, value: None });
        }

        let kind = ValueKind::from_byte(tag)
            .ok_or_else(|| CodecError::corrupt(format!("unknown value tag {tag}")))?;

        let value = match kind {
            ValueKind::String => {
                let bytes = self.read_sized()?;
                let text = std::str::from_utf8(bytes)
                    .map_err(|_| CodecError::corrupt("string value is not valid UTF-8"))?;
                Value::String(text.to_string())
            }
            ValueKind::Number => {
                let bytes = self.read_bytes(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Value::Number(f64::from_le_bytes(raw))
            }
            ValueKind::Boolean => match self.read_byte()? {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                other => {
                    return Err(CodecError::corrupt(format!(
                        "invalid boolean byte {other:#04x}"
                    )))
                }
            },
            ValueKind::Blob => Value::Blob(Bytes::copy_from_slice(self.read_sized()?)),
        };

        Ok(Record {
            key,
            value: Some(value),
        })
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let available = self.data.len() - self.pos;
        if len > available {
            return Err(CodecError::truncated(len, available));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_sized(&mut self) -> CodecResult<&'a [u8]> {
        let len = read_u32(self.read_bytes(4)?) as usize;
        self.read_bytes(len)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// A checksummed frame located inside a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Offset of the frame header relative to the start of the scanned slice.
    pub offset: usize,
    /// The frame body (CRC already verified).
    pub body: &'a [u8],
}

impl Frame<'_> {
    /// Total size of the frame including its header.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.body.len()
    }
}

/// Iterates the frames of a log slice.
///
/// Iteration stops at the end of the slice or at a zero length prefix,
/// which marks unused (zero-filled) space. A frame whose header or body
/// runs past the slice, or whose checksum does not match, yields an error;
/// the caller decides where the usable log ends from [`position`].
///
/// [`position`]: FrameReader::position
pub struct FrameReader<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> FrameReader<'a> {
    /// Create a reader over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            failed: false,
        }
    }

    /// Offset just past the last frame that was returned successfully.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    fn read_frame(&mut self) -> Option<CodecResult<Frame<'a>>> {
        let remaining = &self.data[self.pos..];
        if remaining.is_empty() {
            return None;
        }
        if remaining.len() < FRAME_HEADER_SIZE {
            if remaining.iter().all(|b| *b == 0) {
                return None;
            }
            return Some(Err(CodecError::truncated(
                FRAME_HEADER_SIZE,
                remaining.len(),
            )));
        }

        let len = read_u32(&remaining[..4]) as usize;
        if len == 0 {
            return None;
        }
        let stored_crc = read_u32(&remaining[4..8]);

        let available = remaining.len() - FRAME_HEADER_SIZE;
        if len > available {
            return Some(Err(CodecError::truncated(len, available)));
        }

        let body = &remaining[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len];
        let computed_crc = crc32fast::hash(body);
        if stored_crc != computed_crc {
            return Some(Err(CodecError::corrupt(format!(
                "checksum mismatch at offset {}: expected {stored_crc:08x}, got {computed_crc:08x}",
                self.pos
            ))));
        }

        let frame = Frame {
            offset: self.pos,
            body,
        };
        self.pos += frame.encoded_len();
        Some(Ok(frame))
    }
}

impl<'a> Iterator for FrameReader<'a> {
    type Item = CodecResult<Frame<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.read_frame();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}
