//! Data file header.
//!
//! ```text
//! offset size field
//!      0    4 magic "MAPK"
//!      4    2 format version
//!      6    2 flags (bit 0: encrypted)
//!      8    8 actual_size: log bytes after the header
//!     16   16 encryption salt
//!     32   16 key check
//!     48    4 crc32 of bytes 0..48
//!     52   12 reserved
//! ```
//!
//! All integers are little-endian.

use crate::crypto::{RecordCipher, KEY_CHECK_SIZE, SALT_SIZE};
use crate::error::{CoreError, CoreResult};

/// Size of the header at the start of every data file.
pub const HEADER_SIZE: usize = 64;

/// Magic bytes identifying a data file.
pub const MAGIC: [u8; 4] = *b"MAPK";

/// Current format version.
pub const FORMAT_VERSION: u16 = 1;

const FLAG_ENCRYPTED: u16 = 1;
const CRC_OFFSET: usize = 48;

/// Decoded header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Flag bits.
    pub flags: u16,
    /// Bytes of log following the header.
    pub actual_size: u64,
    /// HKDF salt (zero when unencrypted).
    pub salt: [u8; SALT_SIZE],
    /// Key check value (zero when unencrypted).
    pub key_check: [u8; KEY_CHECK_SIZE],
}

/// What was found at the start of a data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderState {
    /// All zero: a new file.
    Blank,
    /// Magic and checksum are valid.
    Valid(Header),
    /// Magic is valid but the checksum is not; `actual_size` can't be trusted.
    Damaged(Header),
}

impl Header {
    /// Creates an empty-log header, encrypted when a cipher is given.
    #[must_use]
    pub fn new(cipher: Option<&RecordCipher>) -> Self {
        match cipher {
            Some(cipher) => Self {
                flags: FLAG_ENCRYPTED,
                actual_size: 0,
                salt: cipher.salt(),
                key_check: cipher.key_check(),
            },
            None => Self::default(),
        }
    }

    /// Returns true if records are sealed.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Serializes the header.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[6..8].copy_from_slice(&self.flags.to_le_bytes());
        buf[8..16].copy_from_slice(&self.actual_size.to_le_bytes());
        buf[16..32].copy_from_slice(&self.salt);
        buf[32..48].copy_from_slice(&self.key_check);
        let crc = crc32fast::hash(&buf[..CRC_OFFSET]);
        buf[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Reads the header at the start of `data`.
    ///
    /// # Errors
    ///
    /// Returns `CorruptRecord` if the bytes are not zero and do not carry the
    /// MapKV magic, or if the format version is newer than this build.
    pub fn decode(data: &[u8]) -> CoreResult<HeaderState> {
        let head = &data[..data.len().min(HEADER_SIZE)];
        if head.iter().all(|b| *b == 0) {
            return Ok(HeaderState::Blank);
        }
        if head.len() < HEADER_SIZE || head[0..4] != MAGIC {
            return Err(CoreError::corrupt_record("not a MapKV data file"));
        }

        let version = u16::from_le_bytes([head[4], head[5]]);
        if version > FORMAT_VERSION {
            return Err(CoreError::corrupt_record(format!(
                "unsupported format version {version}"
            )));
        }

        let mut actual_size = [0u8; 8];
        actual_size.copy_from_slice(&head[8..16]);
        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&head[16..32]);
        let mut key_check = [0u8; KEY_CHECK_SIZE];
        key_check.copy_from_slice(&head[32..48]);

        let header = Self {
            flags: u16::from_le_bytes([head[6], head[7]]),
            actual_size: u64::from_le_bytes(actual_size),
            salt,
            key_check,
        };

        let stored = u32::from_le_bytes([
            head[CRC_OFFSET],
            head[CRC_OFFSET + 1],
            head[CRC_OFFSET + 2],
            head[CRC_OFFSET + 3],
        ]);
        if stored == crc32fast::hash(&head[..CRC_OFFSET]) {
            Ok(HeaderState::Valid(header))
        } else {
            Ok(HeaderState::Damaged(header))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::EncryptionKey;

    #[test]
    fn encode_decode() {
        let header = Header {
            actual_size: 1234,
            ..Header::default()
        };
        let bytes = header.encode();
        assert_eq!(&bytes[0..4], b"MAPK");
        assert_eq!(Header::decode(&bytes).unwrap(), HeaderState::Valid(header));
    }

    #[test]
    fn encrypted_header_carries_cipher_params() {
        let cipher = RecordCipher::new(&EncryptionKey::new(b"k").unwrap()).unwrap();
        let header = Header::new(Some(&cipher));
        assert!(header.is_encrypted());
        assert_eq!(header.salt, cipher.salt());
        assert!(!Header::new(None).is_encrypted());
    }

    #[test]
    fn zeroes_are_blank() {
        assert_eq!(Header::decode(&[0u8; 4096]).unwrap(), HeaderState::Blank);
        assert_eq!(Header::decode(&[]).unwrap(), HeaderState::Blank);
    }

    #[test]
    fn bad_checksum_is_damaged() {
        let header = Header {
            actual_size: 99,
            ..Header::default()
        };
        let mut bytes = header.encode();
        bytes[9] ^= 0x01;
        assert!(matches!(
            Header::decode(&bytes).unwrap(),
            HeaderState::Damaged(_)
        ));
    }

    #[test]
    fn foreign_bytes_are_rejected() {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(b"JUNK");
        assert!(matches!(
            Header::decode(&bytes),
            Err(CoreError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn newer_version_is_rejected() {
        let mut bytes = Header::default().encode();
        bytes[4..6].copy_from_slice(&9u16.to_le_bytes());
        assert!(Header::decode(&bytes).is_err());
    }
}
