//! Encryption at rest for MapKV stores.
//!
//! ## Security Model
//!
//! - The user key (1 to 16 bytes) is stretched with HKDF-SHA256 over a
//!   random per-file salt into an AES-256 key
//! - Every record body is sealed with AES-256-GCM under a fresh random nonce
//! - A key check value derived from the AES key is stored in the header so
//!   a wrong key is detected before any record is decrypted
//! - Keys are zeroized on drop
//!
//! ## Usage
//!
//! ```
//! use mapkv_core::crypto::{EncryptionKey, RecordCipher};
//!
//! let key = EncryptionKey::new(b"secret").unwrap();
//! let cipher = RecordCipher::new(&key).unwrap();
//!
//! let sealed = cipher.seal(b"record body").unwrap();
//! assert_eq!(cipher.open(&sealed).unwrap(), b"record body");
//! ```

mod cipher;

pub use cipher::{RecordCipher, KEY_CHECK_SIZE, NONCE_SIZE, SALT_SIZE, TAG_SIZE};

use crate::error::{CoreError, CoreResult};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum length of a user-supplied encryption key.
pub const MAX_KEY_LEN: usize = 16;

/// A user-supplied store key.
///
/// The key is automatically zeroized when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: Vec<u8>,
}

impl EncryptionKey {
    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the key is empty or longer than
    /// [`MAX_KEY_LEN`] bytes.
    pub fn new(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.is_empty() || bytes.len() > MAX_KEY_LEN {
            return Err(CoreError::invalid_key(bytes.len(), MAX_KEY_LEN));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Parses an optional key where empty means "no encryption".
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the key is too long.
    pub fn optional(bytes: Option<&[u8]>) -> CoreResult<Option<Self>> {
        match bytes {
            None | Some([]) => Ok(None),
            Some(bytes) => Self::new(bytes).map(Some),
        }
    }

    /// Returns the key as a byte slice.
    ///
    /// # Security
    ///
    /// Don't log or serialize the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_length_limits() {
        assert!(EncryptionKey::new(b"k").is_ok());
        assert!(EncryptionKey::new(&[1u8; MAX_KEY_LEN]).is_ok());
        assert!(matches!(
            EncryptionKey::new(&[1u8; 20]),
            Err(CoreError::InvalidKey { len: 20, .. })
        ));
        assert!(EncryptionKey::new(b"").is_err());
    }

    #[test]
    fn optional_key() {
        assert!(EncryptionKey::optional(None).unwrap().is_none());
        assert!(EncryptionKey::optional(Some(&b""[..])).unwrap().is_none());
        let key = EncryptionKey::optional(Some(&b"abc"[..])).unwrap().unwrap();
        assert_eq!(key.as_bytes(), b"abc");
        assert!(EncryptionKey::optional(Some(&[0u8; 17][..])).is_err());
    }

    #[test]
    fn debug_is_redacted() {
        let key = EncryptionKey::new(b"topsecret").unwrap();
        assert!(!format!("{key:?}").contains("topsecret"));
    }
}
