//! Per-store record sealing with AES-256-GCM.

use super::EncryptionKey;
use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Size of the per-file HKDF salt.
pub const SALT_SIZE: usize = 16;
/// Size of the key check value stored in the header.
pub const KEY_CHECK_SIZE: usize = 16;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const DERIVED_KEY_SIZE: usize = 32;
const KDF_INFO: &[u8] = b"mapkv-record-key-v1";
const CHECK_LABEL: &[u8] = b"mapkv-key-check-v1";

/// Seals and opens record bodies for one data file.
///
/// Sealed layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
pub struct RecordCipher {
    cipher: Aes256Gcm,
    salt: [u8; SALT_SIZE],
    key_check: [u8; KEY_CHECK_SIZE],
}

impl RecordCipher {
    /// Creates a cipher for a new file with a random salt.
    ///
    /// # Errors
    ///
    /// Returns an error if key derivation fails.
    pub fn new(key: &EncryptionKey) -> CoreResult<Self> {
        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::with_salt(key, salt)
    }

    /// Recreates the cipher of an existing file from its stored salt.
    ///
    /// # Errors
    ///
    /// Returns an error if key derivation fails.
    pub fn with_salt(key: &EncryptionKey, salt: [u8; SALT_SIZE]) -> CoreResult<Self> {
        let hk = Hkdf::<Sha256>::new(Some(&salt[..]), key.as_bytes());
        let mut derived = Zeroizing::new([0u8; DERIVED_KEY_SIZE]);
        hk.expand(KDF_INFO, &mut derived[..])
            .map_err(|_| CoreError::encryption_failed("HKDF expand failed"))?;

        let digest = Sha256::new()
            .chain_update(&derived[..])
            .chain_update(CHECK_LABEL)
            .finalize();
        let mut key_check = [0u8; KEY_CHECK_SIZE];
        key_check.copy_from_slice(&digest[..KEY_CHECK_SIZE]);

        let cipher = Aes256Gcm::new(GenericArray::from_slice(&derived[..]));
        Ok(Self {
            cipher,
            salt,
            key_check,
        })
    }

    /// Returns the salt to store in the header.
    #[must_use]
    pub fn salt(&self) -> [u8; SALT_SIZE] {
        self.salt
    }

    /// Returns the key check value to store in the header.
    #[must_use]
    pub fn key_check(&self) -> [u8; KEY_CHECK_SIZE] {
        self.key_check
    }

    /// Returns true if `key_check` was produced by the same key and salt.
    #[must_use]
    pub fn verifies(&self, key_check: &[u8; KEY_CHECK_SIZE]) -> bool {
        self.key_check
            .iter()
            .zip(key_check)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Encrypts a record body under a fresh nonce.
    ///
    /// # Errors
    ///
    /// Returns `EncryptionFailed` if the AEAD rejects the input.
    pub fn seal(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CoreError::encryption_failed("AES-GCM seal failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend(ciphertext);
        Ok(sealed)
    }

    /// Decrypts and authenticates a sealed record body.
    ///
    /// # Errors
    ///
    /// Returns `DecryptionFailed` on a wrong key or tampered data.
    pub fn open(&self, sealed: &[u8]) -> CoreResult<Vec<u8>> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CoreError::decryption_failed("sealed record too short"));
        }

        let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
        self.cipher
            .decrypt(nonce, &sealed[NONCE_SIZE..])
            .map_err(|_| CoreError::decryption_failed("authentication tag mismatch"))
    }

    /// Bytes added to every sealed body.
    #[must_use]
    pub const fn overhead() -> usize {
        NONCE_SIZE + TAG_SIZE
    }
}

impl std::fmt::Debug for RecordCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCipher")
            .field("cipher", &"Aes256Gcm")
            .field("salt", &self.salt)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(bytes: &[u8]) -> EncryptionKey {
        EncryptionKey::new(bytes).unwrap()
    }

    #[test]
    fn seal_open_roundtrip() {
        let cipher = RecordCipher::new(&key(b"secret")).unwrap();

        let sealed = cipher.seal(b"Hello, MapKV!").unwrap();
        assert_eq!(sealed.len(), 13 + RecordCipher::overhead());
        assert_ne!(&sealed[NONCE_SIZE..NONCE_SIZE + 13], b"Hello, MapKV!");
        assert_eq!(cipher.open(&sealed).unwrap(), b"Hello, MapKV!");
    }

    #[test]
    fn nonces_are_fresh() {
        let cipher = RecordCipher::new(&key(b"secret")).unwrap();
        assert_ne!(cipher.seal(b"same").unwrap(), cipher.seal(b"same").unwrap());
    }

    #[test]
    fn same_key_and_salt_reproduce_cipher() {
        let first = RecordCipher::new(&key(b"secret")).unwrap();
        let second = RecordCipher::with_salt(&key(b"secret"), first.salt()).unwrap();

        assert!(second.verifies(&first.key_check()));
        let sealed = first.seal(b"data").unwrap();
        assert_eq!(second.open(&sealed).unwrap(), b"data");
    }

    #[test]
    fn wrong_key_fails_check_and_open() {
        let right = RecordCipher::new(&key(b"right")).unwrap();
        let wrong = RecordCipher::with_salt(&key(b"wrong"), right.salt()).unwrap();

        assert!(!wrong.verifies(&right.key_check()));
        let sealed = right.seal(b"data").unwrap();
        assert!(matches!(
            wrong.open(&sealed),
            Err(CoreError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn fresh_salt_changes_key_check() {
        let a = RecordCipher::new(&key(b"secret")).unwrap();
        let b = RecordCipher::new(&key(b"secret")).unwrap();
        assert_ne!(a.salt(), b.salt());
        assert!(!a.verifies(&b.key_check()));
    }

    #[test]
    fn tampered_or_short_input_fails() {
        let cipher = RecordCipher::new(&key(b"secret")).unwrap();
        let mut sealed = cipher.seal(b"data").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(cipher.open(&sealed).is_err());
        assert!(cipher.open(&[0u8; 10]).is_err());
    }

    #[test]
    fn empty_body() {
        let cipher = RecordCipher::new(&key(b"k")).unwrap();
        let sealed = cipher.seal(b"").unwrap();
        assert!(cipher.open(&sealed).unwrap().is_empty());
    }
}
