//! AEAD record sealing for safe storage.
//!
//! Every value persisted through [`SafeStorage`] is wrapped in an
//! [`EncryptedRecord`]: XChaCha20-Poly1305 ciphertext plus the fresh random
//! nonce used to produce it. The record's logical storage key is bound into
//! the associated data, so a ciphertext copied under a different key fails
//! authentication instead of decrypting.
//!
//! [`SafeStorage`]: crate::safe_storage::SafeStorage

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};
use crate::kdf::DerivedKey;

/// Byte length of an XChaCha20-Poly1305 nonce.
pub const NONCE_LEN: usize = 24;

/// Domain separation label mixed into every record's associated data.
const RECORD_AD_LABEL: &[u8] = b"vaultkit:record";

/// Envelope format version persisted with every record.
const RECORD_VERSION: u32 = 1;

/// The only shape ever written to the backing store by safe storage.
#[derive(Clone, Serialize, Deserialize)]
pub struct EncryptedRecord {
    /// Envelope format version.
    pub version: u32,
    /// Random nonce generated for this record.
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the appended Poly1305 authentication tag.
    pub ciphertext: Vec<u8>,
}

impl EncryptedRecord {
    /// Encodes the record to CBOR bytes for persistence.
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR encoding fails.
    pub fn serialize(&self) -> StorageResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        Ok(bytes)
    }

    /// Decodes a record from persisted CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are malformed or the envelope version
    /// is unknown.
    pub fn deserialize(bytes: &[u8]) -> StorageResult<Self> {
        let record: Self = ciborium::de::from_reader(bytes)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        if record.version != RECORD_VERSION {
            return Err(StorageError::UnsupportedRecordVersion(record.version));
        }
        Ok(record)
    }
}

/// Associated data: `label || storage key`.
///
/// Binding the storage key authenticates *where* a record lives, not just
/// its content.
fn build_associated_data(storage_key: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(RECORD_AD_LABEL.len() + storage_key.len());
    aad.extend_from_slice(RECORD_AD_LABEL);
    aad.extend_from_slice(storage_key.as_bytes());
    aad
}

fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypts `plaintext` for storage under `storage_key`.
///
/// # Errors
///
/// Returns an error if encryption fails (should not happen with valid
/// inputs; the key length is 32 bytes by construction).
pub fn seal(
    key: &DerivedKey,
    storage_key: &str,
    plaintext: &[u8],
) -> StorageResult<EncryptedRecord> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|err| StorageError::Encryption(err.to_string()))?;
    let nonce = generate_nonce();
    let aad = build_associated_data(storage_key);

    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| StorageError::Encryption("XChaCha20-Poly1305 failed".to_string()))?;

    Ok(EncryptedRecord {
        version: RECORD_VERSION,
        nonce,
        ciphertext,
    })
}

/// Decrypts a record previously sealed under `storage_key`.
///
/// Fails closed: any authentication failure (wrong key, tampered
/// ciphertext, record moved to a different key) yields
/// [`StorageError::Decryption`] and never garbage plaintext.
///
/// # Errors
///
/// Returns [`StorageError::Decryption`] on authentication failure and
/// [`StorageError::Encryption`] if the cipher cannot be constructed.
pub fn open(
    key: &DerivedKey,
    storage_key: &str,
    record: &EncryptedRecord,
) -> StorageResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|err| StorageError::Encryption(err.to_string()))?;
    let aad = build_associated_data(storage_key);

    cipher
        .decrypt(
            XNonce::from_slice(&record.nonce),
            Payload {
                msg: &record.ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| {
            StorageError::Decryption(format!("record '{storage_key}' failed authentication"))
        })
}
