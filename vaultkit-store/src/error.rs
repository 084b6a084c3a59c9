//! Error types for the safe storage primitives.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the safe storage primitives.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No record exists under the requested key.
    #[error("no record stored under key '{key}'")]
    NotFound {
        /// The logical key that was looked up.
        key: String,
    },

    /// AEAD authentication failed: wrong key or tampered ciphertext.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Encryption failed (should not happen with valid inputs).
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// The supplied password is empty.
    #[error("password must not be empty")]
    WeakPassword,

    /// The password-based key derivation function failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Serialization/deserialization failures.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Errors coming from the backing key-value store.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A multi-entry save persisted some entries but not others.
    #[error("failed to persist keys: {}", failed.join(", "))]
    PartialWrite {
        /// Logical keys whose entries were not persisted.
        failed: Vec<String>,
    },

    /// A persisted record carries an unknown envelope version.
    #[error("unsupported record version: {0}")]
    UnsupportedRecordVersion(u32),
}
