//! Password-based key derivation.
//!
//! Turns a user password into a [`DerivedKey`] via Argon2id, a memory-hard
//! function designed for low-entropy input. The derivation is deterministic
//! for a given (password, salt) pair, so the key that encrypted a vault can
//! be reproduced at unlock time from the stored salt.
//!
//! The salt is generated once per vault and persisted in plaintext under a
//! reserved storage key. It is not a secret; it only prevents cross-vault
//! rainbow-table reuse.

use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{StorageError, StorageResult};
use crate::kv::KeyValueStore;

/// Byte length of a derived key.
pub const KEY_LEN: usize = 32;

/// Byte length of the per-vault KDF salt.
pub const SALT_LEN: usize = 16;

/// Symmetric key derived from a user password (256-bit).
///
/// The key is an opaque handle: its raw bytes are only readable inside this
/// crate, by the cipher layer. It is zeroized on drop and never logged or
/// serialized in plaintext.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    pub(crate) const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub(crate) const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Random per-vault salt for the password KDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfSalt([u8; SALT_LEN]);

impl KdfSalt {
    /// Generates a fresh random salt.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Builds a salt from persisted bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not exactly [`SALT_LEN`] bytes long.
    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        let salt: [u8; SALT_LEN] = bytes.try_into().map_err(|_| {
            StorageError::Serialization(format!(
                "salt length mismatch: expected {SALT_LEN}, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(salt))
    }

    /// Returns the raw salt bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.0
    }

    /// Hex encoding for host-tooling display and export.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a salt from its hex encoding.
    ///
    /// # Errors
    ///
    /// Returns an error for non-hex input or a length other than
    /// [`SALT_LEN`] bytes.
    pub fn from_hex(encoded: &str) -> StorageResult<Self> {
        let bytes = hex::decode(encoded)
            .map_err(|err| StorageError::Serialization(format!("invalid salt hex: {err}")))?;
        Self::from_bytes(&bytes)
    }
}

/// Argon2id tuning parameters.
///
/// The defaults follow the first recommended parameter set of RFC 9106:
/// 64 MiB of memory, 3 passes, no parallelism. Derivation takes a noticeable
/// fraction of a second on commodity hardware; that cost is the point.
#[derive(Debug, Clone, Copy)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Number of passes.
    pub t_cost: u32,
    /// Degree of parallelism.
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 65_536, // 64 MiB
            t_cost: 3,
            p_cost: 1,
        }
    }
}

impl KdfParams {
    /// Reduced-cost parameters for tests and development hosts.
    ///
    /// These offer no meaningful brute-force resistance. Never use them for
    /// a real vault.
    #[must_use]
    pub const fn fast_insecure() -> Self {
        Self {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
        }
    }
}

/// Derives a symmetric key from a user password.
///
/// Deterministic for a given (password, salt, params) triple. The password
/// is consumed through [`SecretString`] and not retained beyond this call.
///
/// # Errors
///
/// Returns [`StorageError::WeakPassword`] iff the password is empty.
/// Derivation itself succeeds for any non-empty input; invalid tuning
/// parameters surface as [`StorageError::KeyDerivation`].
pub fn derive_key(
    password: &SecretString,
    salt: &KdfSalt,
    params: &KdfParams,
) -> StorageResult<DerivedKey> {
    if password.expose_secret().is_empty() {
        return Err(StorageError::WeakPassword);
    }

    let argon2_params = argon2::Params::new(
        params.m_cost,
        params.t_cost,
        params.p_cost,
        Some(KEY_LEN),
    )
    .map_err(|err| StorageError::KeyDerivation(format!("invalid parameters: {err}")))?;

    let argon2 = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let mut output = [0u8; KEY_LEN];
    argon2
        .hash_password_into(
            password.expose_secret().as_bytes(),
            salt.as_bytes(),
            &mut output,
        )
        .map_err(|err| StorageError::KeyDerivation(err.to_string()))?;

    Ok(DerivedKey::from_bytes(output))
}

/// Loads a persisted salt from the backing store.
///
/// Returns `Ok(None)` if no salt has been written under `key` yet.
///
/// # Errors
///
/// Returns an error on backend failure or a malformed salt record.
pub async fn load_salt(
    store: &dyn KeyValueStore,
    key: &str,
) -> StorageResult<Option<KdfSalt>> {
    match store.get(key).await? {
        Some(bytes) => Ok(Some(KdfSalt::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

/// Persists a salt in plaintext under `key`.
///
/// The salt is deliberately not routed through the encrypted path: it must
/// be readable before any key can be derived, and it is not a secret.
///
/// # Errors
///
/// Returns an error if the backend write fails.
pub async fn save_salt(
    store: &dyn KeyValueStore,
    key: &str,
    salt: &KdfSalt,
) -> StorageResult<()> {
    store.set(key, salt.as_bytes().to_vec()).await
}
