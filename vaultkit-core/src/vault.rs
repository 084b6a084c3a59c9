//! The vault: live holder of decrypted wallet secrets.
//!
//! A `Vault` exists only while the session is unlocked. It owns the
//! decrypted [`VaultMaterial`] and the [`DerivedKey`] for the session, so
//! updates re-encrypt the full material under the same key. Dropping the
//! vault (on lock) zeroizes both.
//!
//! Persistence layout in the backing store:
//!
//! - `vault`: the encrypted material envelope, written only through
//!   [`SafeStorage`].
//! - `vault_salt`: the plaintext KDF salt, written once at creation.

use std::sync::{Arc, PoisonError, RwLock};

use ed25519_dalek::{Signature, Signer};
use secrecy::SecretString;
use tracing::debug;
use vaultkit_store::{
    kdf::{self, KdfParams, KdfSalt},
    DerivedKey, KeyValueStore, SafeStorage, StorageError,
};

use crate::error::{VaultError, VaultResult};
use crate::material::VaultMaterial;
use crate::types::{Account, Settings};

/// Storage key of the encrypted vault material.
pub const VAULT_RECORD_KEY: &str = "vault";

/// Storage key of the plaintext KDF salt.
pub const SALT_RECORD_KEY: &str = "vault_salt";

/// Live wallet vault for an unlocked session.
pub struct Vault {
    storage: SafeStorage,
    key: DerivedKey,
    // Interior mutability so an `Arc<Vault>` handed out by the session
    // store can service updates; writes are whole-value replacements.
    material: RwLock<VaultMaterial>,
}

impl Vault {
    /// Returns whether vault material exists in the backing store.
    pub async fn exists(backend: &Arc<dyn KeyValueStore>) -> bool {
        SafeStorage::new(Arc::clone(backend))
            .is_stored(VAULT_RECORD_KEY)
            .await
    }

    /// Creates and persists a fresh vault. First-run wallet creation.
    ///
    /// Generates and stores the per-vault salt, derives the key, encrypts
    /// the material, and derives account 0 if the material has none.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::AlreadyExists`] if a vault is already
    /// persisted: overwriting the salt would orphan the existing material.
    /// Otherwise errors for an empty password, a key-derivation failure, or
    /// a storage failure. No partial vault is observable on failure.
    pub async fn create(
        backend: Arc<dyn KeyValueStore>,
        password: &SecretString,
        mut material: VaultMaterial,
        params: &KdfParams,
    ) -> VaultResult<Self> {
        if Self::exists(&backend).await {
            return Err(VaultError::AlreadyExists);
        }
        let storage = SafeStorage::new(backend);
        let salt = KdfSalt::generate();
        let key = kdf::derive_key(password, &salt, params)?;
        kdf::save_salt(storage.backend().as_ref(), SALT_RECORD_KEY, &salt).await?;

        if material.accounts().is_empty() {
            material.derive_account(None);
        }

        persist(&storage, &key, &material).await?;
        debug!(accounts = material.accounts().len(), "vault created");

        Ok(Self {
            storage,
            key,
            material: RwLock::new(material),
        })
    }

    /// Opens the persisted vault with a password.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no vault (or salt) was ever created.
    /// - [`StorageError::Decryption`] if the password is wrong or the
    ///   stored material was tampered with.
    ///
    /// Both are terminal for this call; the caller re-prompts for a
    /// password. No partially-constructed vault escapes.
    pub async fn open(
        backend: Arc<dyn KeyValueStore>,
        password: &SecretString,
        params: &KdfParams,
    ) -> VaultResult<Self> {
        let storage = SafeStorage::new(backend);
        let salt = kdf::load_salt(storage.backend().as_ref(), SALT_RECORD_KEY)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                key: SALT_RECORD_KEY.to_string(),
            })?;
        let key = kdf::derive_key(password, &salt, params)?;

        let material: VaultMaterial = storage
            .fetch_and_decrypt_one(VAULT_RECORD_KEY, &key)
            .await?;
        debug!(accounts = material.accounts().len(), "vault opened");

        Ok(Self {
            storage,
            key,
            material: RwLock::new(material),
        })
    }

    /// The derived account list. Pure projection, no side effects.
    #[must_use]
    pub fn accounts(&self) -> Vec<Account> {
        self.read_material().accounts().to_vec()
    }

    /// The wallet settings. Pure projection, no side effects.
    #[must_use]
    pub fn settings(&self) -> Settings {
        self.read_material().settings().clone()
    }

    /// Derives the next account and persists the updated material.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails; the in-memory material is
    /// only committed after the write succeeds.
    pub async fn create_account(&self, name: Option<String>) -> VaultResult<Account> {
        let (updated, account) = {
            let mut updated = self.read_material().clone();
            let account = updated.derive_account(name);
            (updated, account)
        };
        persist(&self.storage, &self.key, &updated).await?;
        self.commit(updated);
        Ok(account)
    }

    /// Replaces the settings and persists the updated material.
    ///
    /// The full material is re-encrypted; there is no partial-field
    /// encryption.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails; the in-memory material is
    /// only committed after the write succeeds.
    pub async fn update_settings(&self, settings: Settings) -> VaultResult<()> {
        let updated = {
            let mut updated = self.read_material().clone();
            updated.set_settings(settings);
            updated
        };
        persist(&self.storage, &self.key, &updated).await?;
        self.commit(updated);
        Ok(())
    }

    /// Signs `payload` with the account's in-memory key.
    ///
    /// Never writes secrets back to storage as a side effect.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::AccountNotFound`] for an unknown HD index.
    pub fn sign(&self, hd_index: u32, payload: &[u8]) -> VaultResult<Signature> {
        let material = self.read_material();
        if !material.has_account(hd_index) {
            return Err(VaultError::AccountNotFound { index: hd_index });
        }
        Ok(material.signing_key(hd_index).sign(payload))
    }

    // All mutations replace the material wholesale, so a poisoned lock can
    // never expose a torn value; recover instead of propagating.
    fn read_material(&self) -> std::sync::RwLockReadGuard<'_, VaultMaterial> {
        self.material
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn commit(&self, updated: VaultMaterial) {
        *self
            .material
            .write()
            .unwrap_or_else(PoisonError::into_inner) = updated;
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("accounts", &self.accounts().len())
            .finish_non_exhaustive()
    }
}

/// Re-encrypts and writes the full material envelope.
async fn persist(
    storage: &SafeStorage,
    key: &DerivedKey,
    material: &VaultMaterial,
) -> VaultResult<()> {
    storage
        .encrypt_and_save_many(&[(VAULT_RECORD_KEY.to_string(), material)], key)
        .await?;
    Ok(())
}
