//! Encrypted key-value persistence facade.
//!
//! `SafeStorage` is the only path through which vault data reaches the
//! backing store. Values are CBOR-serialized, sealed with a caller-supplied
//! [`DerivedKey`], and written as [`EncryptedRecord`] envelopes. Reads
//! reverse the pipeline and fail closed on any integrity violation.
//!
//! Concurrency: multiple calls may be in flight at once; read-after-write
//! ordering across distinct keys is only guaranteed when the caller awaits
//! sequentially. Overlapping writes to the same keys from concurrent callers
//! are a caller responsibility; a single unlocked session is assumed to
//! drive all writes.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::cipher::{self, EncryptedRecord};
use crate::error::{StorageError, StorageResult};
use crate::kdf::DerivedKey;
use crate::kv::KeyValueStore;

/// Encrypted key-value storage over an external asynchronous store.
#[derive(Clone)]
pub struct SafeStorage {
    backend: Arc<dyn KeyValueStore>,
}

impl SafeStorage {
    /// Wraps a backing key-value store.
    #[must_use]
    pub const fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Returns the backing store.
    ///
    /// Reserved for non-secret bookkeeping records (the KDF salt); secret
    /// values must go through the encrypt path.
    #[must_use]
    pub const fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    /// Serializes, encrypts, and persists a batch of entries.
    ///
    /// Each entry is written atomically on its own; there is no cross-entry
    /// atomicity. Every entry is attempted even after earlier failures.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::PartialWrite`] naming the keys whose entries
    /// could not be persisted.
    pub async fn encrypt_and_save_many<T: Serialize + Sync>(
        &self,
        entries: &[(String, T)],
        key: &DerivedKey,
    ) -> StorageResult<()> {
        let mut failed = Vec::new();
        for (storage_key, value) in entries {
            if let Err(err) = self.save_one(storage_key, value, key).await {
                debug!(key = %storage_key, %err, "encrypted save failed");
                failed.push(storage_key.clone());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(StorageError::PartialWrite { failed })
        }
    }

    /// Fetches, decrypts, and deserializes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no record exists for `key`.
    /// - [`StorageError::Decryption`] if the derived key does not match or
    ///   the record was tampered with (fails closed).
    /// - [`StorageError::Serialization`] for malformed envelopes/plaintext.
    pub async fn fetch_and_decrypt_one<T: DeserializeOwned>(
        &self,
        key: &str,
        derived_key: &DerivedKey,
    ) -> StorageResult<T> {
        let bytes = self
            .backend
            .get(key)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })?;
        let record = EncryptedRecord::deserialize(&bytes)?;
        let plaintext = cipher::open(derived_key, key, &record)?;
        ciborium::de::from_reader(plaintext.as_slice())
            .map_err(|err| StorageError::Serialization(err.to_string()))
    }

    /// Checks whether a record exists under `key`, without decryption.
    ///
    /// Never fails: backend errors read as absent.
    pub async fn is_stored(&self, key: &str) -> bool {
        matches!(self.backend.get(key).await, Ok(Some(_)))
    }

    /// Deletes the records stored under `keys`.
    ///
    /// Removing a nonexistent key is a no-op, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only for backend failures.
    pub async fn remove_many(&self, keys: &[String]) -> StorageResult<()> {
        debug!(count = keys.len(), "removing records");
        self.backend.remove(keys).await
    }

    async fn save_one<T: Serialize>(
        &self,
        storage_key: &str,
        value: &T,
        key: &DerivedKey,
    ) -> StorageResult<()> {
        let mut plaintext = Vec::new();
        ciborium::ser::into_writer(value, &mut plaintext)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let record = cipher::seal(key, storage_key, &plaintext)?;
        self.backend.set(storage_key, record.serialize()?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::{derive_key, KdfParams, KdfSalt};
    use crate::kv::MemoryKeyValueStore;
    use async_trait::async_trait;
    use secrecy::SecretString;

    fn test_key(password: &str) -> DerivedKey {
        let salt = KdfSalt::from_bytes(&[3u8; 16]).expect("salt");
        derive_key(
            &SecretString::from(password.to_string()),
            &salt,
            &KdfParams::fast_insecure(),
        )
        .expect("derive")
    }

    fn storage() -> SafeStorage {
        SafeStorage::new(Arc::new(MemoryKeyValueStore::new()))
    }

    #[tokio::test]
    async fn test_round_trip_law() {
        let storage = storage();
        let key = test_key("passKey");

        storage
            .encrypt_and_save_many(&[("test".to_string(), 1u32)], &key)
            .await
            .expect("save");
        assert!(storage.is_stored("test").await);

        let value: u32 = storage
            .fetch_and_decrypt_one("test", &key)
            .await
            .expect("fetch");
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_save_fetch_remove_scenario() {
        let storage = storage();
        let key = test_key("passKey");

        storage
            .encrypt_and_save_many(&[("k".to_string(), 1u32)], &key)
            .await
            .expect("save k");
        assert!(storage.is_stored("k").await);
        let value: u32 = storage.fetch_and_decrypt_one("k", &key).await.expect("fetch k");
        assert_eq!(value, 1);

        storage
            .encrypt_and_save_many(&[("k1".to_string(), 1u32)], &key)
            .await
            .expect("save k1");
        let value: u32 = storage
            .fetch_and_decrypt_one("k1", &key)
            .await
            .expect("fetch k1");
        assert_eq!(value, 1);

        storage
            .remove_many(&["k".to_string()])
            .await
            .expect("remove");
        assert!(!storage.is_stored("k").await);
    }

    #[tokio::test]
    async fn test_no_false_accept_law() {
        let storage = storage();
        storage
            .encrypt_and_save_many(&[("k".to_string(), "value")], &test_key("right"))
            .await
            .expect("save");

        match storage
            .fetch_and_decrypt_one::<String>("k", &test_key("wrong"))
            .await
        {
            Err(StorageError::Decryption(_)) => {}
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn test_fetch_missing_key_is_not_found() {
        let storage = storage();
        match storage
            .fetch_and_decrypt_one::<u32>("absent", &test_key("pw"))
            .await
        {
            Err(StorageError::NotFound { key }) => assert_eq!(key, "absent"),
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn test_remove_absent_key_succeeds() {
        let storage = storage();
        storage
            .remove_many(&["never-written".to_string()])
            .await
            .expect("remove absent");
    }

    #[tokio::test]
    async fn test_nothing_plaintext_reaches_backend() {
        let backend = Arc::new(MemoryKeyValueStore::new());
        let storage = SafeStorage::new(Arc::clone(&backend) as Arc<dyn KeyValueStore>);
        let key = test_key("pw");

        storage
            .encrypt_and_save_many(&[("k".to_string(), "super secret value")], &key)
            .await
            .expect("save");

        let raw = backend.get("k").await.expect("get").expect("present");
        let haystack = String::from_utf8_lossy(&raw);
        assert!(!haystack.contains("super secret value"));
        // And the raw bytes parse as an encrypted envelope, not plaintext.
        EncryptedRecord::deserialize(&raw).expect("envelope");
    }

    /// Backend that rejects writes to a chosen key.
    struct RejectingStore {
        inner: MemoryKeyValueStore,
        reject: String,
    }

    #[async_trait]
    impl KeyValueStore for RejectingStore {
        async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
            if key == self.reject {
                return Err(StorageError::Backend("write rejected".to_string()));
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, keys: &[String]) -> StorageResult<()> {
            self.inner.remove(keys).await
        }
    }

    #[tokio::test]
    async fn test_partial_write_reports_failed_keys() {
        let backend = RejectingStore {
            inner: MemoryKeyValueStore::new(),
            reject: "bad".to_string(),
        };
        let storage = SafeStorage::new(Arc::new(backend));
        let key = test_key("pw");

        let entries = vec![
            ("good".to_string(), 1u32),
            ("bad".to_string(), 2u32),
            ("also-good".to_string(), 3u32),
        ];
        match storage.encrypt_and_save_many(&entries, &key).await {
            Err(StorageError::PartialWrite { failed }) => {
                assert_eq!(failed, vec!["bad".to_string()]);
            }
            Err(err) => panic!("unexpected error: {err}"),
            Ok(()) => panic!("expected error"),
        }

        // Entries before and after the failure still landed.
        assert!(storage.is_stored("good").await);
        assert!(storage.is_stored("also-good").await);
        assert!(!storage.is_stored("bad").await);
    }
}
