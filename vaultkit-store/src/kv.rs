//! Asynchronous key-value store abstraction.
//!
//! The vault subsystem does not implement persistence itself. It consumes a
//! platform-provided store; in a browser extension this is `storage.local`
//! bridged by the host. All values written through [`SafeStorage`] are
//! encrypted envelopes; the store itself never sees plaintext secrets.
//!
//! [`SafeStorage`]: crate::safe_storage::SafeStorage

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};

/// Platform-provided asynchronous key-value persistence.
///
/// Keys are plain strings. Values are opaque byte blobs; callers decide the
/// encoding. Implementations must make each `set` atomic per key (a write
/// either lands completely or not at all), but no ordering is guaranteed
/// across distinct keys unless the caller awaits sequentially.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// Returns `Ok(None)` if no value exists for the key.
    ///
    /// # Errors
    ///
    /// Returns an error only for backend failures (I/O, quota, bridge).
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Writes `value` under `key`, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Deletes the values stored under `keys`.
    ///
    /// Removing a key that does not exist is a no-op, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only for backend failures.
    async fn remove(&self, keys: &[String]) -> StorageResult<()>;
}

/// In-memory [`KeyValueStore`] for tests and host tooling.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyValueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| StorageError::Backend("mutex poisoned".to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Backend("mutex poisoned".to_string()))?
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> StorageResult<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| StorageError::Backend("mutex poisoned".to_string()))?;
        for key in keys {
            guard.remove(key);
        }
        Ok(())
    }
}
