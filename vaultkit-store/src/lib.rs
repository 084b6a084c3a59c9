//! Encrypted key-value storage primitives for the Vaultkit wallet backend.
//!
//! This crate provides the two leaf components of the secure vault
//! subsystem:
//!
//! - [`kdf`] turns a user password into an opaque symmetric
//!   [`DerivedKey`](kdf::DerivedKey) via Argon2id. The raw key bytes never
//!   leave this crate.
//! - [`SafeStorage`] maps logical keys to authenticated-encryption
//!   envelopes in an external asynchronous [`KeyValueStore`]. No value is
//!   ever persisted without encryption, and no decrypted content is
//!   returned without passing the AEAD integrity check.
//!
//! The backing store is consumed, not implemented: in production the
//! extension host provides one backed by `storage.local`, while
//! [`MemoryKeyValueStore`] serves tests and host tooling.

pub mod cipher;
pub mod error;
pub mod kdf;
pub mod kv;
pub mod safe_storage;

pub use cipher::EncryptedRecord;
pub use error::{StorageError, StorageResult};
pub use kdf::{derive_key, DerivedKey, KdfParams, KdfSalt};
pub use kv::{KeyValueStore, MemoryKeyValueStore};
pub use safe_storage::SafeStorage;
