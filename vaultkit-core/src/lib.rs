//! Wallet vault and session lifecycle.
//!
//! This crate owns the secret-bearing side of the wallet: the encrypted
//! [`Vault`] holding the root seed, HD account derivation and signing, and
//! the [`SessionStore`] state machine that gates access to the vault behind
//! `Idle` → `Locked` ⇄ `Ready` transitions.
//!
//! Persistence and cryptography at rest live in `vaultkit-store`; this
//! crate composes them into wallet semantics.

pub mod error;
pub mod material;
pub mod session;
pub mod types;
pub mod vault;

pub use error::{VaultError, VaultResult};
pub use material::{Seed, VaultMaterial};
pub use session::{SessionSnapshot, SessionStore, Status};
pub use types::{default_networks, Account, Network, Settings};
pub use vault::Vault;
