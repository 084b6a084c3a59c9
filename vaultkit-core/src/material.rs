//! Decrypted vault payload and per-account key derivation.
//!
//! `VaultMaterial` is the plaintext inside the vault's encrypted record:
//! the wallet seed plus the non-secret account list and settings. It has no
//! persisted plaintext form: it only ever crosses the storage boundary
//! through `SafeStorage`, and the seed is zeroized when the material is
//! dropped on lock.

use ed25519_dalek::SigningKey;
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{VaultError, VaultResult};
use crate::types::{Account, Settings};

/// Byte length of the wallet seed.
pub const SEED_LEN: usize = 32;

/// HKDF domain separation prefix for account key derivation.
const ACCOUNT_KEY_INFO_PREFIX: &str = "vaultkit:account:";

/// The wallet seed. Zeroized on drop; `Debug` prints `[REDACTED]`.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; SEED_LEN]);

impl Seed {
    /// Generates a fresh random seed.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; SEED_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Builds a seed from raw bytes (wallet import).
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        Self(bytes)
    }

    /// Builds a seed from a byte slice of unknown length.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidSeed`] unless the slice is exactly
    /// [`SEED_LEN`] bytes.
    pub fn try_from_slice(bytes: &[u8]) -> VaultResult<Self> {
        let seed: [u8; SEED_LEN] = bytes.try_into().map_err(|_| VaultError::InvalidSeed {
            expected: SEED_LEN,
            got: bytes.len(),
        })?;
        Ok(Self(seed))
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Seed([REDACTED])")
    }
}

/// Decrypted wallet secrets plus non-secret metadata.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct VaultMaterial {
    seed: Seed,
    #[zeroize(skip)]
    accounts: Vec<Account>,
    #[zeroize(skip)]
    settings: Settings,
}

impl VaultMaterial {
    /// Creates fresh material with a random seed, no accounts, and default
    /// settings.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_seed(Seed::generate())
    }

    /// Creates material around an imported seed.
    #[must_use]
    pub fn from_seed(seed: Seed) -> Self {
        Self {
            seed,
            accounts: Vec::new(),
            settings: Settings::default(),
        }
    }

    /// The derived account list.
    #[must_use]
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// The wallet settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replaces the wallet settings.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Derives the next account from the seed and appends it.
    ///
    /// Indexes are sequential; a default name is assigned when `name` is
    /// `None`.
    pub fn derive_account(&mut self, name: Option<String>) -> Account {
        let hd_index = self.accounts.last().map_or(0, |last| last.hd_index + 1);
        let verifying_key = self.signing_key(hd_index).verifying_key();
        let account = Account {
            name: name.unwrap_or_else(|| format!("Account {}", hd_index + 1)),
            hd_index,
            public_key: hex::encode(verifying_key.to_bytes()),
        };
        self.accounts.push(account.clone());
        account
    }

    /// Returns whether an account with `hd_index` exists.
    #[must_use]
    pub fn has_account(&self, hd_index: u32) -> bool {
        self.accounts.iter().any(|a| a.hd_index == hd_index)
    }

    /// Derives the ed25519 signing key for an HD index.
    ///
    /// HKDF-SHA256 over the seed with a per-index info string; the same
    /// seed and index always reproduce the same key.
    pub(crate) fn signing_key(&self, hd_index: u32) -> SigningKey {
        let hk = Hkdf::<Sha256>::new(None, &self.seed.0);
        let info = format!("{ACCOUNT_KEY_INFO_PREFIX}{hd_index}");
        let mut okm = [0u8; 32];
        hk.expand(info.as_bytes(), &mut okm)
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        SigningKey::from_bytes(&okm)
    }
}

impl std::fmt::Debug for VaultMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultMaterial")
            .field("seed", &self.seed)
            .field("accounts", &self.accounts.len())
            .finish_non_exhaustive()
    }
}
