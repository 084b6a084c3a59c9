//! Non-secret, UI-facing projections of vault state.
//!
//! Everything here is safe to hold regardless of lock state, but it is
//! still cleared on lock, because nothing derived from vault material may
//! survive that transition.

use serde::{Deserialize, Serialize};

/// A derived wallet account. Contains no key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Display name ("Account 1", ...).
    pub name: String,
    /// HD derivation index; the stable account reference.
    pub hd_index: u32,
    /// Hex-encoded ed25519 public key.
    pub public_key: String,
}

/// A network the wallet can operate against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Stable identifier ("mainnet", "testnet").
    pub id: String,
    /// Display name.
    pub name: String,
    /// Base URL of the network's RPC endpoint.
    pub rpc_url: String,
}

/// Non-secret wallet settings, persisted inside the encrypted vault
/// material alongside the accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Id of the network selected in the UI.
    pub default_network: String,
    /// Minutes of inactivity before the UI auto-locks, if enabled.
    pub auto_lock_minutes: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_network: "mainnet".to_string(),
            auto_lock_minutes: None,
        }
    }
}

/// The static network list installed at `init` and preserved across lock.
#[must_use]
pub fn default_networks() -> Vec<Network> {
    vec![
        Network {
            id: "mainnet".to_string(),
            name: "Mainnet".to_string(),
            rpc_url: "https://rpc.mainnet.vaultkit.dev".to_string(),
        },
        Network {
            id: "testnet".to_string(),
            name: "Testnet".to_string(),
            rpc_url: "https://rpc.testnet.vaultkit.dev".to_string(),
        },
    ]
}
