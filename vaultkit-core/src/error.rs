//! Error types for the vault and session layer.

use thiserror::Error;
use vaultkit_store::StorageError;

/// Result type for vault and session operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors raised by the vault and the session store.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The session store has not been initialized yet.
    ///
    /// A programming-contract violation: `init()` must run at startup
    /// before anything else touches the session.
    #[error("session not initialized")]
    NotInitialized,

    /// A vault already exists in the backing store.
    ///
    /// Creation is strictly a first-run path. Overwriting would replace the
    /// persisted salt and orphan the existing encrypted material.
    #[error("a vault already exists")]
    AlreadyExists,

    /// The operation requires an unlocked session.
    ///
    /// A programming-contract violation, not a user error: a caller invoked
    /// a mutation or guarded read while the wallet was locked or absent.
    #[error("session not ready")]
    NotReady,

    /// No account exists with the given HD index.
    #[error("no account with index {index}")]
    AccountNotFound {
        /// The HD derivation index that was requested.
        index: u32,
    },

    /// Imported seed bytes have the wrong length.
    #[error("invalid seed: expected {expected} bytes, got {got}")]
    InvalidSeed {
        /// Required seed length in bytes.
        expected: usize,
        /// Length of the rejected input.
        got: usize,
    },

    /// Errors from the safe storage layer.
    ///
    /// `NotFound` and `Decryption` surfaced from an unlock attempt are
    /// recoverable ("wrong password or no wallet") and leave the session
    /// state unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
