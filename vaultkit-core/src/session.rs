//! Session state machine: `Idle` → `Locked` ⇄ `Ready`.
//!
//! The session store is process-wide shared state with a single-writer
//! protocol: every transition swaps in a complete, freshly-built state
//! value. Nothing is ever merged field-by-field on the way *out* of
//! `Ready`; the lock transition in particular builds its replacement from
//! scratch so no secret-derived field can survive it.
//!
//! Consumers read through [`SessionStore::snapshot`] or subscribe via
//! [`SessionStore::subscribe`]; they never touch vault fields directly.

use std::sync::{Arc, PoisonError, RwLock};

use secrecy::SecretString;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};
use vaultkit_store::{KdfParams, KeyValueStore};

use crate::error::{VaultError, VaultResult};
use crate::material::VaultMaterial;
use crate::types::{default_networks, Account, Network, Settings};
use crate::vault::Vault;

/// Lifecycle status of the wallet session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Status {
    /// No vault has ever been created.
    Idle,
    /// Vault material exists on disk but is not decrypted.
    Locked,
    /// The vault is decrypted and live.
    Ready,
}

/// Immutable, non-secret view of the session published to consumers.
///
/// The projection deliberately omits the vault reference; UI layers and the
/// dApp bridge only ever see this shape.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionSnapshot {
    /// Whether `init()` has run.
    pub inited: bool,
    /// Current lifecycle status.
    pub status: Status,
    /// Accounts of the unlocked wallet; empty otherwise.
    pub accounts: Vec<Account>,
    /// The static network list.
    pub networks: Vec<Network>,
    /// Settings of the unlocked wallet; `None` otherwise.
    pub settings: Option<Settings>,
}

/// Full internal state. Only ever replaced wholesale.
struct StoreState {
    inited: bool,
    status: Status,
    vault: Option<Arc<Vault>>,
    accounts: Vec<Account>,
    networks: Vec<Network>,
    settings: Option<Settings>,
}

impl StoreState {
    const fn empty() -> Self {
        Self {
            inited: false,
            status: Status::Idle,
            vault: None,
            accounts: Vec::new(),
            networks: Vec::new(),
            settings: None,
        }
    }

    /// State after `init()`: status reflects whether vault material exists.
    fn inited(vault_exists: bool) -> Self {
        Self {
            inited: true,
            status: if vault_exists {
                Status::Locked
            } else {
                Status::Idle
            },
            vault: None,
            accounts: Vec::new(),
            networks: default_networks(),
            settings: None,
        }
    }

    /// State after `lock()`: built from scratch, never from the previous
    /// value. Only the static network list is carried over.
    fn locked(networks: Vec<Network>) -> Self {
        Self {
            inited: true,
            status: Status::Locked,
            vault: None,
            accounts: Vec::new(),
            networks,
            settings: None,
        }
    }

    /// State after a successful `unlock()`/`create()`.
    fn ready(vault: Vault, networks: Vec<Network>) -> Self {
        let accounts = vault.accounts();
        let settings = vault.settings();
        Self {
            inited: true,
            status: Status::Ready,
            vault: Some(Arc::new(vault)),
            accounts,
            networks,
            settings: Some(settings),
        }
    }

    fn to_front(&self) -> SessionSnapshot {
        SessionSnapshot {
            inited: self.inited,
            status: self.status,
            accounts: self.accounts.clone(),
            networks: self.networks.clone(),
            settings: self.settings.clone(),
        }
    }
}

/// Process-wide session store.
///
/// All transitions are serialized by an operation guard so a lock and a
/// concurrent unlock can never interleave into an inconsistent state.
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
    kdf_params: KdfParams,
    state: RwLock<StoreState>,
    op_guard: Mutex<()>,
    tx: watch::Sender<SessionSnapshot>,
}

impl SessionStore {
    /// Creates a session store over a backing key-value store, with
    /// production-strength KDF parameters.
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self::with_kdf_params(backend, KdfParams::default())
    }

    /// Creates a session store with explicit KDF parameters.
    #[must_use]
    pub fn with_kdf_params(backend: Arc<dyn KeyValueStore>, kdf_params: KdfParams) -> Self {
        let state = StoreState::empty();
        let (tx, _rx) = watch::channel(state.to_front());
        Self {
            backend,
            kdf_params,
            state: RwLock::new(state),
            op_guard: Mutex::new(()),
            tx,
        }
    }

    /// Initializes the session from persisted state.
    ///
    /// Transitions to `Locked` if vault material exists, `Idle` otherwise,
    /// and installs the static network list.
    ///
    /// # Errors
    ///
    /// Currently infallible in practice (the existence probe never errors);
    /// kept fallible for parity with the other transitions.
    pub async fn init(&self) -> VaultResult<Status> {
        let _op = self.op_guard.lock().await;
        let exists = Vault::exists(&self.backend).await;
        let next = StoreState::inited(exists);
        let status = next.status;
        self.replace(next);
        info!(?status, "session initialized");
        Ok(status)
    }

    /// Creates a fresh wallet and transitions straight to `Ready`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::AlreadyExists`] if a wallet was already
    /// created, and otherwise errors for an empty password or a storage
    /// failure; the session state is unchanged on failure.
    pub async fn create(
        &self,
        password: &SecretString,
        material: VaultMaterial,
    ) -> VaultResult<()> {
        let _op = self.op_guard.lock().await;
        let vault = Vault::create(
            Arc::clone(&self.backend),
            password,
            material,
            &self.kdf_params,
        )
        .await?;
        self.replace(StoreState::ready(vault, self.current_networks()));
        info!("wallet created, session ready");
        Ok(())
    }

    /// Unlocks the wallet with a password.
    ///
    /// On failure (wrong password or no wallet) the previous state is
    /// left byte-for-byte unchanged and no snapshot is published.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotInitialized`] if `init()` has not run.
    /// - `Storage(NotFound | Decryption)` for "wrong password or no
    ///   wallet"; the caller may retry.
    pub async fn unlock(&self, password: &SecretString) -> VaultResult<()> {
        let _op = self.op_guard.lock().await;
        if !self.read_state().inited {
            return Err(VaultError::NotInitialized);
        }
        let vault = Vault::open(Arc::clone(&self.backend), password, &self.kdf_params).await?;
        self.replace(StoreState::ready(vault, self.current_networks()));
        info!("session unlocked");
        Ok(())
    }

    /// Locks the session, dropping the vault and all derived state.
    ///
    /// Unconditional: the entire state is replaced with a fresh reset value
    /// regardless of what preceded it. Only `inited` and the static network
    /// list survive.
    pub async fn lock(&self) {
        let _op = self.op_guard.lock().await;
        self.replace(StoreState::locked(self.current_networks()));
        info!("session locked");
    }

    /// Replaces the account projection. Permitted only while `Ready`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotReady`] when called outside an unlocked
    /// session, a contract violation that must fail loudly, not no-op.
    pub fn update_accounts(&self, accounts: Vec<Account>) -> VaultResult<()> {
        self.update_ready(|state| state.accounts = accounts)
    }

    /// Replaces the settings projection. Permitted only while `Ready`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotReady`] when called outside an unlocked
    /// session.
    pub fn update_settings(&self, settings: Settings) -> VaultResult<()> {
        self.update_ready(|state| state.settings = Some(settings))
    }

    /// Runs `f` against the live vault of an unlocked session.
    ///
    /// The guard ensures `f` never observes an inconsistent cross-section
    /// of state.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotInitialized`] before `init()`,
    /// [`VaultError::NotReady`] while not unlocked.
    pub fn with_unlocked<T>(&self, f: impl FnOnce(&Arc<Vault>) -> T) -> VaultResult<T> {
        let state = self.read_state();
        if !state.inited {
            return Err(VaultError::NotInitialized);
        }
        match (&state.status, &state.vault) {
            (Status::Ready, Some(vault)) => Ok(f(vault)),
            _ => Err(VaultError::NotReady),
        }
    }

    /// Runs `f` against the current snapshot of an initialized session.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotInitialized`] before `init()`.
    pub fn with_inited<T>(&self, f: impl FnOnce(&SessionSnapshot) -> T) -> VaultResult<T> {
        let state = self.read_state();
        if !state.inited {
            return Err(VaultError::NotInitialized);
        }
        Ok(f(&state.to_front()))
    }

    /// The current published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    /// Subscribes to state-change notifications.
    ///
    /// Every transition publishes a new immutable snapshot; subscribers
    /// hold no mutation access.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// The current static network list, falling back to the defaults if
    /// `init()` has not installed one yet.
    fn current_networks(&self) -> Vec<Network> {
        let networks = self.read_state().networks.clone();
        if networks.is_empty() {
            default_networks()
        } else {
            networks
        }
    }

    /// Swaps in a complete new state and publishes its snapshot.
    fn replace(&self, next: StoreState) {
        debug_assert_eq!(
            next.status == Status::Ready,
            next.vault.is_some(),
            "status must say Ready exactly when a vault is attached"
        );
        let snapshot = next.to_front();
        *self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = next;
        // send_replace, not send: the channel value must advance even when
        // no receiver is alive, or snapshot() would serve stale state.
        self.tx.send_replace(snapshot);
        debug!("session snapshot published");
    }

    /// Merge-style projection update, allowed only while `Ready`. Mutates
    /// in place under the write guard; the whole-state-swap rule applies to
    /// transitions out of `Ready`, not to these refreshes.
    fn update_ready(&self, apply: impl FnOnce(&mut StoreState)) -> VaultResult<()> {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !state.inited {
            return Err(VaultError::NotInitialized);
        }
        if state.status != Status::Ready {
            return Err(VaultError::NotReady);
        }
        apply(&mut state);
        let snapshot = state.to_front();
        drop(state);
        self.tx.send_replace(snapshot);
        Ok(())
    }

    // State is only ever replaced wholesale, so a poisoned lock cannot
    // expose a torn value; recover instead of propagating.
    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read_state();
        f.debug_struct("SessionStore")
            .field("inited", &state.inited)
            .field("status", &state.status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultkit_store::MemoryKeyValueStore;

    fn store() -> SessionStore {
        SessionStore::with_kdf_params(
            Arc::new(MemoryKeyValueStore::new()),
            KdfParams::fast_insecure(),
        )
    }

    fn password(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[tokio::test]
    async fn test_init_without_vault_is_idle() {
        let store = store();
        let status = store.init().await.expect("init");
        assert_eq!(status, Status::Idle);

        let snapshot = store.snapshot();
        assert!(snapshot.inited);
        assert_eq!(snapshot.status, Status::Idle);
        assert!(!snapshot.networks.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_advances_without_any_subscriber() {
        // No subscribe() call anywhere; every transition must still be
        // visible through snapshot().
        let store = store();
        assert!(!store.snapshot().inited);

        store.init().await.expect("init");
        let snapshot = store.snapshot();
        assert!(snapshot.inited);
        assert_eq!(snapshot.status, Status::Idle);

        store
            .create(&password("pw"), VaultMaterial::generate())
            .await
            .expect("create");
        assert_eq!(store.snapshot().status, Status::Ready);

        store
            .update_settings(Settings::default())
            .expect("update settings");
        assert!(store.snapshot().settings.is_some());

        store.lock().await;
        assert_eq!(store.snapshot().status, Status::Locked);
    }

    #[tokio::test]
    async fn test_init_with_existing_vault_is_locked() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let first = SessionStore::with_kdf_params(
            Arc::clone(&backend),
            KdfParams::fast_insecure(),
        );
        first.init().await.expect("init");
        first
            .create(&password("pw"), VaultMaterial::generate())
            .await
            .expect("create");

        // Fresh process over the same backing store.
        let second =
            SessionStore::with_kdf_params(backend, KdfParams::fast_insecure());
        let status = second.init().await.expect("init");
        assert_eq!(status, Status::Locked);
    }

    #[tokio::test]
    async fn test_lock_is_a_total_reset() {
        let store = store();
        store.init().await.expect("init");
        store
            .create(&password("pw"), VaultMaterial::generate())
            .await
            .expect("create");
        store
            .update_settings(Settings::default())
            .expect("update settings");
        assert_eq!(store.snapshot().status, Status::Ready);

        store.lock().await;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.status, Status::Locked);
        assert!(snapshot.inited);
        assert!(snapshot.accounts.is_empty());
        assert!(snapshot.settings.is_none());
        assert_eq!(snapshot.networks, default_networks());
        assert!(store.with_unlocked(|_| ()).is_err());
    }

    #[tokio::test]
    async fn test_failed_unlock_leaves_state_unchanged() {
        let store = store();
        store.init().await.expect("init");
        store
            .create(&password("pw"), VaultMaterial::generate())
            .await
            .expect("create");
        store.lock().await;

        let before = store.snapshot();
        let result = store.unlock(&password("wrong")).await;
        assert!(result.is_err());
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_unlock_restores_accounts() {
        let store = store();
        store.init().await.expect("init");
        store
            .create(&password("pw"), VaultMaterial::generate())
            .await
            .expect("create");
        let created = store.snapshot().accounts;
        assert_eq!(created.len(), 1);

        store.lock().await;
        store.unlock(&password("pw")).await.expect("unlock");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.status, Status::Ready);
        assert_eq!(snapshot.accounts, created);
    }

    #[tokio::test]
    async fn test_unlock_requires_init() {
        let store = store();
        match store.unlock(&password("pw")).await {
            Err(VaultError::NotInitialized) => {}
            Err(err) => panic!("unexpected error: {err}"),
            Ok(()) => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn test_updates_fail_loudly_while_locked() {
        let store = store();
        store.init().await.expect("init");
        store
            .create(&password("pw"), VaultMaterial::generate())
            .await
            .expect("create");
        store.lock().await;

        match store.update_accounts(Vec::new()) {
            Err(VaultError::NotReady) => {}
            Err(err) => panic!("unexpected error: {err}"),
            Ok(()) => panic!("expected error"),
        }
        match store.update_settings(Settings::default()) {
            Err(VaultError::NotReady) => {}
            Err(err) => panic!("unexpected error: {err}"),
            Ok(()) => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn test_with_guards() {
        let store = store();
        assert!(matches!(
            store.with_inited(|_| ()),
            Err(VaultError::NotInitialized)
        ));

        store.init().await.expect("init");
        store.with_inited(|_| ()).expect("inited");
        assert!(matches!(
            store.with_unlocked(|_| ()),
            Err(VaultError::NotReady)
        ));

        store
            .create(&password("pw"), VaultMaterial::generate())
            .await
            .expect("create");
        let account_count = store
            .with_unlocked(|vault| vault.accounts().len())
            .expect("unlocked");
        assert_eq!(account_count, 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions_without_secrets() {
        let store = store();
        let mut rx = store.subscribe();

        store.init().await.expect("init");
        rx.changed().await.expect("changed");
        assert_eq!(rx.borrow_and_update().status, Status::Idle);

        store
            .create(&password("pw"), VaultMaterial::generate())
            .await
            .expect("create");
        rx.changed().await.expect("changed");
        assert_eq!(rx.borrow_and_update().status, Status::Ready);

        store.lock().await;
        rx.changed().await.expect("changed");
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.status, Status::Locked);
        assert!(snapshot.accounts.is_empty());
    }

    #[tokio::test]
    async fn test_update_accounts_publishes_projection() {
        let store = store();
        store.init().await.expect("init");
        store
            .create(&password("pw"), VaultMaterial::generate())
            .await
            .expect("create");

        let renamed = {
            let mut accounts = store.snapshot().accounts;
            accounts[0].name = "Renamed".to_string();
            accounts
        };
        store.update_accounts(renamed.clone()).expect("update");
        assert_eq!(store.snapshot().accounts, renamed);
    }
}
