//! The credential store: durable key-value storage plus a live view.
//!
//! ```text
//!   login / refresh / logout flow          (writes)
//!              │
//!              ▼
//!      CredentialStore ──► KeyValueStore   (auth_token, user)
//!              │
//!              ▼ watch
//!      CredentialWatch ×N                  (read-only, presence clients etc.)
//! ```
//!
//! Only the login flow writes. Everything else holds a [`CredentialWatch`],
//! reads the current credentials and reacts to changes, but can never
//! mutate the store.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::{decode, is_valid, Claims, StoreError, UserProfile};

/// Storage key holding the raw token string.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Storage key holding the JSON-serialized [`UserProfile`].
pub const USER_KEY: &str = "user";

// ---------------------------------------------------------------------------
// KeyValueStore
// ---------------------------------------------------------------------------

/// Durable string key-value storage.
///
/// Implementations are synchronous: values are small and writes are rare
/// (login, refresh, logout).
pub trait KeyValueStore: Send + Sync + 'static {
    /// Reads a value. `Ok(None)` means the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Deletes a key. Deleting an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local storage. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a value without going through the fallible trait method.
    pub fn insert(&self, key: &str, value: &str) {
        self.lock().insert(key.to_string(), value.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Storage in a single JSON document on disk.
///
/// Every write replaces the file through a temporary sibling and a rename,
/// so a crash mid-write leaves the previous document intact. A missing
/// file reads as empty.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        apply(&mut entries);
        self.write_all(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// A snapshot of what the store currently holds.
#[derive(Clone, Default, PartialEq)]
pub struct Credentials {
    pub token: Option<String>,
    pub profile: Option<UserProfile>,
}

impl Credentials {
    /// `true` if a token is present and valid at `now`.
    pub fn is_valid_at(&self, now: i64) -> bool {
        self.token.as_deref().is_some_and(|t| is_valid(t, now))
    }

    /// Decoded claims of the current token, if it decodes.
    pub fn claims(&self) -> Option<Claims> {
        decode(self.token.as_deref()?).ok()
    }

    /// Who these credentials belong to.
    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            subject: self.claims().and_then(|c| c.subject),
            user_id: self.profile.as_ref().and_then(|p| p.id.clone()),
        }
    }
}

/// The user a session belongs to: the token's subject and the profile id.
///
/// Two sessions with the same identity are the same user, e.g. before and
/// after a token refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    pub subject: Option<String>,
    pub user_id: Option<String>,
}

/// Redacts the token: only its length is printed.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token_len", &self.token.as_ref().map(String::len))
            .field("profile", &self.profile)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

/// Process-wide holder of the current token and profile.
pub struct CredentialStore {
    backend: Arc<dyn KeyValueStore>,
    current: watch::Sender<Credentials>,
}

impl CredentialStore {
    /// Opens a store over `backend`, reading the persisted credentials.
    pub fn load(backend: impl KeyValueStore) -> Self {
        Self::with_backend(Arc::new(backend))
    }

    /// Like [`load`](Self::load) for an already shared backend.
    ///
    /// Unreadable storage starts the store empty (signed out); it never
    /// fails construction.
    pub fn with_backend(backend: Arc<dyn KeyValueStore>) -> Self {
        let credentials = read_credentials(backend.as_ref()).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "credential storage unreadable, starting signed out");
            Credentials::default()
        });
        tracing::debug!(
            has_token = credentials.token.is_some(),
            has_profile = credentials.profile.is_some(),
            "credential store loaded"
        );
        let (current, _) = watch::channel(credentials);
        Self { backend, current }
    }

    /// The current credentials.
    pub fn credentials(&self) -> Credentials {
        self.current.borrow().clone()
    }

    /// The in-memory profile, if signed in.
    pub fn profile(&self) -> Option<UserProfile> {
        self.current.borrow().profile.clone()
    }

    /// A read-only, change-notifying view for consumers.
    pub fn watch(&self) -> CredentialWatch {
        CredentialWatch {
            rx: self.current.subscribe(),
        }
    }

    /// The backing storage, for diagnostics.
    pub fn backend(&self) -> &dyn KeyValueStore {
        self.backend.as_ref()
    }

    /// Persists a fresh sign-in and publishes it.
    ///
    /// Nothing is published unless both keys were written. If the profile
    /// can't be stored the previous token is put back.
    pub fn login(&self, token: &str, profile: &UserProfile) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(profile)?;
        let previous = self.backend.get(AUTH_TOKEN_KEY)?;
        self.backend.set(AUTH_TOKEN_KEY, token)?;
        if let Err(e) = self.backend.set(USER_KEY, &serialized) {
            let restored = match &previous {
                Some(old) => self.backend.set(AUTH_TOKEN_KEY, old),
                None => self.backend.remove(AUTH_TOKEN_KEY),
            };
            if let Err(undo) = restored {
                tracing::warn!(error = %undo, "could not restore previous token after failed sign-in");
            }
            return Err(e);
        }
        self.publish(Credentials {
            token: Some(token.to_string()),
            profile: Some(profile.clone()),
        });
        tracing::info!(user = ?profile.id, "signed in");
        Ok(())
    }

    /// Replaces the token, keeping the profile.
    pub fn refresh_token(&self, token: &str) -> Result<(), StoreError> {
        self.backend.set(AUTH_TOKEN_KEY, token)?;
        self.current.send_modify(|c| c.token = Some(token.to_string()));
        tracing::debug!(token_len = token.len(), "token refreshed");
        Ok(())
    }

    /// Clears persisted credentials and publishes the signed-out state.
    ///
    /// The in-memory state is cleared even if storage fails, so consumers
    /// stop using the old token either way.
    pub fn logout(&self) -> Result<(), StoreError> {
        self.publish(Credentials::default());
        tracing::info!("signed out");
        self.backend.remove(AUTH_TOKEN_KEY)?;
        self.backend.remove(USER_KEY)
    }

    /// Re-reads storage (e.g. after another process wrote it) and
    /// publishes the result.
    pub fn reload(&self) -> Result<(), StoreError> {
        let credentials = read_credentials(self.backend.as_ref())?;
        self.publish(credentials);
        Ok(())
    }

    /// The profile last written to durable storage.
    ///
    /// # Errors
    /// [`StoreError::Unavailable`] if storage can't be read,
    /// [`StoreError::Corrupt`] if the stored profile isn't valid JSON.
    pub fn stored_profile(&self) -> Result<Option<UserProfile>, StoreError> {
        match self.backend.get(USER_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn publish(&self, credentials: Credentials) {
        self.current.send_replace(credentials);
    }
}

fn read_credentials(backend: &dyn KeyValueStore) -> Result<Credentials, StoreError> {
    let token = backend.get(AUTH_TOKEN_KEY)?.filter(|t| !t.is_empty());
    let profile = match backend.get(USER_KEY)? {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| tracing::warn!(error = %e, "stored profile is not valid JSON, ignoring"))
            .ok(),
        None => None,
    };
    Ok(Credentials { token, profile })
}

// ---------------------------------------------------------------------------
// CredentialWatch
// ---------------------------------------------------------------------------

/// Read-only view of the credential store.
///
/// Cheap to clone. Each clone tracks change notifications independently.
#[derive(Clone)]
pub struct CredentialWatch {
    rx: watch::Receiver<Credentials>,
}

impl CredentialWatch {
    /// A view over credentials that never change. Useful for service
    /// tokens and tests.
    pub fn fixed(credentials: Credentials) -> Self {
        let (_tx, rx) = watch::channel(credentials);
        Self { rx }
    }

    /// The current credentials.
    pub fn current(&self) -> Credentials {
        self.rx.borrow().clone()
    }

    /// The current token, if any.
    pub fn token(&self) -> Option<String> {
        self.rx.borrow().token.clone()
    }

    /// `true` if a token is present and valid at `now`.
    pub fn is_valid_at(&self, now: i64) -> bool {
        self.rx.borrow().is_valid_at(now)
    }

    /// Waits for the next change.
    ///
    /// Returns `false` once the store is gone and no further change can
    /// happen.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl fmt::Debug for CredentialWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CredentialWatch").field(&*self.rx.borrow()).finish()
    }
}
