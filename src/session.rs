//! Session context and credential persistence
//!
//! A [`SessionContext`] is the single owner of "who is signed in": the
//! bearer credential and the current user. It is created empty, filled by
//! [`SessionContext::begin`] after a successful login (or after restoring a
//! stored credential) and emptied by [`SessionContext::end`] on logout. The
//! REST client, the transport adapter and the conversation directory all
//! hold a clone of the same context and read from it on every call.
//!
//! Credentials are persisted between runs through a [`CredentialStore`].
//! [`KeyringCredentialStore`] uses the operating system's native credential
//! store; [`MemoryCredentialStore`] keeps the value in process memory.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::{CredentialBackend, CredentialsConfig};
use crate::error::{ChatError, Result};
use crate::models::{User, UserId};

/// An authenticated session: bearer credential plus the signed-in user.
#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user: User,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

/// Shared handle to the current session, if any.
///
/// Cloning is cheap; every clone observes the same session.
///
/// ```
/// use advisor_chat::session::SessionContext;
///
/// # tokio_test::block_on(async {
/// let session = SessionContext::new();
/// assert!(!session.is_active().await);
/// assert!(session.credential().await.is_none());
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionContext {
    /// Create an empty (signed-out) context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that is already signed in.
    pub fn with_session(session: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(session))),
        }
    }

    /// Install `session`, replacing any previous one.
    pub async fn begin(&self, session: Session) {
        tracing::info!(user_id = session.user.user_id, role = %session.user.role, "Session started");
        *self.inner.write().await = Some(session);
    }

    /// Drop the current session.
    pub async fn end(&self) {
        if self.inner.write().await.take().is_some() {
            tracing::info!("Session ended");
        }
    }

    /// Bearer credential of the current session.
    pub async fn credential(&self) -> Option<String> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    /// Signed-in user.
    pub async fn current_user(&self) -> Option<User> {
        self.inner.read().await.as_ref().map(|s| s.user.clone())
    }

    /// Signed-in user, or [`ChatError::MissingCredentials`].
    pub async fn require_user(&self) -> Result<User> {
        self.current_user().await.ok_or_else(|| {
            ChatError::MissingCredentials("not signed in; run `advisor-chat login`".to_string())
                .into()
        })
    }

    /// Identity of the signed-in user, or [`ChatError::MissingCredentials`].
    pub async fn require_user_id(&self) -> Result<UserId> {
        Ok(self.require_user().await?.user_id)
    }

    /// Whether a session is installed.
    pub async fn is_active(&self) -> bool {
        self.inner.read().await.is_some()
    }
}

/// Persistence for the session between process runs.
pub trait CredentialStore: Send + Sync {
    /// Load the stored session, `Ok(None)` when nothing is stored.
    fn load(&self) -> Result<Option<Session>>;

    /// Persist `session`, replacing any stored value.
    fn save(&self, session: &Session) -> Result<()>;

    /// Remove the stored session. Removing a missing entry is not an error.
    fn clear(&self) -> Result<()>;
}

/// Build the credential store selected in configuration.
pub fn credential_store(config: &CredentialsConfig) -> Box<dyn CredentialStore> {
    match config.backend {
        CredentialBackend::Keyring => Box::new(KeyringCredentialStore::new(&config.service)),
        CredentialBackend::Memory => Box::new(MemoryCredentialStore::default()),
    }
}

/// Keyring account name under which the session JSON is stored.
const KEYRING_ACCOUNT: &str = "session";

/// Session persistence via the OS native keyring.
///
/// The session is serialized to JSON and stored as the "password" of a
/// single keyring entry.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    /// Create a store namespaced by keyring `service`.
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, KEYRING_ACCOUNT).map_err(|e| ChatError::Keyring(e).into())
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn load(&self) -> Result<Option<Session>> {
        match self.entry()?.get_password() {
            Ok(json_str) => Ok(Some(serde_json::from_str(&json_str)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(ChatError::Keyring(e).into()),
        }
    }

    fn save(&self, session: &Session) -> Result<()> {
        let json_str = serde_json::to_string(session)?;
        self.entry()?
            .set_password(&json_str)
            .map_err(ChatError::Keyring)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(ChatError::Keyring(e).into()),
        }
    }
}

/// Session persistence in process memory.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Session>>,
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Session>> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, session: &Session) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}
