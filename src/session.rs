//! Session lifecycle for Palaver
//!
//! [`SessionManager`] wraps the backend's credential operations and keeps
//! the current [`Session`] in memory: nothing is persisted locally, and
//! the absence of a session is the stable unauthenticated state. Errors
//! from the credential calls are returned to the caller as structured
//! results, never logged-and-swallowed.

use std::sync::{Arc, RwLock};

use crate::backend::Backend;
use crate::error::Result;
use crate::models::Session;

/// Credential lifecycle and in-memory session cache
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use palaver::backend::FakeBackend;
/// use palaver::session::SessionManager;
///
/// # #[tokio::main]
/// # async fn main() -> palaver::error::Result<()> {
/// let sessions = SessionManager::new(Arc::new(FakeBackend::new()));
/// assert!(!sessions.is_signed_in());
///
/// let session = sessions.sign_up("alice@example.com", "pw", Some("Alice")).await?;
/// assert_eq!(sessions.user_id().as_deref(), Some(session.user_id.as_str()));
///
/// sessions.sign_out().await?;
/// assert!(!sessions.is_signed_in());
/// # Ok(())
/// # }
/// ```
pub struct SessionManager {
    backend: Arc<dyn Backend>,
    current: RwLock<Option<Session>>,
}

impl SessionManager {
    /// Create a manager with no session cached.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            current: RwLock::new(None),
        }
    }

    /// Query the backend for an existing session and cache the result
    ///
    /// Called once at startup; a returning user with a live backend
    /// session lands signed in without re-entering credentials.
    ///
    /// # Errors
    ///
    /// Propagates backend failures. "No session" is `Ok(None)`, not an
    /// error.
    pub async fn restore(&self) -> Result<Option<Session>> {
        let session = self.backend.get_session().await?;
        self.store(session.clone());
        Ok(session)
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` on bad credentials, `BackendUnavailable` on
    /// transport failure. The cache is untouched on error.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let session = self.backend.sign_in(email, password).await?;
        tracing::info!(user = %session.user_id, "session established");
        self.store(Some(session.clone()));
        Ok(session)
    }

    /// Register a new account and sign in with it.
    ///
    /// # Errors
    ///
    /// Propagates account-creation and sign-in failures.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<Session> {
        let session = self.backend.sign_up(email, password, name).await?;
        self.store(Some(session.clone()));
        Ok(session)
    }

    /// Tear down the current session
    ///
    /// The cache is cleared only when the backend confirms; on error the
    /// local session stays valid and the error propagates.
    pub async fn sign_out(&self) -> Result<()> {
        self.backend.sign_out().await?;
        self.store(None);
        Ok(())
    }

    /// Cached session, if any.
    pub fn current(&self) -> Option<Session> {
        self.current.read().expect("session cache poisoned").clone()
    }

    /// User id of the cached session, if any.
    pub fn user_id(&self) -> Option<String> {
        self.current
            .read()
            .expect("session cache poisoned")
            .as_ref()
            .map(|session| session.user_id.clone())
    }

    /// Whether a session is cached.
    pub fn is_signed_in(&self) -> bool {
        self.current
            .read()
            .expect("session cache poisoned")
            .is_some()
    }

    fn store(&self, session: Option<Session>) {
        *self.current.write().expect("session cache poisoned") = session;
    }
}
