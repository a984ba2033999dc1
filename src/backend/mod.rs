//! Backend facade for Palaver
//!
//! This module defines the [`Backend`] trait: the crate's only seam to
//! the hosted platform: together with the [`Subscription`] handle for the
//! realtime push channel. Two implementations are provided:
//!
//! - [`HttpBackend`]: the production facade over the backend's REST and
//!   WebSocket APIs
//! - [`FakeBackend`]: an in-process deterministic double for tests
//!
//! All operations are asynchronous and fallible; error variants follow the
//! taxonomy in [`crate::error`].

pub mod fake;
pub mod http;
pub mod realtime;

pub use fake::FakeBackend;
pub use http::HttpBackend;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::Config;
use crate::error::Result;
use crate::models::{Message, NewMessage, Session};

/// Remote backend facade
///
/// Wraps the document collection, the binary object store, the realtime
/// push channel, and the credential lifecycle behind one async contract.
/// Construct implementations explicitly and share them via `Arc`: there
/// is no process-wide singleton.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use palaver::backend::{Backend, HttpBackend};
/// use palaver::config::Config;
///
/// # async fn example() -> palaver::error::Result<()> {
/// let config = Config::from_env()?;
/// let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(config)?);
/// let messages = backend.list_messages().await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Backend: Send + Sync {
    /// List all messages in the collection, server-ordered
    ///
    /// # Errors
    ///
    /// `BackendUnavailable` on transport failure, `Unauthorized` when the
    /// session lacks read permission.
    async fn list_messages(&self) -> Result<Vec<Message>>;

    /// Create a message as the current user
    ///
    /// The implementation stamps `owner_id` from the active session and
    /// `created_at` from the clock.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` without an active session, `BackendUnavailable`
    /// on transport failure.
    async fn create_message(&self, new: NewMessage) -> Result<Message>;

    /// Open the realtime push channel for newly created messages
    ///
    /// Messages arrive in server-observed order for the lifetime of the
    /// subscription. The returned handle stops delivering permanently once
    /// [`Subscription::unsubscribe`] is called; a dead transport surfaces
    /// as end-of-stream so callers can reconnect.
    ///
    /// # Errors
    ///
    /// `Realtime` or `BackendUnavailable` when the channel cannot be
    /// opened.
    async fn subscribe_messages(&self) -> Result<Subscription>;

    /// Upload an image attachment, returning its storage id
    ///
    /// # Errors
    ///
    /// `UploadFailed` on any storage or transport failure.
    async fn upload_attachment(&self, bytes: Bytes, file_name: &str) -> Result<String>;

    /// Resolve an attachment id to a transient viewable URL
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    async fn resolve_attachment_url(&self, attachment_id: &str) -> Result<Url>;

    /// Current session, if any
    ///
    /// Absence of a session is a stable state, not an error.
    async fn get_session(&self) -> Result<Option<Session>>;

    /// Sign in with email and password
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// Register a new account, then sign in with it
    async fn sign_up(&self, email: &str, password: &str, name: Option<&str>) -> Result<Session>;

    /// Tear down the current session
    async fn sign_out(&self) -> Result<()>;
}

/// Construct the production backend for a validated configuration.
///
/// # Errors
///
/// Returns configuration errors from validation or client construction.
pub fn connect(config: Config) -> Result<Arc<dyn Backend>> {
    config.validate()?;
    Ok(Arc::new(HttpBackend::new(config)?))
}

/// Handle to an open push-channel subscription
///
/// Wraps the inbound message channel together with a cancellation token
/// for the transport pump task. Dropping the handle unsubscribes.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
    closed: Arc<AtomicBool>,
}

impl Subscription {
    /// Build a subscription from its channel half and pump cancel token.
    ///
    /// Backend implementations spawn a pump task that forwards delivered
    /// messages into `events` and exits when `cancel` fires.
    pub fn new(events: mpsc::UnboundedReceiver<Message>, cancel: CancellationToken) -> Self {
        Self {
            events,
            cancel,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Receive the next pushed message
    ///
    /// Returns `None` once the subscription was unsubscribed or the
    /// underlying transport ended. Messages that were still in flight when
    /// [`Subscription::unsubscribe`] ran are never delivered.
    pub async fn recv(&mut self) -> Option<Message> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        let message = self.events.recv().await;
        // A racing unsubscribe must win over buffered deliveries.
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        message
    }

    /// Stop the subscription
    ///
    /// After this returns, [`Subscription::recv`] yields `None` forever;
    /// buffered but undelivered messages are discarded.
    pub fn unsubscribe(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        self.events.close();
    }

    /// Whether `unsubscribe` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}
