//! Client construction and wiring
//!
//! [`ChatClient`] is the crate's dependency-injection root: it owns the
//! backend instance and hands out the synchronizer, composer, session
//! manager, and attachment cache wired to that same instance. There is no
//! process-wide singleton: construct a client explicitly and pass it
//! where it is needed; tests construct one over a [`FakeBackend`].
//!
//! [`FakeBackend`]: crate::backend::FakeBackend

use std::sync::Arc;

use crate::attachments::AttachmentCache;
use crate::backend::{self, Backend};
use crate::composer::Composer;
use crate::config::Config;
use crate::error::Result;
use crate::feed::{FeedOptions, MessageFeed};
use crate::session::SessionManager;

/// Explicitly constructed client over one backend instance
///
/// # Examples
///
/// ```no_run
/// use palaver::ChatClient;
///
/// # #[tokio::main]
/// # async fn main() -> palaver::error::Result<()> {
/// let client = ChatClient::from_env()?;
/// client.sessions().sign_in("alice@example.com", "hunter2").await?;
///
/// let feed = client.feed().await?;
/// let mut composer = client.composer();
/// composer.set_text("hello");
/// composer.submit().await?;
/// # Ok(())
/// # }
/// ```
pub struct ChatClient {
    backend: Arc<dyn Backend>,
    sessions: Arc<SessionManager>,
    attachments: Arc<AttachmentCache>,
}

impl ChatClient {
    /// Build a client over the production HTTP backend.
    ///
    /// # Errors
    ///
    /// Returns configuration errors from validation or backend
    /// construction.
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self::with_backend(backend::connect(config)?))
    }

    /// Build a client from environment-provided configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first missing variable.
    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env()?)
    }

    /// Build a client over an explicit backend instance
    ///
    /// This is the seam tests use to inject a fake.
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        let sessions = Arc::new(SessionManager::new(backend.clone()));
        let attachments = Arc::new(AttachmentCache::new(backend.clone()));
        Self {
            backend,
            sessions,
            attachments,
        }
    }

    /// The backend this client was constructed over.
    pub fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    /// Session manager shared by all consumers of this client.
    pub fn sessions(&self) -> Arc<SessionManager> {
        self.sessions.clone()
    }

    /// Attachment URL cache shared by all consumers of this client.
    pub fn attachments(&self) -> Arc<AttachmentCache> {
        self.attachments.clone()
    }

    /// A fresh composer against this client's backend.
    pub fn composer(&self) -> Composer {
        Composer::new(self.backend.clone())
    }

    /// Start a message feed with default reconnection options.
    ///
    /// # Errors
    ///
    /// Propagates the initial bulk-fetch failure.
    pub async fn feed(&self) -> Result<MessageFeed> {
        MessageFeed::start(self.backend.clone()).await
    }

    /// Start a message feed with explicit reconnection options.
    ///
    /// # Errors
    ///
    /// Propagates the initial bulk-fetch failure.
    pub async fn feed_with_options(&self, options: FeedOptions) -> Result<MessageFeed> {
        MessageFeed::start_with_options(self.backend.clone(), options).await
    }
}
