//! In-process fake backend for unit and integration tests
//!
//! [`FakeBackend`] implements the full [`Backend`] trait using in-memory
//! state and a broadcast channel, so tests can drive the synchronizer and
//! composer without a network or a hosted backend.
//!
//! Besides the trait surface, the fake exposes test-side controls:
//!
//! - [`FakeBackend::remote_create`] injects a message as if another device
//!   had created it, delivering it to every open subscription
//! - [`FakeBackend::set_fail_uploads`] makes storage uploads fail
//! - [`FakeBackend::fail_next_subscribes`] makes the next N subscription
//!   attempts fail, for reconnect tests
//! - [`FakeBackend::create_calls`] / [`FakeBackend::upload_calls`] count
//!   invocations, for "was never called" assertions
//!
//! # Example
//!
//! ```
//! use palaver::backend::{Backend, FakeBackend};
//! use palaver::models::NewMessage;
//!
//! # #[tokio::main]
//! # async fn main() -> palaver::error::Result<()> {
//! let backend = FakeBackend::new();
//! backend.sign_up("alice@example.com", "hunter2", Some("Alice")).await?;
//!
//! let created = backend.create_message(NewMessage::text("hello")).await?;
//! assert_eq!(backend.list_messages().await?, vec![created]);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::backend::{Backend, Subscription};
use crate::error::{PalaverError, Result};
use crate::models::{Message, NewMessage, Session};

/// Capacity of the fan-out channel feeding subscriptions.
const EVENT_CAPACITY: usize = 64;

/// A registered account in the fake.
#[derive(Debug, Clone)]
struct FakeAccount {
    user_id: String,
    password: String,
    name: Option<String>,
    registered_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct FakeState {
    messages: Vec<Message>,
    files: HashMap<String, String>,
    accounts: HashMap<String, FakeAccount>,
    session: Option<Session>,
}

/// Deterministic in-memory backend double
///
/// See the module docs for the test-side controls.
pub struct FakeBackend {
    state: Mutex<FakeState>,
    events: broadcast::Sender<Message>,
    create_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    fail_uploads: AtomicBool,
    subscribe_failures: AtomicUsize,
}

impl FakeBackend {
    /// Create an empty fake backend with no accounts and no messages.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(FakeState::default()),
            events,
            create_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            fail_uploads: AtomicBool::new(false),
            subscribe_failures: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent upload fail with `UploadFailed`.
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` subscription attempts fail with `Realtime`.
    pub fn fail_next_subscribes(&self, count: usize) {
        self.subscribe_failures.store(count, Ordering::SeqCst);
    }

    /// Number of times `create_message` was invoked (successful or not).
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of times `upload_attachment` was invoked (successful or not).
    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    /// Number of currently open subscriptions
    ///
    /// Tests use this to wait until a consumer's subscription is live
    /// before injecting remote creates.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Inject a message as if another device had created it
    ///
    /// The message is appended to the collection and delivered to every
    /// open subscription, exactly like a server-side create.
    pub fn remote_create(
        &self,
        owner_id: &str,
        body: &str,
        image_id: Option<&str>,
    ) -> Message {
        let message = Message {
            id: Uuid::new_v4().simple().to_string(),
            body: body.to_string(),
            image_id: image_id.map(String::from),
            owner_id: owner_id.to_string(),
            created_at: Utc::now(),
        };
        self.push(message.clone());
        message
    }

    /// Append a prebuilt message and broadcast it to subscriptions.
    pub fn push(&self, message: Message) {
        {
            let mut state = self.state.lock().expect("fake state poisoned");
            state.messages.push(message.clone());
        }
        // No receivers is fine; the collection still records the message.
        let _ = self.events.send(message);
    }

    fn current_user_id(&self) -> Option<String> {
        let state = self.state.lock().expect("fake state poisoned");
        state.session.as_ref().map(|s| s.user_id.clone())
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn list_messages(&self) -> Result<Vec<Message>> {
        let state = self.state.lock().expect("fake state poisoned");
        let mut messages = state.messages.clone();
        messages.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(messages)
    }

    async fn create_message(&self, new: NewMessage) -> Result<Message> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let owner_id = self.current_user_id().ok_or_else(|| {
            PalaverError::Unauthenticated("create_message requires a session".to_string())
        })?;

        let message = Message {
            id: Uuid::new_v4().simple().to_string(),
            body: new.body,
            image_id: new.image_id,
            owner_id,
            created_at: Utc::now(),
        };
        self.push(message.clone());
        Ok(message)
    }

    async fn subscribe_messages(&self) -> Result<Subscription> {
        let pending = self.subscribe_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.subscribe_failures.store(pending - 1, Ordering::SeqCst);
            return Err(
                PalaverError::Realtime("injected subscription failure".to_string()).into(),
            );
        }

        let mut events = self.events.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let pump_cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = pump_cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(message) => {
                            if tx.send(message).is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });

        Ok(Subscription::new(rx, cancel))
    }

    async fn upload_attachment(&self, _bytes: Bytes, file_name: &str) -> Result<String> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(PalaverError::UploadFailed("injected upload failure".to_string()).into());
        }

        let id = Uuid::new_v4().simple().to_string();
        let mut state = self.state.lock().expect("fake state poisoned");
        state.files.insert(id.clone(), file_name.to_string());
        Ok(id)
    }

    async fn resolve_attachment_url(&self, attachment_id: &str) -> Result<Url> {
        let state = self.state.lock().expect("fake state poisoned");
        if !state.files.contains_key(attachment_id) {
            return Err(
                PalaverError::NotFound(format!("attachment {}", attachment_id)).into(),
            );
        }
        let url = format!("https://files.example.com/{}/view", attachment_id);
        Ok(Url::parse(&url).expect("fake view url is valid"))
    }

    async fn get_session(&self) -> Result<Option<Session>> {
        let state = self.state.lock().expect("fake state poisoned");
        Ok(state.session.clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let mut state = self.state.lock().expect("fake state poisoned");
        let account = state
            .accounts
            .get(email)
            .filter(|account| account.password == password)
            .cloned()
            .ok_or_else(|| PalaverError::Unauthenticated("invalid credentials".to_string()))?;

        let session = Session {
            user_id: account.user_id,
            display_name: account.name,
            email: email.to_string(),
            registered_at: account.registered_at,
            accessed_at: Utc::now(),
        };
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, name: Option<&str>) -> Result<Session> {
        {
            let mut state = self.state.lock().expect("fake state poisoned");
            if state.accounts.contains_key(email) {
                return Err(PalaverError::BackendUnavailable(
                    "account already exists".to_string(),
                )
                .into());
            }
            state.accounts.insert(
                email.to_string(),
                FakeAccount {
                    user_id: Uuid::new_v4().simple().to_string(),
                    password: password.to_string(),
                    name: name.map(String::from),
                    registered_at: Utc::now(),
                },
            );
        }
        self.sign_in(email, password).await
    }

    async fn sign_out(&self) -> Result<()> {
        let mut state = self.state.lock().expect("fake state poisoned");
        state.session = None;
        Ok(())
    }
}
