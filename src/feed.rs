//! Message feed synchronizer
//!
//! [`MessageFeed`] presents one continuously updated, ordered view of the
//! message collection, merged from two sources: a one-shot bulk fetch at
//! startup and the realtime push stream afterwards. Messages live in an
//! ordered map keyed by (`created_at`, `id`) and are **upserted by id**,
//! so a message arriving through both paths lands exactly once and a
//! `created_at` tie breaks stably by id. No re-fetch happens per incoming
//! push.
//!
//! # Connectivity
//!
//! A `watch` flag tracks the push channel: `false` while the subscription
//! cannot be opened or after its stream dies, `true` once it is
//! (re-)established. Reconnection uses bounded exponential backoff: 1s
//! initial delay doubling to a 30s cap, reset after a successful
//! resubscribe. After a reconnect the feed performs one bulk fetch to pick
//! up anything created during the disconnected window; steady-state pushes
//! never trigger a fetch.
//!
//! # Change notification
//!
//! A `watch` revision counter bumps on every mutation. Consumers hold the
//! receiver, await `changed()`, and re-read [`MessageFeed::snapshot`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::Backend;
use crate::error::Result;
use crate::models::Message;

/// Reconnection tuning for the feed's pump task.
#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// Delay before the first reconnect attempt
    pub initial_backoff: Duration,
    /// Upper bound the doubling backoff saturates at
    pub max_backoff: Duration,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Ordering key: creation time first, id as the stable tie-break.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct MessageKey {
    created_at: DateTime<Utc>,
    id: String,
}

impl MessageKey {
    fn of(message: &Message) -> Self {
        Self {
            created_at: message.created_at,
            id: message.id.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct FeedState {
    by_key: BTreeMap<MessageKey, Message>,
    key_of: HashMap<String, MessageKey>,
}

impl FeedState {
    /// Insert or replace by id. Returns whether anything changed.
    fn upsert(&mut self, message: Message) -> bool {
        let key = MessageKey::of(&message);
        if let Some(previous) = self.key_of.remove(&message.id) {
            if let Some(existing) = self.by_key.remove(&previous) {
                if existing == message {
                    // Unchanged duplicate (list + push overlap): put it back.
                    self.key_of.insert(message.id.clone(), previous.clone());
                    self.by_key.insert(previous, existing);
                    return false;
                }
            }
        }
        self.key_of.insert(message.id.clone(), key.clone());
        self.by_key.insert(key, message);
        true
    }

    fn snapshot(&self) -> Vec<Message> {
        self.by_key.values().cloned().collect()
    }
}

/// Live, ordered view of the message collection
///
/// Construct with [`MessageFeed::start`]; drop or call
/// [`MessageFeed::shutdown`] to unsubscribe and stop the pump task.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use palaver::backend::{Backend, FakeBackend};
/// use palaver::feed::MessageFeed;
///
/// # #[tokio::main]
/// # async fn main() -> palaver::error::Result<()> {
/// let backend = Arc::new(FakeBackend::new());
/// backend.remote_create("user-b", "welcome", None);
///
/// let feed = MessageFeed::start(backend.clone()).await?;
/// assert_eq!(feed.snapshot().len(), 1);
/// feed.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct MessageFeed {
    backend: Arc<dyn Backend>,
    state: Arc<RwLock<FeedState>>,
    revision_tx: Arc<watch::Sender<u64>>,
    revision_rx: watch::Receiver<u64>,
    connected_rx: watch::Receiver<bool>,
    cancel: CancellationToken,
    pump: Option<JoinHandle<()>>,
}

impl MessageFeed {
    /// Start a feed with default reconnection options
    ///
    /// Performs the initial bulk fetch, then spawns the pump task that
    /// keeps the view current from the push stream.
    ///
    /// # Errors
    ///
    /// Propagates the initial `list_messages` failure; no task is spawned
    /// in that case.
    pub async fn start(backend: Arc<dyn Backend>) -> Result<Self> {
        Self::start_with_options(backend, FeedOptions::default()).await
    }

    /// Start a feed with explicit reconnection options.
    ///
    /// # Errors
    ///
    /// Propagates the initial `list_messages` failure.
    pub async fn start_with_options(
        backend: Arc<dyn Backend>,
        options: FeedOptions,
    ) -> Result<Self> {
        let initial = backend.list_messages().await?;
        let mut seeded = FeedState::default();
        for message in initial {
            seeded.upsert(message);
        }
        tracing::debug!(count = seeded.by_key.len(), "seeded message feed");

        let state = Arc::new(RwLock::new(seeded));
        let (revision_tx, revision_rx) = watch::channel(0u64);
        let revision_tx = Arc::new(revision_tx);
        let (connected_tx, connected_rx) = watch::channel(true);
        let cancel = CancellationToken::new();

        let pump = tokio::spawn(pump(
            backend.clone(),
            state.clone(),
            revision_tx.clone(),
            connected_tx,
            cancel.clone(),
            options,
        ));

        Ok(Self {
            backend,
            state,
            revision_tx,
            revision_rx,
            connected_rx,
            cancel,
            pump: Some(pump),
        })
    }

    /// Ordered snapshot of the current view.
    pub fn snapshot(&self) -> Vec<Message> {
        self.state.read().expect("feed state poisoned").snapshot()
    }

    /// Number of messages currently in the view.
    pub fn len(&self) -> usize {
        self.state.read().expect("feed state poisoned").by_key.len()
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receiver for the change-revision counter
    ///
    /// Await `changed()` on it, then re-read [`MessageFeed::snapshot`].
    pub fn revision(&self) -> watch::Receiver<u64> {
        self.revision_rx.clone()
    }

    /// Receiver for the push-channel connectivity flag.
    pub fn connectivity(&self) -> watch::Receiver<bool> {
        self.connected_rx.clone()
    }

    /// Current connectivity of the push channel.
    pub fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }

    /// Record a message known locally without waiting for the push channel
    ///
    /// Used for optimistic convergence after this client creates a
    /// message; the eventual push copy dedups against it by id.
    pub fn insert_local(&self, message: Message) {
        let changed = self
            .state
            .write()
            .expect("feed state poisoned")
            .upsert(message);
        if changed {
            self.revision_tx.send_modify(|revision| *revision += 1);
        }
    }

    /// Re-fetch the full collection and merge it into the view
    ///
    /// Not needed in steady state (pushes keep the view current); useful
    /// after a long disconnected window or on explicit user refresh.
    ///
    /// # Errors
    ///
    /// Propagates `list_messages` failures; the view keeps its last state.
    pub async fn refresh(&self) -> Result<()> {
        let messages = self.backend.list_messages().await?;
        let mut changed = false;
        {
            let mut state = self.state.write().expect("feed state poisoned");
            for message in messages {
                changed |= state.upsert(message);
            }
        }
        if changed {
            self.revision_tx.send_modify(|revision| *revision += 1);
        }
        Ok(())
    }

    /// Stop the pump task and unsubscribe from the push channel.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }
    }
}

impl Drop for MessageFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Subscription pump: keeps the view current and the connectivity flag
/// honest, reconnecting with bounded exponential backoff.
async fn pump(
    backend: Arc<dyn Backend>,
    state: Arc<RwLock<FeedState>>,
    revision_tx: Arc<watch::Sender<u64>>,
    connected_tx: watch::Sender<bool>,
    cancel: CancellationToken,
    options: FeedOptions,
) {
    let mut delay = options.initial_backoff;
    let mut reconnecting = false;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match backend.subscribe_messages().await {
            Ok(mut subscription) => {
                connected_tx.send_replace(true);
                delay = options.initial_backoff;

                if reconnecting {
                    // One bulk fetch closes the gap left by the outage;
                    // steady-state pushes never trigger a fetch.
                    match backend.list_messages().await {
                        Ok(messages) => {
                            let mut changed = false;
                            {
                                let mut guard = state.write().expect("feed state poisoned");
                                for message in messages {
                                    changed |= guard.upsert(message);
                                }
                            }
                            if changed {
                                revision_tx.send_modify(|revision| *revision += 1);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "post-reconnect refresh failed");
                        }
                    }
                }

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            subscription.unsubscribe();
                            return;
                        }
                        message = subscription.recv() => match message {
                            Some(message) => {
                                let changed = state
                                    .write()
                                    .expect("feed state poisoned")
                                    .upsert(message);
                                if changed {
                                    revision_tx.send_modify(|revision| *revision += 1);
                                }
                            }
                            None => break,
                        }
                    }
                }

                connected_tx.send_replace(false);
                reconnecting = true;
                tracing::warn!("push channel lost, reconnecting");
            }
            Err(e) => {
                connected_tx.send_replace(false);
                reconnecting = true;
                tracing::warn!(error = %e, delay_ms = delay.as_millis() as u64, "subscription failed, retrying");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = (delay * 2).min(options.max_backoff);
    }
}
