//! Palaver - BaaS-backed realtime chat client SDK
//!
//! This library implements the client side of a hosted-backend chat
//! system: message synchronization over a realtime push channel, message
//! composition with image attachments, the credential lifecycle, and
//! presentation projection for an embedding UI.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `backend`: the facade trait over the hosted platform (documents,
//!   storage, realtime, accounts) with HTTP and in-memory implementations
//! - `feed`: the synchronizer merging the bulk fetch with the push stream
//!   into one ordered, de-duplicated view with connectivity tracking
//! - `composer`: the draft state machine and retryable submission flow
//! - `session`: credential lifecycle and the in-memory session cache
//! - `attachments`: resolve-once cache from attachment id to view URL
//! - `view`: presentation projection (ownership, timestamps, image URLs)
//! - `client`: the dependency-injection root wiring it all together
//! - `config`: environment-provided backend settings
//! - `error`: error types and result aliases
//!
//! # Example
//!
//! ```no_run
//! use palaver::ChatClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ChatClient::from_env()?;
//!     client.sessions().sign_in("alice@example.com", "hunter2").await?;
//!
//!     let feed = client.feed().await?;
//!     for message in feed.snapshot() {
//!         println!("{}: {}", message.owner_id, message.body);
//!     }
//!     Ok(())
//! }
//! ```

pub mod attachments;
pub mod backend;
pub mod client;
pub mod composer;
pub mod config;
pub mod error;
pub mod feed;
pub mod models;
pub mod session;
pub mod view;

// Re-export commonly used types
pub use attachments::AttachmentCache;
pub use backend::{Backend, FakeBackend, HttpBackend, Subscription};
pub use client::ChatClient;
pub use composer::{Composer, PendingAttachment};
pub use config::Config;
pub use error::{PalaverError, Result};
pub use feed::{FeedOptions, MessageFeed};
pub use models::{Message, NewMessage, Session};
pub use session::SessionManager;
pub use view::{format_timestamp, project, MessageView};
