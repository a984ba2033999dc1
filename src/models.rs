//! Domain types for Palaver
//!
//! This module defines the message and session types shared across the
//! crate. Serde attribute names follow the backend's document wire shape
//! (`$id` for the server-assigned identifier, camelCase data fields), so
//! the same types deserialize straight off the REST and realtime payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message document
///
/// Created exactly once by a client, never updated or deleted afterwards.
/// At least one of `body` and `image_id` is non-empty; the composer
/// enforces this before any backend call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned unique identifier
    #[serde(rename = "$id")]
    pub id: String,
    /// Message text; empty when the message is image-only
    #[serde(default)]
    pub body: String,
    /// Optional reference into the attachment bucket
    #[serde(rename = "imageId", default)]
    pub image_id: Option<String>,
    /// Identifier of the authenticated user who created the message
    #[serde(rename = "ownerId")]
    pub owner_id: String,
    /// Client-set creation timestamp (ISO-8601)
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Whether this message carries an image attachment.
    pub fn has_attachment(&self) -> bool {
        self.image_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// Whether this message was created by the given user.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::Utc;
    /// use palaver::models::Message;
    ///
    /// let msg = Message {
    ///     id: "m1".to_string(),
    ///     body: "hi".to_string(),
    ///     image_id: None,
    ///     owner_id: "alice".to_string(),
    ///     created_at: Utc::now(),
    /// };
    /// assert!(msg.is_owned_by("alice"));
    /// assert!(!msg.is_owned_by("bob"));
    /// ```
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }
}

/// Payload for creating a message
///
/// The backend stamps `owner_id` (from the active session) and
/// `created_at` (from the clock) at creation time; callers only provide
/// the content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Message text; may be empty when an attachment is present
    pub body: String,
    /// Attachment id returned by a prior upload, if any
    #[serde(rename = "imageId", default)]
    pub image_id: Option<String>,
}

impl NewMessage {
    /// Create a text-only payload
    ///
    /// # Examples
    ///
    /// ```
    /// use palaver::models::NewMessage;
    ///
    /// let new = NewMessage::text("hello");
    /// assert_eq!(new.body, "hello");
    /// assert!(new.image_id.is_none());
    /// ```
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            image_id: None,
        }
    }

    /// Attach an uploaded image to the payload
    ///
    /// # Examples
    ///
    /// ```
    /// use palaver::models::NewMessage;
    ///
    /// let new = NewMessage::text("").with_image("file123");
    /// assert_eq!(new.image_id.as_deref(), Some("file123"));
    /// ```
    pub fn with_image(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }

    /// Whether the payload has neither text nor attachment.
    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty() && self.image_id.as_deref().unwrap_or("").is_empty()
    }
}

/// The authenticated actor
///
/// Established by sign-in or sign-up, queried at startup, torn down by
/// sign-out. Held in memory only; absence of a session is the stable
/// unauthenticated state gating all message operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Backend user identifier
    pub user_id: String,
    /// Display name, when the account has one
    #[serde(default)]
    pub display_name: Option<String>,
    /// Account email address
    pub email: String,
    /// Account-creation timestamp
    pub registered_at: DateTime<Utc>,
    /// Last-access timestamp
    pub accessed_at: DateTime<Utc>,
}
