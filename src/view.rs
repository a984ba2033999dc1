//! Presentation projection
//!
//! Turns raw messages into [`MessageView`]s ready for a UI list:
//! ownership is decided by comparing `owner_id` against the viewing
//! session's user id, timestamps render as time-of-day for same-day
//! messages and date + time otherwise, and image references resolve
//! through the shared [`AttachmentCache`] so repeated projections of an
//! unchanged list never re-resolve.
//!
//! A message whose attachment cannot be resolved still projects: the
//! view carries no image URL rather than failing the whole list.

use chrono::{DateTime, Utc};
use url::Url;

use crate::attachments::AttachmentCache;
use crate::models::Message;

/// One message prepared for display
#[derive(Debug, Clone)]
pub struct MessageView {
    /// The underlying message
    pub message: Message,
    /// Whether the viewing user created this message
    pub is_own: bool,
    /// Human-readable creation time
    pub timestamp: String,
    /// Resolved view URL of the attachment, when present and resolvable
    pub image_url: Option<Url>,
}

/// Format a creation timestamp relative to `now`
///
/// Same calendar day (UTC) renders as `HH:MM`; anything else renders as
/// `Mon DD, YYYY HH:MM`.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use palaver::view::format_timestamp;
///
/// let now = Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap();
/// let today = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();
/// let earlier = Utc.with_ymd_and_hms(2025, 5, 20, 9, 30, 0).unwrap();
///
/// assert_eq!(format_timestamp(today, now), "09:30");
/// assert_eq!(format_timestamp(earlier, now), "May 20, 2025 09:30");
/// ```
pub fn format_timestamp(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    if at.date_naive() == now.date_naive() {
        at.format("%H:%M").to_string()
    } else {
        at.format("%b %d, %Y %H:%M").to_string()
    }
}

/// Project messages into display views
///
/// `viewer_id` is the current session's user id, when signed in; without
/// one, no message is marked as own. Attachment resolution goes through
/// the cache, so each image id costs at most one backend call across all
/// projections.
pub async fn project(
    messages: &[Message],
    viewer_id: Option<&str>,
    attachments: &AttachmentCache,
    now: DateTime<Utc>,
) -> Vec<MessageView> {
    let mut views = Vec::with_capacity(messages.len());
    for message in messages {
        let image_url = match message.image_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => match attachments.resolve(id).await {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(id, error = %e, "attachment did not resolve");
                    None
                }
            },
            None => None,
        };
        views.push(MessageView {
            is_own: viewer_id.is_some_and(|viewer| message.is_owned_by(viewer)),
            timestamp: format_timestamp(message.created_at, now),
            image_url,
            message: message.clone(),
        });
    }
    views
}
