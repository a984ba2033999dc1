//! Message composer
//!
//! [`Composer`] holds the user's draft: pending text plus at most one
//! pending attachment: and turns it into a created message on
//! [`Composer::submit`]. Submission is a retryable command: the draft is
//! cleared only after the backend confirms creation, so a failed upload
//! or create leaves everything in place for a retry.
//!
//! Submission order is fixed: the attachment (if any) uploads first and
//! its storage id becomes the message's `image_id`; an upload failure
//! aborts the whole submission with no message created. An empty draft is
//! rejected before any backend call is made.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use image::ImageFormat;

use crate::backend::Backend;
use crate::error::{PalaverError, Result};
use crate::models::{Message, NewMessage};

/// Image formats accepted for attachments.
const SUPPORTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

/// A locally picked image that has not been uploaded yet
///
/// Held as a file path or as raw bytes plus a file name; nothing is read
/// or uploaded until [`Composer::submit`].
#[derive(Debug, Clone)]
pub struct PendingAttachment {
    source: AttachmentSource,
    file_name: String,
}

#[derive(Debug, Clone)]
enum AttachmentSource {
    Path(PathBuf),
    Bytes(Bytes),
}

impl PendingAttachment {
    /// Reference an image file on disk
    ///
    /// # Examples
    ///
    /// ```
    /// use palaver::composer::PendingAttachment;
    ///
    /// let pending = PendingAttachment::from_path("/tmp/photo.jpg");
    /// assert_eq!(pending.file_name(), "photo.jpg");
    /// ```
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        Self {
            source: AttachmentSource::Path(path),
            file_name,
        }
    }

    /// Hold already-loaded image bytes.
    pub fn from_bytes(bytes: impl Into<Bytes>, file_name: impl Into<String>) -> Self {
        Self {
            source: AttachmentSource::Bytes(bytes.into()),
            file_name: file_name.into(),
        }
    }

    /// File name of the picked image.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Load the attachment bytes.
    async fn read(&self) -> Result<Bytes> {
        match &self.source {
            AttachmentSource::Path(path) => {
                let bytes = tokio::fs::read(path).await.map_err(PalaverError::Io)?;
                Ok(Bytes::from(bytes))
            }
            AttachmentSource::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Sniff the picked bytes and require a supported image format.
fn sniff_image(bytes: &[u8]) -> Result<ImageFormat> {
    let format = image::guess_format(bytes).map_err(|e| {
        PalaverError::UploadFailed(format!("attachment is not a recognized image: {}", e))
    })?;
    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(PalaverError::UploadFailed(format!(
            "unsupported attachment format: {:?}",
            format
        ))
        .into());
    }
    Ok(format)
}

/// Storage file name for an upload: `<user id>-<millis>.<ext>`.
fn upload_name(user_id: &str, format: ImageFormat) -> String {
    let extension = format.extensions_str().first().copied().unwrap_or("img");
    format!("{}-{}.{}", user_id, Utc::now().timestamp_millis(), extension)
}

/// Draft state machine for composing one message
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use palaver::backend::{Backend, FakeBackend};
/// use palaver::composer::Composer;
///
/// # #[tokio::main]
/// # async fn main() -> palaver::error::Result<()> {
/// let backend = Arc::new(FakeBackend::new());
/// backend.sign_up("alice@example.com", "pw", None).await?;
///
/// let mut composer = Composer::new(backend);
/// composer.set_text("hello there");
/// let sent = composer.submit().await?;
/// assert_eq!(sent.body, "hello there");
/// assert!(composer.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct Composer {
    backend: Arc<dyn Backend>,
    text: String,
    attachment: Option<PendingAttachment>,
}

impl Composer {
    /// Create an empty composer against the given backend.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            text: String::new(),
            attachment: None,
        }
    }

    /// Replace the draft text. Purely local, no side effects.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Current draft text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Set the pending attachment, replacing any previous one.
    pub fn attach(&mut self, attachment: PendingAttachment) {
        self.attachment = Some(attachment);
    }

    /// Drop the pending attachment, keeping the text.
    pub fn clear_attachment(&mut self) {
        self.attachment = None;
    }

    /// Current pending attachment, if any.
    pub fn attachment(&self) -> Option<&PendingAttachment> {
        self.attachment.as_ref()
    }

    /// Whether the draft has neither text nor attachment.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachment.is_none()
    }

    /// Submit the draft as one message
    ///
    /// Uploads the attachment first (when present), then creates the
    /// message document carrying the upload's id. The draft is cleared
    /// only on confirmed success; any failure leaves it intact so the
    /// user can retry.
    ///
    /// # Errors
    ///
    /// - `EmptyDraft` when there is neither text nor attachment; no
    ///   backend call is made
    /// - `Unauthenticated` without an active session
    /// - `UploadFailed` when the attachment cannot be read as a supported
    ///   image or the storage upload fails; `create_message` is never
    ///   called in that case
    /// - `BackendUnavailable` from the create call itself
    pub async fn submit(&mut self) -> Result<Message> {
        if self.is_empty() {
            return Err(PalaverError::EmptyDraft.into());
        }

        let image_id = match &self.attachment {
            Some(pending) => {
                // The storage name carries the uploader's id, so the
                // session is required before the upload starts.
                let session = self.backend.get_session().await?.ok_or_else(|| {
                    PalaverError::Unauthenticated(
                        "submitting an attachment requires a session".to_string(),
                    )
                })?;

                let bytes = pending.read().await?;
                let format = sniff_image(&bytes)?;
                let name = upload_name(&session.user_id, format);
                let id = self.backend.upload_attachment(bytes, &name).await?;
                tracing::debug!(id = %id, "attachment uploaded");
                Some(id)
            }
            None => None,
        };

        let new = NewMessage {
            body: self.text.trim().to_string(),
            image_id,
        };
        let created = self.backend.create_message(new).await?;

        // Confirmed success: only now is the draft gone.
        self.text.clear();
        self.attachment = None;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FakeBackend;

    /// Magic prefix of a PNG file; `guess_format` only needs the header.
    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    /// Magic prefix of a JPEG file.
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];

    #[test]
    fn test_sniff_accepts_png_and_jpeg() {
        assert_eq!(sniff_image(PNG_MAGIC).unwrap(), ImageFormat::Png);
        assert_eq!(sniff_image(JPEG_MAGIC).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_sniff_rejects_non_image_bytes() {
        let err = sniff_image(b"just some text").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PalaverError>(),
            Some(PalaverError::UploadFailed(_))
        ));
    }

    #[test]
    fn test_upload_name_scheme() {
        let name = upload_name("user1", ImageFormat::Png);
        assert!(name.starts_with("user1-"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn test_pending_attachment_file_name_from_path() {
        let pending = PendingAttachment::from_path("/tmp/photos/cat.jpg");
        assert_eq!(pending.file_name(), "cat.jpg");
    }

    #[test]
    fn test_pending_attachment_from_bytes() {
        let pending = PendingAttachment::from_bytes(Bytes::from_static(PNG_MAGIC), "pic.png");
        assert_eq!(pending.file_name(), "pic.png");
    }

    #[test]
    fn test_draft_state_transitions() {
        let mut composer = Composer::new(Arc::new(FakeBackend::new()));
        assert!(composer.is_empty());

        composer.set_text("hi");
        assert!(!composer.is_empty());

        composer.set_text("   ");
        assert!(composer.is_empty());

        composer.attach(PendingAttachment::from_bytes(
            Bytes::from_static(PNG_MAGIC),
            "pic.png",
        ));
        assert!(!composer.is_empty());
        assert!(composer.attachment().is_some());

        composer.clear_attachment();
        assert!(composer.is_empty());
    }

    #[tokio::test]
    async fn test_submit_empty_draft_makes_no_backend_call() {
        let backend = Arc::new(FakeBackend::new());
        let mut composer = Composer::new(backend.clone());

        let err = composer.submit().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PalaverError>(),
            Some(PalaverError::EmptyDraft)
        ));
        assert_eq!(backend.create_calls(), 0);
        assert_eq!(backend.upload_calls(), 0);
    }

    #[tokio::test]
    async fn test_submit_trims_text() {
        let backend = Arc::new(FakeBackend::new());
        backend.sign_up("a@example.com", "pw", None).await.unwrap();

        let mut composer = Composer::new(backend);
        composer.set_text("  hello  ");
        let sent = composer.submit().await.unwrap();
        assert_eq!(sent.body, "hello");
    }
}
