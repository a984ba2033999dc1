//! Attachment URL resolution cache
//!
//! Attachment references resolve to transient view URLs on demand. The
//! cache owns the resolved URLs keyed by attachment id, so re-projecting
//! the message list never re-resolves an id it has already seen:
//! resolution cost is paid once per attachment, not once per render.
//!
//! Failed resolutions are not cached: a `NotFound` today may succeed
//! later once the upload finishes propagating.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use url::Url;

use crate::backend::Backend;
use crate::error::Result;

/// Resolve-once cache from attachment id to view URL
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use bytes::Bytes;
/// use palaver::attachments::AttachmentCache;
/// use palaver::backend::{Backend, FakeBackend};
///
/// # #[tokio::main]
/// # async fn main() -> palaver::error::Result<()> {
/// let backend = Arc::new(FakeBackend::new());
/// let id = backend.upload_attachment(Bytes::from_static(b"img"), "pic.png").await?;
///
/// let cache = AttachmentCache::new(backend);
/// let url = cache.resolve(&id).await?;
/// assert_eq!(cache.cached(&id), Some(url));
/// # Ok(())
/// # }
/// ```
pub struct AttachmentCache {
    backend: Arc<dyn Backend>,
    resolved: RwLock<HashMap<String, Url>>,
}

impl AttachmentCache {
    /// Create an empty cache against the given backend.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve an attachment id, hitting the backend at most once per id.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids, `BackendUnavailable` on transport
    /// failure. Errors are not cached.
    pub async fn resolve(&self, attachment_id: &str) -> Result<Url> {
        if let Some(url) = self.cached(attachment_id) {
            return Ok(url);
        }

        let url = self.backend.resolve_attachment_url(attachment_id).await?;
        self.resolved
            .write()
            .expect("attachment cache poisoned")
            .insert(attachment_id.to_string(), url.clone());
        tracing::trace!(id = attachment_id, "resolved attachment url");
        Ok(url)
    }

    /// Already-resolved URL for an id, without touching the backend.
    pub fn cached(&self, attachment_id: &str) -> Option<Url> {
        self.resolved
            .read()
            .expect("attachment cache poisoned")
            .get(attachment_id)
            .cloned()
    }

    /// Number of resolved entries.
    pub fn len(&self) -> usize {
        self.resolved.read().expect("attachment cache poisoned").len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FakeBackend;
    use crate::error::PalaverError;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_resolve_caches_by_id() {
        let backend = Arc::new(FakeBackend::new());
        let id = backend
            .upload_attachment(Bytes::from_static(b"img"), "pic.png")
            .await
            .unwrap();

        let cache = AttachmentCache::new(backend);
        assert!(cache.cached(&id).is_none());

        let first = cache.resolve(&id).await.unwrap();
        let second = cache.resolve(&id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found_and_not_cached() {
        let cache = AttachmentCache::new(Arc::new(FakeBackend::new()));
        let err = cache.resolve("missing").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PalaverError>(),
            Some(PalaverError::NotFound(_))
        ));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_late_upload_resolves_after_earlier_miss() {
        let backend = Arc::new(FakeBackend::new());
        let cache = AttachmentCache::new(backend.clone());

        assert!(cache.resolve("img1").await.is_err());

        // The id exists now; the earlier miss must not stick.
        let id = backend
            .upload_attachment(Bytes::from_static(b"img"), "pic.png")
            .await
            .unwrap();
        assert!(cache.resolve(&id).await.is_ok());
    }
}
