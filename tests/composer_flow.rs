//! Composer submission flow tests
//!
//! Exercises the draft state machine end to end against the in-memory
//! backend: attachment-only sends, pre-flight rejection of empty drafts,
//! upload-failure abort semantics, and draft preservation for retries.

use std::sync::Arc;

use bytes::Bytes;
use palaver::backend::{Backend, FakeBackend};
use palaver::composer::{Composer, PendingAttachment};
use palaver::error::PalaverError;

/// Magic prefix of a PNG file; format sniffing only reads the header.
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

async fn signed_in_backend() -> Arc<FakeBackend> {
    let backend = Arc::new(FakeBackend::new());
    backend
        .sign_up("alice@example.com", "pw", Some("Alice"))
        .await
        .unwrap();
    backend
}

fn png_attachment() -> PendingAttachment {
    PendingAttachment::from_bytes(Bytes::from_static(PNG_MAGIC), "photo.png")
}

// ---------------------------------------------------------------------------
// Success paths
// ---------------------------------------------------------------------------

/// An attachment-only submission yields a message with an empty body and
/// a non-empty image id, and clears the draft.
#[tokio::test]
async fn attachment_only_submission_succeeds() {
    let backend = signed_in_backend().await;
    let mut composer = Composer::new(backend.clone());
    composer.attach(png_attachment());

    let sent = composer.submit().await.unwrap();
    assert!(sent.body.is_empty());
    assert!(sent.has_attachment());
    assert!(composer.is_empty());

    let listed = backend.list_messages().await.unwrap();
    assert_eq!(listed, vec![sent]);
}

/// Text plus attachment lands as one message carrying both.
#[tokio::test]
async fn text_with_attachment_is_one_message() {
    let backend = signed_in_backend().await;
    let mut composer = Composer::new(backend.clone());
    composer.set_text("look at this");
    composer.attach(png_attachment());

    let sent = composer.submit().await.unwrap();
    assert_eq!(sent.body, "look at this");
    assert!(sent.has_attachment());
    assert_eq!(backend.create_calls(), 1);
    assert_eq!(backend.upload_calls(), 1);
}

/// A path-based attachment is read from disk at submit time.
#[tokio::test]
async fn path_attachment_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shot.png");
    std::fs::write(&path, PNG_MAGIC).unwrap();

    let backend = signed_in_backend().await;
    let mut composer = Composer::new(backend);
    composer.attach(PendingAttachment::from_path(&path));

    let sent = composer.submit().await.unwrap();
    assert!(sent.has_attachment());
}

// ---------------------------------------------------------------------------
// Rejections and failure handling
// ---------------------------------------------------------------------------

/// An empty draft is rejected before any backend call.
#[tokio::test]
async fn empty_draft_rejected_without_backend_calls() {
    let backend = signed_in_backend().await;
    let mut composer = Composer::new(backend.clone());
    composer.set_text("   ");

    let err = composer.submit().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PalaverError>(),
        Some(PalaverError::EmptyDraft)
    ));
    assert_eq!(backend.create_calls(), 0);
    assert_eq!(backend.upload_calls(), 0);
}

/// If the upload fails, no message is created and the draft survives for
/// a retry that then succeeds.
#[tokio::test]
async fn upload_failure_aborts_create_and_preserves_draft() {
    let backend = signed_in_backend().await;
    backend.set_fail_uploads(true);

    let mut composer = Composer::new(backend.clone());
    composer.set_text("caption");
    composer.attach(png_attachment());

    let err = composer.submit().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PalaverError>(),
        Some(PalaverError::UploadFailed(_))
    ));
    assert_eq!(backend.create_calls(), 0, "create must never run after a failed upload");
    assert_eq!(composer.text(), "caption");
    assert!(composer.attachment().is_some());

    // Retry after the storage recovers: same draft, now confirmed.
    backend.set_fail_uploads(false);
    let sent = composer.submit().await.unwrap();
    assert_eq!(sent.body, "caption");
    assert!(sent.has_attachment());
    assert!(composer.is_empty());
}

/// A failed create also preserves the draft.
#[tokio::test]
async fn create_failure_preserves_draft() {
    // No session: the create call itself rejects.
    let backend = Arc::new(FakeBackend::new());
    let mut composer = Composer::new(backend.clone());
    composer.set_text("hello");

    let err = composer.submit().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PalaverError>(),
        Some(PalaverError::Unauthenticated(_))
    ));
    assert_eq!(composer.text(), "hello");

    // Signing in makes the same draft submittable.
    backend.sign_up("alice@example.com", "pw", None).await.unwrap();
    let sent = composer.submit().await.unwrap();
    assert_eq!(sent.body, "hello");
    assert!(composer.is_empty());
}

/// Bytes that do not sniff as a supported image never reach the backend.
#[tokio::test]
async fn non_image_attachment_rejected_before_upload() {
    let backend = signed_in_backend().await;
    let mut composer = Composer::new(backend.clone());
    composer.attach(PendingAttachment::from_bytes(
        Bytes::from_static(b"definitely not an image"),
        "notes.txt",
    ));

    let err = composer.submit().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PalaverError>(),
        Some(PalaverError::UploadFailed(_))
    ));
    assert_eq!(backend.upload_calls(), 0);
    assert_eq!(backend.create_calls(), 0);
    assert!(composer.attachment().is_some());
}

/// Submitting an attachment without a session fails before the upload.
#[tokio::test]
async fn attachment_without_session_is_unauthenticated() {
    let backend = Arc::new(FakeBackend::new());
    let mut composer = Composer::new(backend.clone());
    composer.attach(png_attachment());

    let err = composer.submit().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PalaverError>(),
        Some(PalaverError::Unauthenticated(_))
    ));
    assert_eq!(backend.upload_calls(), 0);
}
