//! HTTP backend integration tests
//!
//! Tests `HttpBackend` against a `wiremock` mock server: endpoint shapes,
//! request scoping headers, the credential flow, and the mapping from
//! response statuses to the error taxonomy.

use bytes::Bytes;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use palaver::backend::{Backend, HttpBackend};
use palaver::config::Config;
use palaver::error::PalaverError;
use palaver::models::NewMessage;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Construct an `HttpBackend` pointing at the given wiremock base URL.
fn make_backend(base_url: &str) -> HttpBackend {
    HttpBackend::new(Config {
        endpoint: base_url.to_string(),
        project_id: "proj".to_string(),
        database_id: "db".to_string(),
        collection_id: "messages".to_string(),
        bucket_id: "images".to_string(),
    })
    .expect("valid config")
}

/// One message document as the server would return it.
fn document_json(id: &str, body: &str, owner: &str) -> serde_json::Value {
    json!({
        "$id": id,
        "$collectionId": "messages",
        "body": body,
        "imageId": null,
        "ownerId": owner,
        "createdAt": "2025-06-01T12:00:00Z"
    })
}

/// Mount the two mocks a successful sign-in needs and run it.
async fn sign_in(server: &MockServer, backend: &HttpBackend) {
    Mock::given(method("POST"))
        .and(path("/account/sessions/email"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "userId": "u1",
            "secret": "s3cr3t"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "$id": "u1",
            "name": "Alice",
            "email": "alice@example.com",
            "registeredAt": "2025-01-01T00:00:00Z",
            "accessedAt": "2025-06-01T00:00:00Z"
        })))
        .mount(server)
        .await;

    backend
        .sign_in("alice@example.com", "pw")
        .await
        .expect("sign_in should succeed");
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Listing decodes the document-list envelope into messages.
#[tokio::test]
async fn list_messages_decodes_documents() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/databases/db/collections/messages/documents"))
        .and(header("X-Project-Id", "proj"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 2,
            "documents": [
                document_json("m1", "first", "u1"),
                document_json("m2", "second", "u2"),
            ]
        })))
        .mount(&server)
        .await;

    let backend = make_backend(&server.uri());
    let messages = backend.list_messages().await.unwrap();

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, "m1");
    assert_eq!(messages[1].owner_id, "u2");
}

/// Creating posts the document body with the session owner stamped in,
/// and carries the bearer secret captured at sign-in.
#[tokio::test]
async fn create_message_posts_stamped_document() {
    let server = MockServer::start().await;
    let backend = make_backend(&server.uri());
    sign_in(&server, &backend).await;

    Mock::given(method("POST"))
        .and(path("/databases/db/collections/messages/documents"))
        .and(header("Authorization", "Bearer s3cr3t"))
        .and(body_partial_json(json!({
            "data": { "body": "hello", "ownerId": "u1" }
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(document_json("m9", "hello", "u1")),
        )
        .mount(&server)
        .await;

    let created = backend
        .create_message(NewMessage::text("hello"))
        .await
        .unwrap();
    assert_eq!(created.id, "m9");
    assert_eq!(created.owner_id, "u1");
}

// ---------------------------------------------------------------------------
// Status mapping
// ---------------------------------------------------------------------------

/// 403 on the collection maps to `Unauthorized`.
#[tokio::test]
async fn list_messages_maps_403_to_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"message": "no read access"})),
        )
        .mount(&server)
        .await;

    let backend = make_backend(&server.uri());
    let err = backend.list_messages().await.unwrap_err();
    match err.downcast_ref::<PalaverError>() {
        Some(PalaverError::Unauthorized(detail)) => assert!(detail.contains("no read access")),
        other => panic!("expected Unauthorized, got {:?}", other),
    }
}

/// 5xx on the collection maps to `BackendUnavailable`.
#[tokio::test]
async fn list_messages_maps_500_to_backend_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let backend = make_backend(&server.uri());
    let err = backend.list_messages().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PalaverError>(),
        Some(PalaverError::BackendUnavailable(_))
    ));
}

/// Bad credentials surface as `Unauthenticated`.
#[tokio::test]
async fn sign_in_maps_401_to_unauthenticated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/account/sessions/email"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "invalid credentials"})),
        )
        .mount(&server)
        .await;

    let backend = make_backend(&server.uri());
    let err = backend.sign_in("alice@example.com", "wrong").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PalaverError>(),
        Some(PalaverError::Unauthenticated(_))
    ));
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Sign-in captures the account as the session.
#[tokio::test]
async fn sign_in_builds_session_from_account() {
    let server = MockServer::start().await;
    let backend = make_backend(&server.uri());
    sign_in(&server, &backend).await;

    let session = backend.get_session().await.unwrap().unwrap();
    assert_eq!(session.user_id, "u1");
    assert_eq!(session.display_name.as_deref(), Some("Alice"));
    assert_eq!(session.email, "alice@example.com");
}

/// A 401 on the account endpoint clears the stored secret: the session
/// is gone, not an error.
#[tokio::test]
async fn expired_session_returns_none_and_clears_state() {
    let server = MockServer::start().await;
    let backend = make_backend(&server.uri());

    Mock::given(method("POST"))
        .and(path("/account/sessions/email"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "userId": "u1",
            "secret": "s3cr3t"
        })))
        .mount(&server)
        .await;
    // The account endpoint honors the secret exactly once, then expires it.
    Mock::given(method("GET"))
        .and(path("/account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "$id": "u1",
            "name": "",
            "email": "alice@example.com",
            "registeredAt": "2025-01-01T00:00:00Z",
            "accessedAt": "2025-06-01T00:00:00Z"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/account"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "expired"})))
        .mount(&server)
        .await;

    backend.sign_in("alice@example.com", "pw").await.unwrap();
    assert!(backend.get_session().await.unwrap().is_none());

    // The cleared secret means later calls skip the network entirely.
    assert!(backend.get_session().await.unwrap().is_none());
}

/// Sign-out deletes the sessions resource and drops the secret.
#[tokio::test]
async fn sign_out_deletes_sessions() {
    let server = MockServer::start().await;
    let backend = make_backend(&server.uri());
    sign_in(&server, &backend).await;

    Mock::given(method("DELETE"))
        .and(path("/account/sessions"))
        .and(header("Authorization", "Bearer s3cr3t"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    backend.sign_out().await.unwrap();
    assert!(backend.get_session().await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Uploads post multipart to the bucket and return the file id.
#[tokio::test]
async fn upload_attachment_returns_file_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/storage/buckets/images/files"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"$id": "file1"})))
        .mount(&server)
        .await;

    let backend = make_backend(&server.uri());
    let id = backend
        .upload_attachment(Bytes::from_static(b"pngbytes"), "pic.png")
        .await
        .unwrap();
    assert_eq!(id, "file1");
}

/// Any storage failure collapses into `UploadFailed`.
#[tokio::test]
async fn upload_attachment_maps_failures_to_upload_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "disk full"})))
        .mount(&server)
        .await;

    let backend = make_backend(&server.uri());
    let err = backend
        .upload_attachment(Bytes::from_static(b"pngbytes"), "pic.png")
        .await
        .unwrap_err();
    match err.downcast_ref::<PalaverError>() {
        Some(PalaverError::UploadFailed(detail)) => assert!(detail.contains("disk full")),
        other => panic!("expected UploadFailed, got {:?}", other),
    }
}

/// Resolution checks existence, then hands out the project-scoped view
/// URL.
#[tokio::test]
async fn resolve_attachment_url_builds_view_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/buckets/images/files/file1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"$id": "file1"})))
        .mount(&server)
        .await;

    let backend = make_backend(&server.uri());
    let url = backend.resolve_attachment_url("file1").await.unwrap();
    assert!(url.path().ends_with("/storage/buckets/images/files/file1/view"));
    assert_eq!(url.query(), Some("project=proj"));
}

/// Unknown ids map to `NotFound`.
#[tokio::test]
async fn resolve_attachment_url_maps_404_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "no such file"})))
        .mount(&server)
        .await;

    let backend = make_backend(&server.uri());
    let err = backend.resolve_attachment_url("ghost").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PalaverError>(),
        Some(PalaverError::NotFound(_))
    ));
}
