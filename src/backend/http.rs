//! HTTP backend facade
//!
//! This module implements [`Backend`] over the hosted platform's REST API:
//! the account endpoints for the credential lifecycle, the document
//! endpoints for the message collection, and the storage endpoints for
//! image attachments. The realtime push channel is delegated to
//! [`crate::backend::realtime`].
//!
//! # Request scoping
//!
//! Every request carries the project id in an `X-Project-Id` header. After
//! a successful sign-in the session secret is attached as a bearer token;
//! a `401` on the account endpoint clears the stored secret, returning the
//! client to the stable unauthenticated state.
//!
//! # Status mapping
//!
//! `401` maps to `Unauthenticated`, `403` to `Unauthorized`, `404` to
//! `NotFound`; every other non-success status and all transport errors map
//! to `BackendUnavailable`. Storage uploads collapse all failures into
//! `UploadFailed`: a failed upload aborts the submission that requested
//! it, so finer distinctions buy nothing there.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::backend::{realtime, Backend, Subscription};
use crate::config::Config;
use crate::error::{PalaverError, Result};
use crate::models::{Message, NewMessage, Session};

/// Header carrying the project/tenant id on every request.
const PROJECT_HEADER: &str = "X-Project-Id";

/// Per-request timeout for the REST API.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Production backend over the platform's REST + WebSocket APIs
///
/// Construct one per process (or per test) and share it via `Arc`; the
/// session secret captured at sign-in lives inside, so all consumers of
/// the same instance observe the same authentication state.
///
/// # Examples
///
/// ```no_run
/// use palaver::backend::HttpBackend;
/// use palaver::config::Config;
///
/// # fn example() -> palaver::error::Result<()> {
/// let backend = HttpBackend::new(Config::from_env()?)?;
/// # Ok(())
/// # }
/// ```
pub struct HttpBackend {
    http: reqwest::Client,
    config: Config,
    auth: RwLock<Option<AuthState>>,
}

/// Session continuity state captured at sign-in.
#[derive(Debug, Clone)]
struct AuthState {
    /// Bearer session secret attached to every authenticated request.
    secret: String,
    /// User id of the session owner, stamped onto created messages.
    user_id: String,
}

/// Error body returned by the backend on failed requests.
#[derive(Debug, Deserialize, Default)]
struct ErrorPayload {
    #[serde(default)]
    message: String,
}

/// Account payload from `GET /account`.
#[derive(Debug, Deserialize)]
struct AccountPayload {
    #[serde(rename = "$id")]
    id: String,
    #[serde(default)]
    name: String,
    email: String,
    #[serde(rename = "registeredAt")]
    registered_at: DateTime<Utc>,
    #[serde(rename = "accessedAt")]
    accessed_at: DateTime<Utc>,
}

impl From<AccountPayload> for Session {
    fn from(account: AccountPayload) -> Self {
        Session {
            user_id: account.id,
            display_name: (!account.name.is_empty()).then_some(account.name),
            email: account.email,
            registered_at: account.registered_at,
            accessed_at: account.accessed_at,
        }
    }
}

/// Session payload from `POST /account/sessions/email`.
#[derive(Debug, Deserialize)]
struct SessionPayload {
    #[serde(rename = "userId")]
    user_id: String,
    secret: String,
}

/// Document list from `GET .../documents`.
#[derive(Debug, Deserialize)]
struct DocumentListPayload {
    #[serde(default)]
    #[allow(dead_code)]
    total: u64,
    documents: Vec<Message>,
}

/// File payload from a storage upload.
#[derive(Debug, Deserialize)]
struct FilePayload {
    #[serde(rename = "$id")]
    id: String,
}

/// Body of `POST .../documents`.
#[derive(Debug, Serialize)]
struct CreateDocumentRequest<'a> {
    #[serde(rename = "documentId")]
    document_id: String,
    data: DocumentData<'a>,
}

/// Message attributes inside a create-document request.
#[derive(Debug, Serialize)]
struct DocumentData<'a> {
    body: &'a str,
    #[serde(rename = "imageId")]
    image_id: Option<&'a str>,
    #[serde(rename = "ownerId")]
    owner_id: &'a str,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
}

/// Body of `POST /account` (sign-up).
#[derive(Debug, Serialize)]
struct CreateAccountRequest<'a> {
    #[serde(rename = "userId")]
    user_id: String,
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

/// Body of `POST /account/sessions/email` (sign-in).
#[derive(Debug, Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Map a failed response status to the error taxonomy.
fn status_to_error(status: u16, detail: String) -> PalaverError {
    match status {
        401 => PalaverError::Unauthenticated(detail),
        403 => PalaverError::Unauthorized(detail),
        404 => PalaverError::NotFound(detail),
        _ => PalaverError::BackendUnavailable(detail),
    }
}

impl HttpBackend {
    /// Create a new HTTP backend for a validated configuration
    ///
    /// No network I/O happens at construction time.
    ///
    /// # Errors
    ///
    /// Returns configuration errors from validation or from HTTP client
    /// initialization.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("palaver/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PalaverError::Config(format!("failed to create HTTP client: {}", e)))?;

        tracing::info!(
            endpoint = %config.endpoint,
            project = %config.project_id,
            "initialized http backend"
        );

        Ok(Self {
            http,
            config,
            auth: RwLock::new(None),
        })
    }

    /// Endpoint with the given path appended.
    fn url(&self, path: &str) -> Result<Url> {
        let base = self.config.endpoint_url()?;
        let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), path);
        Url::parse(&joined)
            .map_err(|e| PalaverError::Config(format!("invalid request URL: {}", e)).into())
    }

    /// Path of the message-collection documents resource.
    fn documents_path(&self) -> String {
        format!(
            "databases/{}/collections/{}/documents",
            self.config.database_id, self.config.collection_id
        )
    }

    /// Apply project scoping and session auth to a request.
    fn scoped(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(PROJECT_HEADER, &self.config.project_id);
        match self.secret() {
            Some(secret) => builder.bearer_auth(secret),
            None => builder,
        }
    }

    fn secret(&self) -> Option<String> {
        self.auth
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|state| state.secret.clone()))
    }

    fn session_user_id(&self) -> Option<String> {
        self.auth
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|state| state.user_id.clone()))
    }

    fn store_auth(&self, state: Option<AuthState>) {
        if let Ok(mut guard) = self.auth.write() {
            *guard = state;
        }
    }

    /// Turn a failed response into a taxonomy error, consuming the body.
    async fn response_error(response: reqwest::Response, context: &str) -> PalaverError {
        let status = response.status().as_u16();
        let message = response
            .json::<ErrorPayload>()
            .await
            .map(|payload| payload.message)
            .unwrap_or_default();
        let detail = if message.is_empty() {
            format!("{} returned status {}", context, status)
        } else {
            message
        };
        status_to_error(status, detail)
    }

    fn transport_error(error: reqwest::Error, context: &str) -> PalaverError {
        PalaverError::BackendUnavailable(format!("{}: {}", context, error))
    }

    /// Viewable URL for an attachment id, without the existence check.
    fn view_url(&self, attachment_id: &str) -> Result<Url> {
        let mut url = self.url(&format!(
            "storage/buckets/{}/files/{}/view",
            self.config.bucket_id, attachment_id
        ))?;
        url.query_pairs_mut()
            .append_pair("project", &self.config.project_id);
        Ok(url)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_messages(&self) -> Result<Vec<Message>> {
        let url = self.url(&self.documents_path())?;
        let response = self
            .scoped(self.http.get(url))
            .send()
            .await
            .map_err(|e| Self::transport_error(e, "list_messages"))?;

        if !response.status().is_success() {
            return Err(Self::response_error(response, "list_messages").await.into());
        }

        let payload: DocumentListPayload = response
            .json()
            .await
            .map_err(|e| Self::transport_error(e, "list_messages"))?;
        Ok(payload.documents)
    }

    async fn create_message(&self, new: NewMessage) -> Result<Message> {
        // The session requirement is checked locally; no request is made
        // while unauthenticated.
        let owner_id = self.session_user_id().ok_or_else(|| {
            PalaverError::Unauthenticated("create_message requires a session".to_string())
        })?;

        let request = CreateDocumentRequest {
            document_id: Uuid::new_v4().simple().to_string(),
            data: DocumentData {
                body: &new.body,
                image_id: new.image_id.as_deref(),
                owner_id: &owner_id,
                created_at: Utc::now(),
            },
        };

        let url = self.url(&self.documents_path())?;
        let response = self
            .scoped(self.http.post(url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::transport_error(e, "create_message"))?;

        if !response.status().is_success() {
            return Err(Self::response_error(response, "create_message")
                .await
                .into());
        }

        let message: Message = response
            .json()
            .await
            .map_err(|e| Self::transport_error(e, "create_message"))?;
        tracing::debug!(id = %message.id, "created message");
        Ok(message)
    }

    async fn subscribe_messages(&self) -> Result<Subscription> {
        realtime::open(&self.config).await
    }

    async fn upload_attachment(&self, bytes: Bytes, file_name: &str) -> Result<String> {
        let mime = mime_guess::from_path(file_name).first_or_octet_stream();
        let part = multipart::Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime.essence_str())
            .map_err(|e| PalaverError::UploadFailed(format!("invalid content type: {}", e)))?;
        let form = multipart::Form::new()
            .text("fileId", Uuid::new_v4().simple().to_string())
            .part("file", part);

        let url = self.url(&format!("storage/buckets/{}/files", self.config.bucket_id))?;
        let response = self
            .scoped(self.http.post(url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| PalaverError::UploadFailed(format!("upload_attachment: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .json::<ErrorPayload>()
                .await
                .map(|payload| payload.message)
                .unwrap_or_default();
            let detail = if message.is_empty() {
                format!("storage returned status {}", status)
            } else {
                message
            };
            return Err(PalaverError::UploadFailed(detail).into());
        }

        let payload: FilePayload = response
            .json()
            .await
            .map_err(|e| PalaverError::UploadFailed(format!("upload_attachment: {}", e)))?;
        tracing::debug!(id = %payload.id, file_name, "uploaded attachment");
        Ok(payload.id)
    }

    async fn resolve_attachment_url(&self, attachment_id: &str) -> Result<Url> {
        // Confirm the file exists before handing out a view URL, so unknown
        // ids surface as NotFound here rather than as a broken image later.
        let url = self.url(&format!(
            "storage/buckets/{}/files/{}",
            self.config.bucket_id, attachment_id
        ))?;
        let response = self
            .scoped(self.http.get(url))
            .send()
            .await
            .map_err(|e| Self::transport_error(e, "resolve_attachment_url"))?;

        if !response.status().is_success() {
            return Err(Self::response_error(response, "resolve_attachment_url")
                .await
                .into());
        }

        self.view_url(attachment_id)
    }

    async fn get_session(&self) -> Result<Option<Session>> {
        if self.secret().is_none() {
            return Ok(None);
        }

        let url = self.url("account")?;
        let response = self
            .scoped(self.http.get(url))
            .send()
            .await
            .map_err(|e| Self::transport_error(e, "get_session"))?;

        if response.status().as_u16() == 401 {
            // The stored secret is no longer honored; drop it.
            self.store_auth(None);
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::response_error(response, "get_session").await.into());
        }

        let account: AccountPayload = response
            .json()
            .await
            .map_err(|e| Self::transport_error(e, "get_session"))?;
        Ok(Some(account.into()))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let url = self.url("account/sessions/email")?;
        let response = self
            .scoped(self.http.post(url))
            .json(&SignInRequest { email, password })
            .send()
            .await
            .map_err(|e| Self::transport_error(e, "sign_in"))?;

        if !response.status().is_success() {
            return Err(Self::response_error(response, "sign_in").await.into());
        }

        let payload: SessionPayload = response
            .json()
            .await
            .map_err(|e| Self::transport_error(e, "sign_in"))?;
        self.store_auth(Some(AuthState {
            secret: payload.secret,
            user_id: payload.user_id,
        }));

        match self.get_session().await? {
            Some(session) => {
                tracing::info!(user = %session.user_id, "signed in");
                Ok(session)
            }
            None => Err(PalaverError::Unauthenticated(
                "session was not established".to_string(),
            )
            .into()),
        }
    }

    async fn sign_up(&self, email: &str, password: &str, name: Option<&str>) -> Result<Session> {
        let url = self.url("account")?;
        let request = CreateAccountRequest {
            user_id: Uuid::new_v4().simple().to_string(),
            email,
            password,
            name,
        };
        let response = self
            .scoped(self.http.post(url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::transport_error(e, "sign_up"))?;

        if !response.status().is_success() {
            return Err(Self::response_error(response, "sign_up").await.into());
        }

        // Account creation does not open a session; sign in with the new
        // credentials, as the original registration flow does.
        self.sign_in(email, password).await
    }

    async fn sign_out(&self) -> Result<()> {
        if self.secret().is_none() {
            return Ok(());
        }

        let url = self.url("account/sessions")?;
        let response = self
            .scoped(self.http.delete(url))
            .send()
            .await
            .map_err(|e| Self::transport_error(e, "sign_out"))?;

        let status = response.status();
        if status.is_success() || status.as_u16() == 401 {
            self.store_auth(None);
            tracing::info!("signed out");
            return Ok(());
        }
        Err(Self::response_error(response, "sign_out").await.into())
    }
}
