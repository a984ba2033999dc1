//! Configuration management for Palaver
//!
//! All settings are environment-provided (there is no config file and no
//! user-facing surface for them): the backend endpoint, the project/tenant
//! id, the database and message-collection ids, and the storage-bucket id.
//! A missing or malformed value surfaces as a startup configuration error,
//! never as a silent no-op.

use crate::error::{PalaverError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Environment variable holding the backend endpoint URL.
pub const ENV_ENDPOINT: &str = "PALAVER_ENDPOINT";
/// Environment variable holding the project/tenant identifier.
pub const ENV_PROJECT_ID: &str = "PALAVER_PROJECT_ID";
/// Environment variable holding the database identifier.
pub const ENV_DATABASE_ID: &str = "PALAVER_DATABASE_ID";
/// Environment variable holding the message-collection identifier.
pub const ENV_COLLECTION_ID: &str = "PALAVER_COLLECTION_ID";
/// Environment variable holding the storage-bucket identifier.
pub const ENV_BUCKET_ID: &str = "PALAVER_BUCKET_ID";

/// Connection settings for the remote backend
///
/// Holds everything needed to reach the hosted backend: the HTTP endpoint,
/// the project scope, and the identifiers of the message collection and the
/// attachment bucket.
///
/// # Examples
///
/// ```
/// use palaver::config::Config;
///
/// let config = Config {
///     endpoint: "https://backend.example.com/v1".to_string(),
///     project_id: "chat-demo".to_string(),
///     database_id: "main".to_string(),
///     collection_id: "messages".to_string(),
///     bucket_id: "attachments".to_string(),
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the backend REST API (e.g. `https://host/v1`)
    pub endpoint: String,
    /// Project/tenant identifier, sent with every request
    pub project_id: String,
    /// Database identifier containing the message collection
    pub database_id: String,
    /// Collection identifier for message documents
    pub collection_id: String,
    /// Storage-bucket identifier for image attachments
    pub bucket_id: String,
}

/// Read a required environment variable, erroring with its name when unset.
fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(PalaverError::Config(format!("{} is not set", name)).into()),
    }
}

impl Config {
    /// Load configuration from the environment
    ///
    /// Reads `PALAVER_ENDPOINT`, `PALAVER_PROJECT_ID`, `PALAVER_DATABASE_ID`,
    /// `PALAVER_COLLECTION_ID` and `PALAVER_BUCKET_ID`, then validates the
    /// result.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first missing variable, or
    /// any error from [`Config::validate`].
    pub fn from_env() -> Result<Self> {
        let config = Self {
            endpoint: require_env(ENV_ENDPOINT)?,
            project_id: require_env(ENV_PROJECT_ID)?,
            database_id: require_env(ENV_DATABASE_ID)?,
            collection_id: require_env(ENV_COLLECTION_ID)?,
            bucket_id: require_env(ENV_BUCKET_ID)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// The endpoint must parse as an `http` or `https` URL; all identifiers
    /// must be non-empty.
    ///
    /// # Errors
    ///
    /// Returns `PalaverError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| PalaverError::Config(format!("invalid endpoint URL: {}", e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(PalaverError::Config(format!(
                "endpoint scheme must be http or https, got {}",
                url.scheme()
            ))
            .into());
        }
        for (field, value) in [
            ("project_id", &self.project_id),
            ("database_id", &self.database_id),
            ("collection_id", &self.collection_id),
            ("bucket_id", &self.bucket_id),
        ] {
            if value.trim().is_empty() {
                return Err(PalaverError::Config(format!("{} is empty", field)).into());
            }
        }
        Ok(())
    }

    /// Parsed endpoint URL
    ///
    /// # Errors
    ///
    /// Returns `PalaverError::Config` if the endpoint does not parse.
    pub fn endpoint_url(&self) -> Result<Url> {
        Url::parse(self.endpoint.trim_end_matches('/'))
            .map_err(|e| PalaverError::Config(format!("invalid endpoint URL: {}", e)).into())
    }

    /// Realtime (WebSocket) URL derived from the endpoint
    ///
    /// `http` maps to `ws` and `https` to `wss`; the push channel lives at
    /// `/realtime` under the endpoint, scoped to the project and the message
    /// collection channel.
    ///
    /// # Errors
    ///
    /// Returns `PalaverError::Config` if the endpoint does not parse.
    pub fn realtime_url(&self) -> Result<Url> {
        let mut url = self.endpoint_url()?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| PalaverError::Config("endpoint scheme cannot carry websockets".into()))?;
        let path = format!("{}/realtime", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.query_pairs_mut()
            .append_pair("project", &self.project_id)
            .append_pair("channels[]", &self.messages_channel());
        Ok(url)
    }

    /// Channel name of the message collection on the push channel.
    pub fn messages_channel(&self) -> String {
        format!(
            "databases.{}.collections.{}.documents",
            self.database_id, self.collection_id
        )
    }
}
