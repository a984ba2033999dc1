//! Error types for Palaver
//!
//! This module defines all error types used throughout the crate, using
//! `thiserror` for ergonomic error handling. The variants mirror the
//! failure modes of the remote backend (authentication, transport,
//! storage) plus the crate's own pre-flight validations.

use thiserror::Error;

/// Main error type for Palaver operations
///
/// This enum encompasses all possible errors that can occur while talking
/// to the backend, synchronizing the message feed, composing messages, and
/// loading configuration.
#[derive(Error, Debug)]
pub enum PalaverError {
    /// Configuration-related errors (missing or invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No active session for an operation that requires one
    #[error("Not signed in: {0}")]
    Unauthenticated(String),

    /// Session present but lacking permission for the operation
    #[error("Permission denied: {0}")]
    Unauthorized(String),

    /// Transport or server failure on the document API
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Attachment upload failed; no message was created
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// Unknown attachment id or missing remote resource
    #[error("Not found: {0}")]
    NotFound(String),

    /// Submission attempted with neither text nor attachment
    #[error("Message draft is empty")]
    EmptyDraft,

    /// Realtime push-channel transport errors
    #[error("Realtime channel error: {0}")]
    Realtime(String),

    /// IO errors (reading a pending attachment from disk)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for Palaver operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
