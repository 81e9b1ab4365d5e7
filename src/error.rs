//! Error types for advisor-chat
//!
//! This module defines all error types used throughout the client,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for chat client operations
///
/// This enum covers configuration loading, session and credential handling,
/// REST calls against the advising backend, and the realtime channel.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No credential is available for an operation that requires one
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Authentication errors (e.g., 401 Unauthorized, expired token)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The current user's role is not allowed to perform the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Input rejected before reaching the backend
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backend returned a non-success status
    #[error("API error: status={status}, {message}")]
    Api {
        /// HTTP status code returned by the backend
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Realtime channel failures (closed connection, handshake failure)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server did not acknowledge an emitted event in time
    #[error("Acknowledgement timeout for event '{event}'")]
    AckTimeout {
        /// Name of the event that was emitted
        event: String,
    },

    /// The server acknowledged an emitted event with an error
    #[error("Server rejected '{event}': {message}")]
    Rejected {
        /// Name of the event that was emitted
        event: String,
        /// Error text returned in the acknowledgement
        message: String,
    },

    /// An operation needs an active conversation but none is selected
    #[error("No active conversation")]
    NoActiveConversation,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// WebSocket handshake or framing errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Result type alias for chat client operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation. Callers that
/// need to branch on the failure kind use `downcast_ref::<ChatError>()`.
pub type Result<T> = anyhow::Result<T>;
