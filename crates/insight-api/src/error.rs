//! Error types for insight-api

use thiserror::Error;

/// Result type alias using insight-api Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the chat API
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned a non-success response
    #[error("API error ({status}): {detail}")]
    Api { status: u16, detail: String },

    /// Authentication was rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A realtime event name this client does not know
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from a status code and detail message
    pub fn api(status: u16, detail: impl Into<String>) -> Self {
        Self::Api {
            status,
            detail: detail.into(),
        }
    }

    /// Human-readable detail suitable for showing next to a conversation.
    pub fn detail(&self) -> String {
        match self {
            Error::Api { detail, .. } => detail.clone(),
            Error::Unauthorized(detail) => detail.clone(),
            Error::Http(e) if e.is_timeout() => "Request timed out".to_string(),
            Error::Http(e) if e.is_connect() => "Could not reach the server".to_string(),
            other => other.to_string(),
        }
    }
}
