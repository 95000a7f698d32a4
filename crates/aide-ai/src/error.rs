//! Error types for aide-ai

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using aide-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a backend provider
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned a non-success status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// No API key configured
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Response body could not be coerced to a structured action
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Provider not supported
    #[error("Provider not supported: {0}")]
    UnsupportedProvider(String),

    /// Unexpected response shape (no choices, no candidates, ...)
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// The single category a provider failure is classified into.
///
/// Retry and failover policy is keyed on this value; the provider layer
/// itself never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AuthFailure,
    RateLimited,
    ModelNotFound,
    MalformedResponse,
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::AuthFailure => "auth_failure",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ModelNotFound => "model_not_found",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl Error {
    /// Create an API error from a status code and body
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status and response body to a typed error.
    pub fn from_status(status: u16, body: impl Into<String>, retry_after: Option<u64>) -> Self {
        let body = body.into();
        let lower = body.to_lowercase();
        match status {
            429 => Error::RateLimited { retry_after },
            401 | 403 => Error::Auth(body),
            404 => Error::ModelNotFound(body),
            // Gemini reports bad keys as 400 INVALID_ARGUMENT
            400 if lower.contains("api key not valid") || lower.contains("api_key_invalid") => {
                Error::Auth(body)
            }
            _ if lower.contains("model_not_found") => Error::ModelNotFound(body),
            _ => Error::api(status, body),
        }
    }

    /// Classify this error into exactly one failure category.
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::RateLimited { .. } => FailureKind::RateLimited,
            Error::Auth(_) | Error::InvalidApiKey => FailureKind::AuthFailure,
            Error::ModelNotFound(_) => FailureKind::ModelNotFound,
            Error::MalformedResponse(_) | Error::Json(_) => FailureKind::MalformedResponse,
            Error::Api { status, message } => classify_message(Some(*status), message),
            Error::Http(e) => classify_message(e.status().map(|s| s.as_u16()), &e.to_string()),
            Error::UnexpectedResponse(_) | Error::UnsupportedProvider(_) => FailureKind::Unknown,
        }
    }
}

/// Fallback classification for errors that only carry text.
fn classify_message(status: Option<u16>, message: &str) -> FailureKind {
    let msg = message.to_lowercase();
    if status == Some(429)
        || msg.contains("rate_limit")
        || msg.contains("rate limit")
        || msg.contains("too many requests")
    {
        return FailureKind::RateLimited;
    }
    if matches!(status, Some(401) | Some(403))
        || msg.contains("invalid api key")
        || msg.contains("incorrect api key")
        || msg.contains("unauthorized")
    {
        return FailureKind::AuthFailure;
    }
    if msg.contains("model")
        && (status == Some(404) || msg.contains("not found") || msg.contains("does not exist"))
    {
        return FailureKind::ModelNotFound;
    }
    FailureKind::Unknown
}
