//! Error types for aide-agent
//!
//! Turn-level operations never return these; they surface only while
//! building a session (config, memory backends, IO).

use thiserror::Error;

/// Result type alias using aide-agent Error
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// An error from the provider layer
    #[error(transparent)]
    Ai(#[from] aide_ai::Error),

    /// Configuration could not be parsed or is inconsistent
    #[error("Config error: {0}")]
    Config(String),

    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Long-term memory backend failure
    #[error("Memory error: {0}")]
    Memory(String),
}
