//! aide-ai: backend provider layer
//!
//! Wire types, the provider catalog, HTTP clients for the supported
//! backends, failure classification and structured-output extraction.

pub mod error;
pub mod extract;
pub mod models;
pub mod providers;
pub mod types;

pub use error::{Error, FailureKind, Result};
pub use extract::extract_json;
pub use providers::{LlmProvider, ProviderRegistry};
pub use types::*;
