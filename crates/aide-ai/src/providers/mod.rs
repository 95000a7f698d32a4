//! Backend provider implementations

pub mod google;
pub mod openai;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{Api, CompletionRequest, Model, Provider, Result};

pub use google::GoogleProvider;
pub use openai::OpenAIProvider;

/// A backend that turns a message list into one text response.
///
/// Implementations perform exactly one HTTP exchange and never retry;
/// every failure comes back as a typed [`crate::Error`].
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, model: &Model, request: &CompletionRequest) -> Result<String>;
}

/// Maps providers to the client that speaks their protocol.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Provider, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with an HTTP client for every known provider.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let openai: Arc<dyn LlmProvider> = Arc::new(OpenAIProvider::new());
        let google: Arc<dyn LlmProvider> = Arc::new(GoogleProvider::new());
        for provider in Provider::ALL {
            let client = match provider.api() {
                Api::OpenAICompletions => openai.clone(),
                Api::GoogleGenerativeAI => google.clone(),
            };
            registry.register(provider, client);
        }
        registry
    }

    pub fn register(&mut self, provider: Provider, client: Arc<dyn LlmProvider>) {
        self.providers.insert(provider, client);
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(&provider).cloned()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.providers.keys().map(|p| p.id()).collect();
        names.sort_unstable();
        f.debug_struct("ProviderRegistry")
            .field("providers", &names)
            .finish()
    }
}

/// Parse a `Retry-After` header given in whole seconds.
pub(crate) fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
