//! Provider gateway: one exchange with one backend, classified.

use std::fmt;
use std::sync::Arc;

use aide_ai::{CompletionRequest, FailureKind, LlmProvider, Message, Model, extract_json};
use serde_json::Value;

/// A successful exchange, already coerced to JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReply {
    pub value: Value,
    /// The response text exactly as the model sent it
    pub raw: String,
}

/// A failed exchange, in exactly one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<aide_ai::Error> for ProviderFailure {
    fn from(e: aide_ai::Error) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Binds a provider client to a model and key for a single request.
///
/// Never retries and never touches conversation history.
pub struct ProviderGateway<'a> {
    client: Arc<dyn LlmProvider>,
    model: &'a Model,
    api_key: &'a str,
    temperature: Option<f32>,
}

impl<'a> ProviderGateway<'a> {
    pub fn new(client: Arc<dyn LlmProvider>, model: &'a Model, api_key: &'a str) -> Self {
        Self {
            client,
            model,
            api_key,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Send `messages` in JSON mode and coerce the response to a JSON value.
    pub async fn send(&self, messages: &[Message]) -> Result<GatewayReply, ProviderFailure> {
        let text = self.send_text(messages, true).await?;
        let value = extract_json(&text)?;
        Ok(GatewayReply { value, raw: text })
    }

    /// Send `messages` and return the raw text (internal requests such as summaries).
    pub async fn send_text(
        &self,
        messages: &[Message],
        json_mode: bool,
    ) -> Result<String, ProviderFailure> {
        let mut request = CompletionRequest::new(messages.to_vec(), self.api_key)
            .with_json_mode(json_mode);
        if let Some(t) = self.temperature {
            request = request.with_temperature(t);
        }

        let text = self.client.complete(self.model, &request).await?;
        if text.trim().is_empty() {
            return Err(ProviderFailure {
                kind: FailureKind::MalformedResponse,
                message: "empty response".to_string(),
            });
        }
        Ok(text)
    }
}
