//! OpenAI-compatible Chat Completions client (OpenAI, Groq, DeepSeek)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{LlmProvider, retry_after_secs};
use crate::{
    error::{Error, Result},
    types::{CompletionRequest, Message, Model},
};

/// Chat Completions client. The API key travels with each request.
#[derive(Debug, Clone, Default)]
pub struct OpenAIProvider {
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn build_request(&self, model: &Model, request: &CompletionRequest) -> OpenAIRequest {
        OpenAIRequest {
            model: model.id.clone(),
            messages: request.messages.iter().map(convert_message).collect(),
            max_tokens: model.max_tokens,
            temperature: request.temperature,
            response_format: request.json_mode.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn complete(&self, model: &Model, request: &CompletionRequest) -> Result<String> {
        if request.api_key.is_empty() {
            return Err(Error::InvalidApiKey);
        }

        let url = format!("{}/chat/completions", model.base_url.trim_end_matches('/'));
        let body = self.build_request(model, request);

        tracing::debug!(
            provider = %model.provider,
            model = %model.id,
            messages = body.messages.len(),
            "chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&request.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status.as_u16(), text, retry_after));
        }

        let parsed: OpenAIResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::UnexpectedResponse("no choices in completion".to_string()))
    }
}

fn convert_message(msg: &Message) -> OpenAIMessage {
    OpenAIMessage {
        role: msg.role.as_str().to_string(),
        content: msg.content.clone(),
    }
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
