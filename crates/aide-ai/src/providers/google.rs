//! Google Generative AI (Gemini) client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{LlmProvider, retry_after_secs};
use crate::{
    error::{Error, Result},
    types::{CompletionRequest, Model, Role},
};

/// Gemini `generateContent` client. The API key travels with each request.
#[derive(Debug, Clone, Default)]
pub struct GoogleProvider {
    client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn build_request(&self, model: &Model, request: &CompletionRequest) -> GoogleRequest {
        let mut system_instruction = None;
        let mut contents: Vec<GoogleContent> = Vec::new();

        for msg in &request.messages {
            match msg.role {
                // Only the leading system prompt maps to systemInstruction;
                // later system notes are folded into the turn list.
                Role::System if system_instruction.is_none() && contents.is_empty() => {
                    system_instruction = Some(GoogleSystemInstruction {
                        parts: vec![GooglePart {
                            text: msg.content.clone(),
                        }],
                    });
                }
                Role::System => contents.push(GoogleContent {
                    role: "user".to_string(),
                    parts: vec![GooglePart {
                        text: format!("[system] {}", msg.content),
                    }],
                }),
                Role::User => contents.push(GoogleContent {
                    role: "user".to_string(),
                    parts: vec![GooglePart {
                        text: msg.content.clone(),
                    }],
                }),
                Role::Assistant => contents.push(GoogleContent {
                    role: "model".to_string(),
                    parts: vec![GooglePart {
                        text: msg.content.clone(),
                    }],
                }),
            }
        }

        GoogleRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                max_output_tokens: model.max_tokens,
                temperature: request.temperature,
                response_mime_type: request
                    .json_mode
                    .then(|| "application/json".to_string()),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    async fn complete(&self, model: &Model, request: &CompletionRequest) -> Result<String> {
        if request.api_key.is_empty() {
            return Err(Error::InvalidApiKey);
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            model.base_url.trim_end_matches('/'),
            model.id,
            request.api_key
        );
        let body = self.build_request(model, request);

        tracing::debug!(
            provider = %model.provider,
            model = %model.id,
            turns = body.contents.len(),
            "generateContent request"
        );

        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status.as_u16(), text, retry_after));
        }

        let parsed: GoogleResponse = response.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(Error::UnexpectedResponse(
                "no candidates in generateContent response".to_string(),
            ));
        }
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleRequest {
    contents: Vec<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GoogleSystemInstruction>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GoogleContent {
    role: String,
    parts: Vec<GooglePart>,
}

#[derive(Debug, Serialize)]
struct GoogleSystemInstruction {
    parts: Vec<GooglePart>,
}

#[derive(Debug, Serialize)]
struct GooglePart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}
