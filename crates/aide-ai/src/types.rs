//! Core types for backend interactions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Supported wire protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Api {
    OpenAICompletions,
    GoogleGenerativeAI,
}

/// Known backend providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Groq,
    DeepSeek,
    Gemini,
    OpenAI,
}

impl Provider {
    /// All providers in the default failover order
    pub const ALL: [Provider; 4] = [
        Provider::Groq,
        Provider::DeepSeek,
        Provider::Gemini,
        Provider::OpenAI,
    ];

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Groq => "Groq",
            Provider::DeepSeek => "DeepSeek",
            Provider::Gemini => "Gemini",
            Provider::OpenAI => "OpenAI",
        }
    }

    /// Stable lowercase identifier (config keys, logs)
    pub fn id(&self) -> &'static str {
        match self {
            Provider::Groq => "groq",
            Provider::DeepSeek => "deepseek",
            Provider::Gemini => "gemini",
            Provider::OpenAI => "openai",
        }
    }

    /// Wire protocol spoken by this provider
    pub fn api(&self) -> Api {
        match self {
            Provider::Gemini => Api::GoogleGenerativeAI,
            Provider::Groq | Provider::DeepSeek | Provider::OpenAI => Api::OpenAICompletions,
        }
    }

    /// Default base URL for API calls
    pub fn base_url(&self) -> &'static str {
        match self {
            Provider::Groq => "https://api.groq.com/openai/v1",
            Provider::DeepSeek => "https://api.deepseek.com",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Provider::OpenAI => "https://api.openai.com/v1",
        }
    }

    /// Environment variables consulted for this provider's API key, in order
    pub fn api_key_env_vars(&self) -> &'static [&'static str] {
        match self {
            Provider::Groq => &["GROQ_API_KEY"],
            Provider::DeepSeek => &["DEEPSEEK_API_KEY"],
            Provider::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Provider::OpenAI => &["OPENAI_API_KEY"],
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Provider {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(Provider::Groq),
            "deepseek" => Ok(Provider::DeepSeek),
            "gemini" | "google" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAI),
            other => Err(crate::Error::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Model definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Model identifier (e.g., "llama-3.3-70b-versatile")
    pub id: String,
    /// Provider serving this model
    pub provider: Provider,
    /// Base URL for API calls
    pub base_url: String,
    /// Maximum output tokens, if the provider should be told
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Model {
    /// Create a model on the provider's default endpoint
    pub fn new(provider: Provider, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider,
            base_url: provider.base_url().to_string(),
            max_tokens: None,
        }
    }

    /// Wire protocol for this model
    pub fn api(&self) -> Api {
        self.provider.api()
    }
}

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single conversation message.
///
/// `sequence_index` is assigned by the conversation store when the message
/// is appended; ephemeral messages built for one request keep `0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub sequence_index: u64,
    #[serde(default)]
    pub timestamp: i64,
}

impl Message {
    /// Create a message with the given role
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            sequence_index: 0,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Set the sequence index
    pub fn with_sequence(mut self, sequence_index: u64) -> Self {
        self.sequence_index = sequence_index;
        self
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// One request/response exchange with a backend
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Full ordered message list
    pub messages: Vec<Message>,
    /// API key to authenticate with
    pub api_key: String,
    /// Ask the backend for a JSON object response
    pub json_mode: bool,
    /// Temperature (0.0 - 2.0)
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>, api_key: impl Into<String>) -> Self {
        Self {
            messages,
            api_key: api_key.into(),
            json_mode: true,
            temperature: None,
        }
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse_and_display() {
        assert_eq!("groq".parse::<Provider>().unwrap(), Provider::Groq);
        assert_eq!("Google".parse::<Provider>().unwrap(), Provider::Gemini);
        assert!("claude".parse::<Provider>().is_err());
        assert_eq!(Provider::DeepSeek.to_string(), "deepseek");
    }

    #[test]
    fn test_provider_serde_lowercase() {
        let json = serde_json::to_string(&Provider::OpenAI).unwrap();
        assert_eq!(json, "\"openai\"");
        let p: Provider = serde_json::from_str("\"gemini\"").unwrap();
        assert_eq!(p, Provider::Gemini);
    }

    #[test]
    fn test_model_uses_provider_endpoint() {
        let m = Model::new(Provider::Groq, "llama-3.3-70b-versatile");
        assert_eq!(m.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(m.api(), Api::OpenAICompletions);
        assert_eq!(Model::new(Provider::Gemini, "x").api(), Api::GoogleGenerativeAI);
    }

    #[test]
    fn test_message_constructors() {
        let m = Message::user("hi").with_sequence(4);
        assert_eq!(m.role, Role::User);
        assert_eq!(m.sequence_index, 4);
        assert!(Message::system("s").is_system());
    }
}
