//! Default and fallback model lookup per provider.

use crate::{Model, Provider};

/// The model a provider is started on.
pub fn default_model_id(provider: Provider) -> &'static str {
    match provider {
        Provider::Groq => "llama-3.3-70b-versatile",
        Provider::DeepSeek => "deepseek-chat",
        Provider::Gemini => "gemini-2.0-flash",
        Provider::OpenAI => "gpt-4o-mini",
    }
}

/// The model a provider is downgraded to after a model-not-found failure.
pub fn known_good_model_id(provider: Provider) -> &'static str {
    match provider {
        Provider::Groq => "llama-3.1-8b-instant",
        Provider::DeepSeek => "deepseek-chat",
        Provider::Gemini => "gemini-2.0-flash",
        Provider::OpenAI => "gpt-4o-mini",
    }
}

/// Build the default model for a provider.
pub fn default_model(provider: Provider) -> Model {
    Model::new(provider, default_model_id(provider))
}

/// Build a model for a provider, falling back to the default when `id` is empty.
pub fn get_model(provider: Provider, id: &str) -> Model {
    let id = id.trim();
    if id.is_empty() {
        default_model(provider)
    } else {
        Model::new(provider, id)
    }
}
