//! Pipeline configuration
//!
//! Loaded once from TOML and passed by reference; nothing mutates it after
//! construction.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use aide_ai::{Model, Provider, models};
use serde::{Deserialize, Serialize};

use crate::distill::DistillationConfig;
use crate::error::{Error, Result};
use crate::policy::SecurityLevel;
use crate::prompts::Persona;

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "AIDE_CONFIG_PATH";

/// Default substrings that mark a tool result as failed (matched case-insensitively)
pub const DEFAULT_FAILURE_MARKERS: &[&str] = &[
    "error",
    "[stderr]",
    "failed",
    "exception",
    "traceback",
    "not recognized",
    "permission denied",
    "module is disabled",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Providers tried in order; failover only moves forward
    pub provider_chain: Vec<Provider>,
    /// Per-provider model override, keyed by provider id
    pub models: HashMap<String, String>,
    /// Per-provider API keys, keyed by provider id; rotated on auth failure
    pub api_keys: HashMap<String, Vec<String>>,
    pub security_level: SecurityLevel,
    /// Upper bound on provider attempts per generation
    pub max_attempts: u32,
    /// Backoff before retrying an unclassified failure
    pub retry_delay_ms: u64,
    /// Maximum agent loop steps
    pub step_ceiling: u32,
    pub distillation: DistillationConfig,
    pub failure_markers: Vec<String>,
    /// Tool results are cut to this many characters before entering history
    pub max_result_chars: usize,
    pub persona: Persona,
    /// Replaces the persona prompt entirely when set
    pub system_prompt: Option<String>,
    /// Sampling temperature for action generation
    pub temperature: Option<f32>,
    /// JSON file backing long-term memory
    pub memory_path: Option<PathBuf>,
    /// Memory snippets injected into each request
    pub memory_results: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider_chain: Provider::ALL.to_vec(),
            models: HashMap::new(),
            api_keys: HashMap::new(),
            security_level: SecurityLevel::default(),
            max_attempts: 5,
            retry_delay_ms: 1000,
            step_ceiling: 10,
            distillation: DistillationConfig::default(),
            failure_markers: DEFAULT_FAILURE_MARKERS.iter().map(|s| s.to_string()).collect(),
            max_result_chars: 2000,
            persona: Persona::default(),
            system_prompt: None,
            temperature: None,
            memory_path: None,
            memory_results: 3,
        }
    }
}

impl PipelineConfig {
    /// Default config directory (`<config_dir>/aide`)
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aide")
    }

    /// Config file location, honouring `AIDE_CONFIG_PATH`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Default location of the long-term memory file
    pub fn default_memory_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aide")
            .join("memory.json")
    }

    /// Load from `path`, or from [`Self::config_path`] when `None`.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.provider_chain.is_empty() {
            return Err(Error::Config("provider_chain must not be empty".into()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        if self.step_ceiling == 0 {
            return Err(Error::Config("step_ceiling must be at least 1".into()));
        }
        Ok(())
    }

    /// Model a provider starts on
    pub fn model_for(&self, provider: Provider) -> Model {
        match self.models.get(provider.id()) {
            Some(id) => models::get_model(provider, id),
            None => models::default_model(provider),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Ordered API keys per provider.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    keys: HashMap<Provider, Vec<String>>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys from the config, falling back to the provider's environment variables.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::from_config_with(config, |var| std::env::var(var).ok())
    }

    /// Like [`Self::from_config`] with a custom environment lookup.
    pub fn from_config_with(
        config: &PipelineConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut ring = Self::new();
        for provider in Provider::ALL {
            let mut keys: Vec<String> = config
                .api_keys
                .get(provider.id())
                .map(|ks| ks.iter().filter(|k| !k.trim().is_empty()).cloned().collect())
                .unwrap_or_default();
            if keys.is_empty() {
                keys = provider
                    .api_key_env_vars()
                    .iter()
                    .filter_map(|var| env(*var))
                    .filter(|k| !k.trim().is_empty())
                    .take(1)
                    .collect();
            }
            if !keys.is_empty() {
                ring.keys.insert(provider, keys);
            }
        }
        ring
    }

    pub fn with_keys(mut self, provider: Provider, keys: Vec<String>) -> Self {
        self.keys.insert(provider, keys);
        self
    }

    pub fn get(&self, provider: Provider, index: usize) -> Option<&str> {
        self.keys
            .get(&provider)
            .and_then(|ks| ks.get(index))
            .map(String::as_str)
    }

    pub fn count(&self, provider: Provider) -> usize {
        self.keys.get(&provider).map_or(0, Vec::len)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# aide configuration file
# Place at ~/.config/aide/config.toml or point AIDE_CONFIG_PATH at it

# Providers tried in order; failover never moves backwards within a session
provider_chain = ["groq", "deepseek", "gemini", "openai"]

# low | medium | high
security_level = "medium"

# casual | professional | witty | motivational
persona = "casual"

max_attempts = 5
retry_delay_ms = 1000
step_ceiling = 10
max_result_chars = 2000

[distillation]
enabled = true
threshold = 20
keep_recent = 8
# max_tokens = 6000

[models]
# groq = "llama-3.3-70b-versatile"

# API keys (optional - environment variables are used otherwise)
[api_keys]
# groq = ["gsk_...", "gsk_..."]
"#
}
