//! Command generator: turns an utterance into one normalized action.
//!
//! Owns the conversation store and the provider failover state. Every call
//! to [`CommandGenerator::generate`] returns an [`Action`]; exhausted budgets
//! surface as an `Error` action rather than an `Err`.

use std::sync::Arc;
use std::time::Duration;

use aide_ai::{FailureKind, Message, Model, Provider, ProviderRegistry, Role, models};
use serde_json::json;
use tokio::sync::broadcast;

use crate::action::Action;
use crate::config::{KeyRing, PipelineConfig};
use crate::conversation::ConversationStore;
use crate::distill;
use crate::events::PipelineEvent;
use crate::gateway::{ProviderFailure, ProviderGateway};
use crate::memory::MemoryStore;
use crate::prompts::STRICT_JSON_REASK;

/// Queries too small to be worth a memory lookup
const TRIVIAL_QUERIES: &[&str] = &[
    "hey",
    "hello",
    "hi",
    "hey buddy",
    "yo",
    "are you there",
    "thanks",
    "thank you",
];

/// Upper bound on a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Which backend the generator is currently talking to.
///
/// Only failure handling mutates this, and `chain_pos` never decreases.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderState {
    pub active_provider: Provider,
    pub active_model: Model,
    pub key_index: usize,
    pub chain: Vec<Provider>,
    pub chain_pos: usize,
    pub model_downgraded: bool,
}

impl ProviderState {
    pub fn new(config: &PipelineConfig) -> Self {
        let chain = config.provider_chain.clone();
        let first = chain.first().copied().unwrap_or(Provider::ALL[0]);
        Self {
            active_provider: first,
            active_model: config.model_for(first),
            key_index: 0,
            chain,
            chain_pos: 0,
            model_downgraded: false,
        }
    }

    /// Move to the next provider in the chain. Returns `false` at the end.
    fn advance(&mut self, config: &PipelineConfig) -> bool {
        if self.chain_pos + 1 >= self.chain.len() {
            return false;
        }
        self.chain_pos += 1;
        self.active_provider = self.chain[self.chain_pos];
        self.active_model = config.model_for(self.active_provider);
        self.key_index = 0;
        self.model_downgraded = false;
        true
    }

    pub fn is_last(&self) -> bool {
        self.chain_pos + 1 >= self.chain.len()
    }
}

/// Exponential backoff from `base`, capped.
pub fn delay_for_attempt(base: Duration, attempt: u32) -> Duration {
    let factor = 2f64.powi(attempt.saturating_sub(1).min(16) as i32);
    Duration::from_secs_f64((base.as_secs_f64() * factor).min(MAX_BACKOFF.as_secs_f64()))
}

pub struct CommandGenerator {
    store: ConversationStore,
    state: ProviderState,
    config: Arc<PipelineConfig>,
    providers: ProviderRegistry,
    keys: KeyRing,
    memory: Option<Arc<dyn MemoryStore>>,
    notes: Vec<String>,
    event_tx: broadcast::Sender<PipelineEvent>,
}

impl CommandGenerator {
    pub fn new(
        config: Arc<PipelineConfig>,
        providers: ProviderRegistry,
        keys: KeyRing,
        system_prompt: impl Into<String>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            store: ConversationStore::new(system_prompt),
            state: ProviderState::new(&config),
            config,
            providers,
            keys,
            memory: None,
            notes: Vec::new(),
            event_tx,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Share an event channel instead of the generator's own.
    pub fn with_events(mut self, event_tx: broadcast::Sender<PipelineEvent>) -> Self {
        self.event_tx = event_tx;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_tx.subscribe()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    pub fn state(&self) -> &ProviderState {
        &self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn memory(&self) -> Option<&Arc<dyn MemoryStore>> {
        self.memory.as_ref()
    }

    /// Caller-provided notes (available tools, skills) added to every request.
    pub fn set_context_notes(&mut self, notes: Vec<String>) {
        self.notes = notes;
    }

    pub(crate) fn emit(&self, event: PipelineEvent) {
        let _ = self.event_tx.send(event);
    }

    fn emit_switch(&self) {
        self.emit(PipelineEvent::ProviderSwitch {
            provider: self.state.active_provider,
            model: self.state.active_model.id.clone(),
            key_index: self.state.key_index,
        });
    }

    fn advance_provider(&mut self, why: &str) -> bool {
        let from = self.state.active_provider;
        if !self.state.advance(&self.config) {
            tracing::warn!(provider = %from, why, "failover chain exhausted");
            return false;
        }
        tracing::info!(
            from = %from,
            to = %self.state.active_provider,
            model = %self.state.active_model.id,
            why,
            "switching provider"
        );
        self.emit_switch();
        true
    }

    /// Produce the next action for `utterance`.
    pub async fn generate(&mut self, utterance: &str) -> Action {
        self.store.append(Role::User, utterance);
        self.maybe_distill().await;

        let context_note = self.build_context(utterance).await;
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts: u32 = 0;
        let mut reasked = false;
        let mut reask: Option<Message> = None;
        let mut last_failure: Option<ProviderFailure> = None;

        while attempts < max_attempts {
            let provider = self.state.active_provider;
            let client = self.providers.get(provider);
            let api_key = self
                .keys
                .get(provider, self.state.key_index)
                .map(str::to_string);

            // Unusable provider: skip it without spending an attempt
            let (Some(client), Some(api_key)) = (client, api_key) else {
                tracing::debug!(provider = %provider, "no API key or client, skipping");
                if self.advance_provider("missing credentials") {
                    continue;
                }
                let reason = match last_failure {
                    Some(f) => format!("No usable provider left. Last error: {}", f),
                    None => "No API key configured for any provider in the chain.".to_string(),
                };
                return Action::error(reason);
            };

            attempts += 1;
            let messages = self.request_messages(context_note.as_deref(), reask.as_ref());
            tracing::debug!(
                provider = %provider,
                model = %self.state.active_model.id,
                attempt = attempts,
                messages = messages.len(),
                "requesting action"
            );

            let result = ProviderGateway::new(client, &self.state.active_model, &api_key)
                .with_temperature(self.config.temperature)
                .send(&messages)
                .await;

            let failure = match result {
                Ok(reply) => {
                    self.store.append(Role::Assistant, reply.raw);
                    let action = Action::from_value(reply.value);
                    self.emit(PipelineEvent::ActionGenerated {
                        kind: action.kind_name().to_string(),
                    });
                    return action;
                }
                Err(failure) => failure,
            };

            tracing::warn!(
                provider = %provider,
                kind = %failure.kind,
                attempt = attempts,
                "provider failure: {}",
                failure.message
            );
            self.emit(PipelineEvent::ProviderFailure {
                provider,
                kind: failure.kind,
                message: failure.message.clone(),
            });

            let exhausted = attempts >= max_attempts;
            match failure.kind {
                FailureKind::MalformedResponse if !reasked => {
                    reasked = true;
                    reask = Some(Message::user(STRICT_JSON_REASK));
                }
                FailureKind::MalformedResponse | FailureKind::Unknown => {
                    if !exhausted {
                        tokio::time::sleep(delay_for_attempt(self.config.retry_delay(), attempts))
                            .await;
                    }
                }
                FailureKind::RateLimited => {
                    // Nowhere left to go: wait it out on the last provider
                    if !self.advance_provider("rate limited") && !exhausted {
                        tokio::time::sleep(delay_for_attempt(self.config.retry_delay(), attempts))
                            .await;
                    }
                }
                FailureKind::AuthFailure => {
                    if self.state.key_index + 1 < self.keys.count(provider) {
                        self.state.key_index += 1;
                        tracing::info!(provider = %provider, key_index = self.state.key_index, "rotating API key");
                        self.emit_switch();
                    } else {
                        self.state.key_index = 0;
                        if !self.advance_provider("authentication failed") {
                            last_failure = Some(failure);
                            break;
                        }
                    }
                }
                FailureKind::ModelNotFound => {
                    let fallback = models::known_good_model_id(provider);
                    if !self.state.model_downgraded && self.state.active_model.id != fallback {
                        self.state.model_downgraded = true;
                        self.state.active_model = models::get_model(provider, fallback);
                        tracing::info!(provider = %provider, model = fallback, "downgrading model");
                        self.emit_switch();
                    } else if !self.advance_provider("model not found") {
                        last_failure = Some(failure);
                        break;
                    }
                }
            }
            // The strict re-ask belongs to the provider that misbehaved
            if self.state.active_provider != provider {
                reask = None;
            }
            last_failure = Some(failure);
        }

        let last = last_failure
            .map(|f| f.to_string())
            .unwrap_or_else(|| "none".to_string());
        Action::error(format!(
            "All providers failed after {} attempts. Last error: {}",
            attempts, last
        ))
    }

    /// Full history plus ephemeral extras; nothing here is stored.
    fn request_messages(&self, context_note: Option<&str>, reask: Option<&Message>) -> Vec<Message> {
        let mut messages = self.store.messages().to_vec();
        if let Some(note) = context_note {
            let at = messages
                .iter()
                .rposition(|m| m.role == Role::User)
                .unwrap_or(messages.len());
            messages.insert(at, Message::system(note));
        }
        if let Some(reask) = reask {
            messages.push(reask.clone());
        }
        messages
    }

    async fn build_context(&self, query: &str) -> Option<String> {
        let mut sections = Vec::new();

        if !is_trivial(query) {
            if let Some(memory) = &self.memory {
                match memory.search(query, self.config.memory_results).await {
                    Ok(hits) if !hits.is_empty() => {
                        let lines: Vec<String> = hits.iter().map(|h| format!("- {}", h)).collect();
                        sections.push(format!("[MEMORY]\n{}", lines.join("\n")));
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("memory search failed: {}", e),
                }
            }
        }
        if !self.notes.is_empty() {
            sections.push(format!("[SKILLS]\n{}", self.notes.join("\n")));
        }

        if sections.is_empty() {
            return None;
        }
        Some(sanitize(&format!(
            "[ADDITIONAL CONTEXT]\n{}\n[END CONTEXT]\nUse this context to answer the user, but DO NOT output it.",
            sections.join("\n\n")
        )))
    }

    /// Summarize and trim history when it has outgrown its bounds.
    ///
    /// Never fatal: a failed summary request leaves history as it was.
    pub async fn maybe_distill(&mut self) {
        let Some(reason) = self.store.needs_distillation(&self.config.distillation) else {
            return;
        };
        tracing::info!(?reason, messages = self.store.len(), "distilling conversation");

        let request = distill::summary_request(self.store.messages());
        let summary = match self.complete_internal(&request, false).await {
            Ok(summary) => summary,
            Err(failure) => {
                tracing::warn!("distillation skipped: {}", failure);
                return;
            }
        };

        if let Some(memory) = &self.memory {
            let text = format!("Distilled Context: {}", summary.trim());
            if let Err(e) = memory
                .store(&text, json!({"type": "distillation", "reason": reason}))
                .await
            {
                tracing::warn!("failed to persist distilled context: {}", e);
            }
        }

        let before = self.store.len();
        self.store
            .apply_distillation(&summary, self.config.distillation.keep_recent);
        self.emit(PipelineEvent::Distilled {
            messages_before: before,
            messages_after: self.store.len(),
        });
    }

    /// One attempt on the active provider for an internal request
    /// (summaries, plans). History is not touched.
    pub async fn complete_internal(
        &self,
        messages: &[Message],
        json_mode: bool,
    ) -> Result<String, ProviderFailure> {
        let provider = self.state.active_provider;
        let (Some(client), Some(api_key)) = (
            self.providers.get(provider),
            self.keys.get(provider, self.state.key_index),
        ) else {
            return Err(ProviderFailure {
                kind: FailureKind::AuthFailure,
                message: format!("no API key configured for {}", provider.name()),
            });
        };
        ProviderGateway::new(client, &self.state.active_model, api_key)
            .with_temperature(self.config.temperature)
            .send_text(messages, json_mode)
            .await
    }
}

fn is_trivial(query: &str) -> bool {
    let q = query
        .trim()
        .trim_matches(|c: char| matches!(c, '?' | '!' | '.'))
        .to_lowercase();
    q.chars().count() < 3 || TRIVIAL_QUERIES.contains(&q.as_str())
}

/// Drop control characters other than newlines and tabs.
fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}
