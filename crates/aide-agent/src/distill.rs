//! Distillation of long conversation history
//!
//! When the window outgrows its bounds, older messages are summarized by the
//! backend and replaced with one synthetic System message (see
//! [`crate::conversation::ConversationStore::apply_distillation`]).

use aide_ai::{Message, Role};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistillationConfig {
    pub enabled: bool,
    /// Distill once the window holds more than this many messages
    pub threshold: usize,
    /// Most recent messages kept verbatim
    pub keep_recent: usize,
    /// Optional estimated-token budget that also triggers distillation
    pub max_tokens: Option<u32>,
}

impl Default for DistillationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 20,
            keep_recent: 8,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistillationReason {
    /// Message count exceeded
    Threshold,
    /// Estimated tokens exceeded
    TokenBudget,
}

/// Estimate token count for a single message (chars/4 heuristic)
pub fn estimate_tokens(message: &Message) -> u32 {
    (message.content.len() / 4) as u32
}

pub fn estimate_total_tokens(messages: &[Message]) -> u32 {
    messages.iter().map(estimate_tokens).sum()
}

const SUMMARY_SYSTEM_PROMPT: &str = "\
You are a summarization model. Your summary replaces older messages of an \
assistant conversation, so it must keep every fact needed to continue it.";

const SUMMARY_PROMPT: &str = "\
Summarize the conversation so far in a few bullet points. Focus on:
1. Discovered facts about the user.
2. Current project status.
3. Decisions made.
KEEP IT CONCISE AND IN THIRD PERSON.

<conversation>
{conversation}
</conversation>";

/// Cap on any single message in the summary transcript
const MAX_MESSAGE_CHARS: usize = 2000;

/// Render messages as a plain transcript so the backend summarizes rather
/// than continues the conversation.
fn serialize_for_summary(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        let text = msg.content.trim();
        if text.is_empty() {
            continue;
        }
        let label = match msg.role {
            Role::User => "[User]: ",
            Role::Assistant => "[Assistant]: ",
            Role::System => "[System]: ",
        };
        out.push_str(label);
        if text.chars().count() > MAX_MESSAGE_CHARS {
            out.extend(text.chars().take(MAX_MESSAGE_CHARS));
            out.push_str("...(truncated)");
        } else {
            out.push_str(text);
        }
        out.push('\n');
    }
    out
}

/// Build the one-off request asking for a summary of everything after the head.
pub fn summary_request(messages: &[Message]) -> Vec<Message> {
    let history = messages.get(1..).unwrap_or_default();
    vec![
        Message::system(SUMMARY_SYSTEM_PROMPT),
        Message::user(SUMMARY_PROMPT.replace("{conversation}", &serialize_for_summary(history))),
    ]
}
