//! Ordered conversation log with a distillation hook.

use aide_ai::{Message, Role};

use crate::distill::{self, DistillationConfig, DistillationReason};

/// Header marking the synthetic summary that replaces distilled history.
pub const DISTILLED_HEADER: &str = "[DISTILLED CONTEXT FROM PREVIOUS CHATS]";

/// The hot conversation window for one session.
///
/// Index 0 is always the System head. Sequence indices are assigned here,
/// strictly increasing and never reused, including across distillations.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    messages: Vec<Message>,
    next_index: u64,
    distillations: u32,
}

impl ConversationStore {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt).with_sequence(0)],
            next_index: 1,
            distillations: 0,
        }
    }

    /// Append a message and return its sequence index.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        self.messages
            .push(Message::new(role, content).with_sequence(index));
        index
    }

    /// Swap the System head in place (persona switch).
    pub fn replace_system(&mut self, content: impl Into<String>) {
        let seq = self.messages[0].sequence_index;
        self.messages[0] = Message::system(content).with_sequence(seq);
    }

    pub fn system_prompt(&self) -> &str {
        &self.messages[0].content
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        // The head is never removed
        false
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of distillations applied so far
    pub fn distillations(&self) -> u32 {
        self.distillations
    }

    /// Whether the window has outgrown the configured bounds.
    pub fn needs_distillation(&self, config: &DistillationConfig) -> Option<DistillationReason> {
        if !config.enabled {
            return None;
        }
        // Nothing would be discarded
        if self.messages.len() <= 1 + config.keep_recent {
            return None;
        }
        if self.messages.len() > config.threshold {
            return Some(DistillationReason::Threshold);
        }
        if let Some(budget) = config.max_tokens {
            if distill::estimate_total_tokens(&self.messages) > budget {
                return Some(DistillationReason::TokenBudget);
            }
        }
        None
    }

    /// Replace everything between the head and the last `keep_recent`
    /// messages with a single System summary at index 1.
    ///
    /// Returns the number of messages discarded.
    pub fn apply_distillation(&mut self, summary: &str, keep_recent: usize) -> usize {
        let len = self.messages.len();
        if len <= 1 + keep_recent {
            return 0;
        }
        let first_kept = len - keep_recent;
        let discarded = first_kept - 1;

        let recent = self.messages.split_off(first_kept);
        self.messages.truncate(1);

        let index = self.next_index;
        self.next_index += 1;
        self.messages.push(
            Message::system(format!("{}\n{}", DISTILLED_HEADER, summary.trim())).with_sequence(index),
        );
        self.messages.extend(recent);
        self.distillations += 1;

        tracing::debug!(discarded, kept = keep_recent, "conversation distilled");
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(n: usize) -> ConversationStore {
        let mut store = ConversationStore::new("system");
        for i in 0..n {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            store.append(role, format!("msg {}", i));
        }
        store
    }

    #[test]
    fn test_sequence_indices_strictly_increase() {
        let store = store_with(5);
        let seqs: Vec<u64> = store.messages().iter().map(|m| m.sequence_index).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_replace_system_in_place() {
        let mut store = store_with(2);
        store.replace_system("new persona");
        assert_eq!(store.len(), 3);
        assert!(store.messages()[0].is_system());
        assert_eq!(store.system_prompt(), "new persona");
    }

    #[test]
    fn test_needs_distillation_threshold() {
        let config = DistillationConfig::default();
        assert!(store_with(19).needs_distillation(&config).is_none());
        assert_eq!(
            store_with(20).needs_distillation(&config),
            Some(DistillationReason::Threshold)
        );

        let disabled = DistillationConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(store_with(40).needs_distillation(&disabled).is_none());
    }

    #[test]
    fn test_needs_distillation_token_budget() {
        let config = DistillationConfig {
            threshold: 100,
            keep_recent: 2,
            max_tokens: Some(10),
            ..Default::default()
        };
        let mut store = ConversationStore::new("s");
        store.append(Role::User, "x".repeat(30));
        store.append(Role::Assistant, "y".repeat(30));
        assert!(store.needs_distillation(&config).is_none());
        store.append(Role::User, "z".repeat(30));
        assert_eq!(
            store.needs_distillation(&config),
            Some(DistillationReason::TokenBudget)
        );
    }

    #[test]
    fn test_apply_distillation_ordering() {
        // 1 head + 24 appended = 25 messages
        let mut store = store_with(24);
        let before: Vec<u64> = store.messages().iter().map(|m| m.sequence_index).collect();

        let discarded = store.apply_distillation("- user likes rust", 8);
        assert_eq!(discarded, 16);
        assert!(store.len() <= 2 + 8);
        assert!(store.messages()[0].is_system());
        assert!(store.messages()[1].is_system());
        assert!(store.messages()[1].content.starts_with(DISTILLED_HEADER));

        let newest_discarded = before[16];
        for kept in &store.messages()[2..] {
            assert!(kept.sequence_index > newest_discarded);
        }
        assert_eq!(store.messages().last().map(|m| m.content.as_str()), Some("msg 23"));
    }

    #[test]
    fn test_summary_index_never_reused() {
        let mut store = store_with(24);
        store.apply_distillation("first", 8);
        let summary_seq = store.messages()[1].sequence_index;
        let next = store.append(Role::User, "after");
        assert!(next > summary_seq);
        assert_eq!(store.distillations(), 1);
    }

    #[test]
    fn test_apply_distillation_noop_when_short() {
        let mut store = store_with(4);
        assert_eq!(store.apply_distillation("summary", 8), 0);
        assert_eq!(store.len(), 5);
    }
}
