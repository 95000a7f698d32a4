//! Memory tool: lets the assistant memorize, recall and forget facts

use std::sync::Arc;

use aide_agent::{MemoryStore, Tool};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::str_param;

pub struct MemoryTool {
    store: Arc<dyn MemoryStore>,
}

impl MemoryTool {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Long-term memory (memory_op): memorize a fact, recall by query, or forget matching facts."
    }

    async fn invoke(&self, _kind: &str, sub_action: Option<&str>, params: &Map<String, Value>) -> String {
        let text = str_param(params, &["content", "text", "fact", "query"]).unwrap_or_default();
        let sub_action = sub_action.unwrap_or("memorize");
        if text.trim().is_empty() {
            return format!("Error: '{}' needs some text", sub_action);
        }

        match sub_action {
            "memorize" | "remember" | "store" | "save" => {
                match self.store.store(text, json!({"type": "user_fact"})).await {
                    Ok(()) => format!("Memorized: {}", text),
                    Err(e) => format!("Error: failed to memorize: {}", e),
                }
            }
            "recall" | "search" => match self.store.search(text, 5).await {
                Ok(hits) if hits.is_empty() => "No matching memories.".to_string(),
                Ok(hits) => hits
                    .iter()
                    .map(|h| format!("- {}", h))
                    .collect::<Vec<_>>()
                    .join("\n"),
                Err(e) => format!("Error: memory search failed: {}", e),
            },
            "forget" => match self.store.forget(text).await {
                Ok(n) => format!("Forgot {} memories matching '{}'.", n, text),
                Err(e) => format!("Error: failed to forget: {}", e),
            },
            other => format!("Error: unknown memory operation '{}'", other),
        }
    }
}
