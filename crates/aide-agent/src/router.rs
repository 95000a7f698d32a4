//! Action router: dispatches an action to exactly one tool and records the
//! result in the conversation.

use aide_ai::Role;
use serde_json::{Map, Value};

use crate::action::{Action, ActionKind};
use crate::conversation::ConversationStore;
use crate::tool::ToolRegistry;

/// Which registered tool serves each wire kind, and how to name it when absent.
const ROUTES: &[(&str, &str, &str)] = &[
    ("execute_command", "executor", "Executor"),
    ("file_op", "file_manager", "File Manager"),
    ("system_control", "system_controller", "System Controller"),
    ("web_search_op", "web_search", "Web Search"),
    ("planner_op", "planner", "Planner"),
    ("launch_app", "app_launcher", "App Launcher"),
    ("browser_control", "browser", "Browser"),
    ("web_op", "web_browser", "Web Browser"),
    ("knowledge_op", "knowledge_base", "Knowledge Base"),
    ("whatsapp_op", "whatsapp", "WhatsApp"),
    ("youtube_op", "youtube", "YouTube"),
    ("task_op", "task_registry", "Task Registry"),
    ("organize_op", "organizer", "Organizer"),
    ("calendar_op", "calendar", "Calendar"),
    ("code_op", "coding_engine", "Coding Engine"),
    ("gmail_op", "gmail", "Gmail"),
    ("memory_op", "memory", "Memory"),
    ("teach_skill", "skills", "Skills"),
    ("run_skill", "skills", "Skills"),
    ("trip_planner_op", "trip_planner", "Trip Planner"),
    ("research_op", "researcher", "Researcher"),
    ("converter_op", "converter", "Converter"),
    ("sysadmin_op", "sysadmin", "Sysadmin"),
    ("pdf_op", "pdf", "PDF"),
    ("presentation_op", "presentation", "Presentation"),
    ("broadcast_op", "broadcast", "Broadcast"),
];

/// Tool name and display label for a wire kind
pub fn route_for(kind: &str) -> Option<(&'static str, &'static str)> {
    ROUTES
        .iter()
        .find(|(k, _, _)| *k == kind)
        .map(|(_, tool, label)| (*tool, *label))
}

/// Text outcome of routing one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub text: String,
}

impl ExecutionResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Whether the text contains any of the failure markers (case-insensitive).
    pub fn is_failure(&self, markers: &[String]) -> bool {
        let text = self.text.to_lowercase();
        markers
            .iter()
            .any(|m| !m.is_empty() && text.contains(&m.to_lowercase()))
    }
}

pub struct ActionRouter {
    tools: ToolRegistry,
    max_result_chars: usize,
}

impl ActionRouter {
    pub fn new(tools: ToolRegistry, max_result_chars: usize) -> Self {
        Self {
            tools,
            max_result_chars,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Dispatch `action` and, for anything but a reply, append
    /// `"[<kind>] <result>"` to the conversation as a System message.
    pub async fn route(&self, action: &Action, store: &mut ConversationStore) -> ExecutionResult {
        let kind = action.kind_name().to_string();

        let text = match &action.kind {
            // The assistant's JSON is already in history
            ActionKind::Reply { content } | ActionKind::FinalReply { content } => {
                return ExecutionResult::new(content.clone());
            }
            ActionKind::Error { reason } => format!("AI Error: {}", reason),
            ActionKind::Unknown { content, .. } => match content {
                Some(c) if !c.trim().is_empty() => c.clone(),
                _ => format!("Unknown action: {}", kind),
            },
            _ => {
                self.dispatch(&kind, action.sub_action(), &action.tool_params())
                    .await
            }
        };

        let text = truncate(&text, self.max_result_chars);
        tracing::info!(kind = %kind, chars = text.len(), "action routed");
        store.append(Role::System, format!("[{}] {}", kind, text));
        ExecutionResult::new(text)
    }

    async fn dispatch(
        &self,
        kind: &str,
        sub_action: Option<&str>,
        params: &Map<String, Value>,
    ) -> String {
        let Some((tool_name, label)) = route_for(kind) else {
            return format!("Unknown action: {}", kind);
        };
        let Some(tool) = self.tools.get(tool_name) else {
            tracing::debug!(kind, tool = tool_name, "no tool registered");
            return format!("{} module is disabled.", label);
        };
        if let Some(err) = self.tools.validate(tool_name, params) {
            tracing::warn!(kind, tool = tool_name, "invalid tool parameters");
            return format!("Invalid parameters for {}: {}", kind, err);
        }
        tracing::debug!(kind, tool = tool_name, ?sub_action, "invoking tool");
        tool.invoke(kind, sub_action, params).await
    }
}

/// Cut `text` to at most `max` characters, marking the cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...(truncated)");
    out
}
