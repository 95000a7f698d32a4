//! The structured action produced by the command generator.
//!
//! Parsing is total: whatever JSON the backend returned, [`Action::from_value`]
//! yields an `Action`. Unrecognized kinds become [`ActionKind::Unknown`],
//! arrays collapse to their first object, and bare scalars become replies.

use serde_json::{Map, Value};

/// Capability kinds dispatched to an external tool under their own name.
pub const TOOL_KINDS: &[&str] = &[
    "launch_app",
    "browser_control",
    "web_op",
    "knowledge_op",
    "whatsapp_op",
    "youtube_op",
    "task_op",
    "organize_op",
    "calendar_op",
    "code_op",
    "gmail_op",
    "memory_op",
    "teach_skill",
    "run_skill",
    "trip_planner_op",
    "research_op",
    "converter_op",
    "sysadmin_op",
    "pdf_op",
    "presentation_op",
    "broadcast_op",
];

/// Keys that describe the action itself rather than its parameters.
const RESERVED_KEYS: &[&str] = &[
    "action",
    "kind",
    "thought",
    "reason",
    "is_dangerous",
    "sub_action",
    "params",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOpKind {
    Read,
    Write,
    List,
    Patch,
    Delete,
    Other(String),
}

impl FileOpKind {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "read" => FileOpKind::Read,
            "write" | "create" => FileOpKind::Write,
            "list" | "ls" => FileOpKind::List,
            "patch" | "edit" => FileOpKind::Patch,
            "delete" | "remove" => FileOpKind::Delete,
            other => FileOpKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FileOpKind::Read => "read",
            FileOpKind::Write => "write",
            FileOpKind::List => "list",
            FileOpKind::Patch => "patch",
            FileOpKind::Delete => "delete",
            FileOpKind::Other(s) => s,
        }
    }

    /// Whether this operation can change the filesystem
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            FileOpKind::Write | FileOpKind::Patch | FileOpKind::Delete
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Reply {
        content: String,
    },
    FinalReply {
        content: String,
    },
    SystemControl {
        sub_action: String,
        params: Map<String, Value>,
    },
    Execute {
        command: String,
    },
    FileOp {
        sub_action: FileOpKind,
        path: Option<String>,
        content: Option<String>,
        search_text: Option<String>,
        replace_text: Option<String>,
    },
    Search {
        query: String,
    },
    Plan {
        goal: String,
    },
    /// A capability module identified by its wire kind (`launch_app`, `gmail_op`, ...)
    ToolOp {
        kind: String,
        sub_action: Option<String>,
        params: Map<String, Value>,
    },
    Error {
        reason: String,
    },
    Unknown {
        kind: String,
        content: Option<String>,
        params: Map<String, Value>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub thought: Option<String>,
    pub reason: Option<String>,
    pub is_dangerous: bool,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            thought: None,
            reason: None,
            is_dangerous: false,
        }
    }

    pub fn reply(content: impl Into<String>) -> Self {
        Self::new(ActionKind::Reply {
            content: content.into(),
        })
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(ActionKind::Error {
            reason: reason.into(),
        })
    }

    /// Normalize any JSON value into an action.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(obj) => Self::from_object(obj),
            Value::Array(items) => {
                let first_object = items.iter().find(|v| v.is_object()).cloned();
                match first_object {
                    Some(obj) => Self::from_value(obj),
                    None => Self::reply(Value::Array(items).to_string()),
                }
            }
            Value::String(s) => Self::reply(s),
            Value::Null => Self::reply(""),
            other => Self::reply(other.to_string()),
        }
    }

    fn from_object(obj: Map<String, Value>) -> Self {
        let thought = str_field(&obj, &["thought"]);
        let reason = str_field(&obj, &["reason"]);
        let is_dangerous = match obj.get("is_dangerous") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };

        let kind_name = str_field(&obj, &["action", "kind"])
            .map(|k| k.trim().to_lowercase())
            .unwrap_or_default();

        let kind = match kind_name.as_str() {
            "reply_op" | "reply" => ActionKind::Reply {
                content: content_of(&obj).unwrap_or_default(),
            },
            "final_reply" | "final_answer" => ActionKind::FinalReply {
                content: content_of(&obj).unwrap_or_default(),
            },
            "system_control" => ActionKind::SystemControl {
                sub_action: str_field(&obj, &["sub_action"]).unwrap_or_default(),
                params: params_of(&obj),
            },
            "execute_command" | "execute" => {
                match str_field(&obj, &["command", "cmd"]) {
                    Some(command) => ActionKind::Execute { command },
                    None => unknown(kind_name.clone(), &obj),
                }
            }
            "file_op" => ActionKind::FileOp {
                sub_action: FileOpKind::parse(
                    &str_field(&obj, &["sub_action"]).unwrap_or_else(|| "read".to_string()),
                ),
                path: str_field(&obj, &["path", "file_path"]),
                content: str_field(&obj, &["content"]),
                search_text: str_field(&obj, &["search_text"]),
                replace_text: str_field(&obj, &["replace_text"]),
            },
            "web_search_op" | "search" => ActionKind::Search {
                query: str_field(&obj, &["query", "content"]).unwrap_or_default(),
            },
            "planner_op" => ActionKind::Plan {
                goal: str_field(&obj, &["goal", "task", "query", "content"]).unwrap_or_default(),
            },
            "error" => ActionKind::Error {
                reason: str_field(&obj, &["reason", "message", "content"])
                    .unwrap_or_else(|| "unspecified error".to_string()),
            },
            k if TOOL_KINDS.contains(&k) => ActionKind::ToolOp {
                kind: kind_name.clone(),
                sub_action: str_field(&obj, &["sub_action"]),
                params: params_of(&obj),
            },
            "" => match content_of(&obj) {
                Some(content) => ActionKind::Reply { content },
                None => unknown(kind_name.clone(), &obj),
            },
            _ => unknown(kind_name.clone(), &obj),
        };

        Self {
            kind,
            thought,
            reason,
            is_dangerous,
        }
    }

    /// Wire name of this action's kind
    pub fn kind_name(&self) -> &str {
        match &self.kind {
            ActionKind::Reply { .. } => "reply_op",
            ActionKind::FinalReply { .. } => "final_reply",
            ActionKind::SystemControl { .. } => "system_control",
            ActionKind::Execute { .. } => "execute_command",
            ActionKind::FileOp { .. } => "file_op",
            ActionKind::Search { .. } => "web_search_op",
            ActionKind::Plan { .. } => "planner_op",
            ActionKind::ToolOp { kind, .. } => kind,
            ActionKind::Error { .. } => "error",
            ActionKind::Unknown { kind, .. } if kind.is_empty() => "unknown",
            ActionKind::Unknown { kind, .. } => kind,
        }
    }

    /// Whether this action ends an agent run
    pub fn is_final(&self) -> bool {
        matches!(self.kind, ActionKind::FinalReply { .. })
    }

    pub fn is_reply(&self) -> bool {
        matches!(
            self.kind,
            ActionKind::Reply { .. } | ActionKind::FinalReply { .. }
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, ActionKind::Error { .. })
    }

    /// Flat parameter object handed to a tool.
    pub fn tool_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        match &self.kind {
            ActionKind::Execute { command } => {
                params.insert("command".into(), Value::String(command.clone()));
            }
            ActionKind::FileOp {
                path,
                content,
                search_text,
                replace_text,
                ..
            } => {
                for (key, value) in [
                    ("path", path),
                    ("content", content),
                    ("search_text", search_text),
                    ("replace_text", replace_text),
                ] {
                    if let Some(v) = value {
                        params.insert(key.into(), Value::String(v.clone()));
                    }
                }
            }
            ActionKind::Search { query } => {
                params.insert("query".into(), Value::String(query.clone()));
            }
            ActionKind::Plan { goal } => {
                params.insert("goal".into(), Value::String(goal.clone()));
            }
            ActionKind::SystemControl { params: p, .. }
            | ActionKind::ToolOp { params: p, .. }
            | ActionKind::Unknown { params: p, .. } => params = p.clone(),
            ActionKind::Reply { .. } | ActionKind::FinalReply { .. } | ActionKind::Error { .. } => {}
        }
        params
    }

    /// Sub-action string, if the kind carries one
    pub fn sub_action(&self) -> Option<&str> {
        match &self.kind {
            ActionKind::SystemControl { sub_action, .. } => Some(sub_action),
            ActionKind::FileOp { sub_action, .. } => Some(sub_action.as_str()),
            ActionKind::ToolOp { sub_action, .. } => sub_action.as_deref(),
            _ => None,
        }
    }
}

fn unknown(kind: String, obj: &Map<String, Value>) -> ActionKind {
    ActionKind::Unknown {
        kind,
        content: content_of(obj),
        params: params_of(obj),
    }
}

fn str_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    })
}

fn content_of(obj: &Map<String, Value>) -> Option<String> {
    str_field(obj, &["content", "message", "text", "response"])
}

/// Everything except the reserved keys, with a nested `params` object merged in.
fn params_of(obj: &Map<String, Value>) -> Map<String, Value> {
    let mut params: Map<String, Value> = obj
        .iter()
        .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if let Some(Value::Object(nested)) = obj.get("params") {
        for (k, v) in nested {
            params.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
    params
}
