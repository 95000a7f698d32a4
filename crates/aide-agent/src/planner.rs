//! Goal decomposition into an ordered list of actions.

use aide_ai::{Message, extract_json};
use serde_json::Value;

use crate::action::Action;
use crate::brain::CommandGenerator;
use crate::prompts::PLANNER_PROMPT;

/// Ordered actions with a cursor. Consumed front to back, never rewound.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<Action>,
    pub cursor: usize,
}

impl Plan {
    pub fn new(goal: impl Into<String>, steps: Vec<Action>) -> Self {
        Self {
            goal: goal.into(),
            steps,
            cursor: 0,
        }
    }

    /// Take the next step, advancing the cursor.
    pub fn next_step(&mut self) -> Option<Action> {
        let step = self.steps.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(step)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

pub struct Planner;

impl Planner {
    /// Ask the active provider for a plan. Any failure yields an empty plan.
    pub async fn create_plan(brain: &CommandGenerator, goal: &str) -> Plan {
        let messages = vec![
            Message::system(brain.store().system_prompt()),
            Message::user(PLANNER_PROMPT.replace("{goal}", goal)),
        ];

        let text = match brain.complete_internal(&messages, true).await {
            Ok(text) => text,
            Err(failure) => {
                tracing::warn!(goal, "planning failed: {}", failure);
                return Plan::new(goal, Vec::new());
            }
        };

        let steps = match extract_json(&text) {
            Ok(value) => parse_steps(value),
            Err(e) => {
                tracing::warn!(goal, "unparseable plan: {}", e);
                Vec::new()
            }
        };
        tracing::info!(goal, steps = steps.len(), "plan created");
        Plan::new(goal, steps)
    }
}

/// Accepts `{"plan": [...]}`, `{"steps": [...]}` or a bare array.
fn parse_steps(value: Value) -> Vec<Action> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("plan").or_else(|| obj.remove("steps")) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter(Value::is_object)
        .map(Action::from_value)
        .collect()
}
