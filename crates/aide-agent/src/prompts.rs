//! Prompt text shared by the generator, the control loop and the planner.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Built-in persona flavours for the System head.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    #[default]
    Casual,
    Professional,
    Witty,
    Motivational,
}

impl Persona {
    pub fn description(&self) -> &'static str {
        match self {
            Persona::Casual => {
                "You are friendly, witty, and helpful. You keep it chill and use a bit of slang \
                 when appropriate. You have a confident, laid-back personality."
            }
            Persona::Professional => {
                "You are formal, precise, and highly professional. You avoid emojis and slang. \
                 You provide clear, concise, and structured responses."
            }
            Persona::Witty => {
                "You are clever and humorous. You enjoy a sharp observation, but you always \
                 remain helpful and efficient."
            }
            Persona::Motivational => {
                "You are encouraging and high-energy. You push the user to reach their goals \
                 and stay productive."
            }
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Persona::Casual => "casual",
            Persona::Professional => "professional",
            Persona::Witty => "witty",
            Persona::Motivational => "motivational",
        })
    }
}

impl FromStr for Persona {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "casual" => Ok(Persona::Casual),
            "professional" => Ok(Persona::Professional),
            "witty" => Ok(Persona::Witty),
            "motivational" => Ok(Persona::Motivational),
            other => Err(crate::Error::Config(format!("unknown persona '{}'", other))),
        }
    }
}

const ACTION_PROTOCOL: &str = "\
STRICT RULE: You MUST respond ONLY with a SINGLE valid JSON object. \
No preamble, no postamble, no markdown blocks, no lists. Just the object. \
For ALL conversational replies, use: {\"action\": \"reply_op\", \"content\": \"message\"}.
AVAILABLE ACTIONS:
- reply_op(content): greetings, chat and information.
- final_reply(content): the final answer of a multi-step task.
- launch_app(app_name): open applications.
- system_control(sub_action): lock, sleep, screenshot, volume_up, volume_down, mute.
- execute_command(command): run a terminal command.
- file_op(sub_action, path, content, search_text, replace_text): read, write, list, patch, delete.
- web_search_op(query): search the web.
- web_op(sub_action, url): scrape or screenshot a page.
- memory_op(sub_action, content): memorize or forget a fact about the user.
- planner_op(goal): complex, multi-step tasks or projects.
Every action may carry optional \"thought\" and \"reason\" fields.
If a task is complex, use planner_op(goal) first. Otherwise use the specific action directly.";

/// Full System head for a persona.
pub fn system_prompt(persona: Persona) -> String {
    format!(
        "You are Aide, a terminal-based personal automation assistant. {} \
         You help the user with tasks on their computer.\n{}",
        persona.description(),
        ACTION_PROTOCOL
    )
}

/// Appended once when an agent run starts.
pub const AGENT_MODE_PROMPT: &str = "You are now in AGENT MODE. Use the available tools \
step by step to solve the task. Provide a 'final_reply' only when completely finished.";

/// Sent once per generation after an unparseable response.
pub const STRICT_JSON_REASK: &str = "PREVIOUS RESPONSE FAILED JSON VALIDATION. \
YOU MUST OUTPUT RAW JSON ONLY. NO TEXT. NO MARKDOWN.";

pub const CONTINUE_PROMPT: &str =
    "Continue working on the task. Provide 'final_reply' if finished.";

pub fn blocked_prompt(reason: &str) -> String {
    format!(
        "The previous action was BLOCKED by your internal security policy. Reason: {}. \
         Please propose a safer alternative.",
        reason
    )
}

pub fn corrective_prompt(kind: &str, result: &str, steps_left: u32) -> String {
    format!(
        "The previous action '{}' failed with: {}. Please analyze the error and propose a \
         DIFFERENT approach or fix the command. You have {} steps left.",
        kind, result, steps_left
    )
}

pub const PLANNER_PROMPT: &str = "\
Break the following goal into an ordered list of concrete actions. \
Respond ONLY with a JSON object of the form {\"plan\": [action, ...]} where every \
action uses the same JSON action format you use for normal replies. \
Finish the list with a final_reply action.

GOAL: {goal}";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_includes_persona() {
        let p = system_prompt(Persona::Professional);
        assert!(p.contains("formal, precise"));
        assert!(p.contains("reply_op"));
    }

    #[test]
    fn test_persona_parse() {
        assert_eq!("Witty".parse::<Persona>().unwrap(), Persona::Witty);
        assert!("grumpy".parse::<Persona>().is_err());
        assert_eq!(Persona::default().to_string(), "casual");
    }

    #[test]
    fn test_corrective_prompt_quotes_result() {
        let p = corrective_prompt("execute_command", "[STDERR] no such file", 6);
        assert!(p.contains("'execute_command'"));
        assert!(p.contains("[STDERR] no such file"));
        assert!(p.contains("DIFFERENT approach"));
        assert!(p.contains("6 steps left"));
    }
}
