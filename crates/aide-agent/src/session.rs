//! Session: one user's pipeline, wired together.

use std::sync::Arc;

use aide_ai::ProviderRegistry;
use tokio::sync::broadcast;

use crate::action::Action;
use crate::brain::CommandGenerator;
use crate::config::{KeyRing, PipelineConfig};
use crate::control_loop::{ControlLoop, LoopReport, StepOutcome};
use crate::conversation::ConversationStore;
use crate::events::PipelineEvent;
use crate::handle::SessionHandle;
use crate::memory::MemoryStore;
use crate::policy::{PolicyGate, SecurityLevel};
use crate::prompts::{self, Persona};
use crate::router::ActionRouter;
use crate::tool::ToolRegistry;

/// What a single turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutput {
    pub action: Action,
    /// Reply content or tool result
    pub text: String,
    pub blocked: bool,
}

pub struct Session {
    brain: CommandGenerator,
    router: ActionRouter,
    gate: PolicyGate,
    handle: SessionHandle,
}

impl Session {
    pub fn new(
        config: PipelineConfig,
        providers: ProviderRegistry,
        keys: KeyRing,
        tools: ToolRegistry,
    ) -> Self {
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| prompts::system_prompt(config.persona));
        let gate = PolicyGate::new(config.security_level);
        let router = ActionRouter::new(tools, config.max_result_chars);

        let mut brain = CommandGenerator::new(Arc::new(config), providers, keys, system_prompt);
        if !router.tools().is_empty() {
            brain.set_context_notes(vec![format!(
                "Available tools:\n{}",
                router.tools().describe()
            )]);
        }

        Self {
            brain,
            router,
            gate,
            handle: SessionHandle::new(),
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.brain = self.brain.with_memory(memory);
        self
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.brain.subscribe()
    }

    pub fn brain(&self) -> &CommandGenerator {
        &self.brain
    }

    pub fn store(&self) -> &ConversationStore {
        self.brain.store()
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.gate.level
    }

    pub fn set_security_level(&mut self, level: SecurityLevel) {
        tracing::info!(%level, "security level changed");
        self.gate = PolicyGate::new(level);
    }

    /// Swap the persona prompt at the head of the conversation.
    pub fn switch_persona(&mut self, persona: Persona) {
        tracing::info!(%persona, "switching persona");
        self.brain
            .store_mut()
            .replace_system(prompts::system_prompt(persona));
    }

    /// One-turn mode: generate, gate and route a single action.
    pub async fn handle_utterance(&mut self, utterance: &str) -> TurnOutput {
        let action = self.brain.generate(utterance).await;
        let token = self.handle.begin();
        let outcome = ControlLoop::new(&mut self.brain, &self.router, self.gate, token)
            .execute(&action)
            .await;
        self.handle.end();
        match outcome {
            StepOutcome::Blocked(reason) => TurnOutput {
                action,
                text: format!("Action blocked: {}", reason),
                blocked: true,
            },
            StepOutcome::Routed(result) => TurnOutput {
                action,
                text: result.text,
                blocked: false,
            },
        }
    }

    /// Agent mode: loop toward `goal` until done, stopped or out of steps.
    pub async fn run_agent(&mut self, goal: &str) -> LoopReport {
        let token = self.handle.begin();
        let report = ControlLoop::new(&mut self.brain, &self.router, self.gate, token)
            .run(goal)
            .await;
        self.handle.end();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::tests::{ScriptedProvider, keys_for, test_config};
    use crate::control_loop::LoopOutcome;
    use crate::tool::Tool;
    use aide_ai::{Provider, Role};
    use async_trait::async_trait;
    use serde_json::{Map, Value, json};

    struct EchoExecutor;

    #[async_trait]
    impl Tool for EchoExecutor {
        fn name(&self) -> &str {
            "executor"
        }
        fn description(&self) -> &str {
            "Runs a shell command"
        }
        async fn invoke(&self, _: &str, _: Option<&str>, params: &Map<String, Value>) -> String {
            format!("ran {}", params["command"].as_str().unwrap_or_default())
        }
    }

    fn session(responses: Vec<aide_ai::Result<String>>) -> (Session, Arc<ScriptedProvider>) {
        let groq = ScriptedProvider::new(responses);
        let mut providers = ProviderRegistry::new();
        providers.register(Provider::Groq, groq.clone());
        let session = Session::new(
            test_config(),
            providers,
            keys_for(&[Provider::Groq]),
            ToolRegistry::new().with(Arc::new(EchoExecutor)),
        );
        (session, groq)
    }

    #[tokio::test]
    async fn test_reply_turn() {
        let (mut session, _) = session(vec![Ok(json!({"action": "reply_op", "content": "Hey!"}).to_string())]);
        let out = session.handle_utterance("hi").await;
        assert_eq!(out.text, "Hey!");
        assert!(!out.blocked);
        assert_eq!(session.store().len(), 3);
    }

    #[tokio::test]
    async fn test_tool_turn_records_result() {
        let (mut session, groq) = session(vec![Ok(
            json!({"action": "execute_command", "command": "uptime"}).to_string(),
        )]);
        let out = session.handle_utterance("how long has the machine been up").await;
        assert_eq!(out.text, "ran uptime");
        assert_eq!(
            session.store().last().map(|m| m.content.as_str()),
            Some("[execute_command] ran uptime")
        );
        // Tools are advertised in the ephemeral context note
        let seen = groq.seen.lock();
        assert!(seen[0]
            .messages
            .iter()
            .any(|m| m.content.contains("- executor: Runs a shell command")));
    }

    #[tokio::test]
    async fn test_blocked_turn() {
        let (mut session, _) = session(vec![Ok(
            json!({"action": "execute_command", "command": "type C:\\Windows\\System32\\config"}).to_string(),
        )]);
        let out = session.handle_utterance("show me the registry hive").await;
        assert!(out.blocked);
        assert!(out.text.starts_with("Action blocked: Blocked Access to Sensitive Path"));

        session.set_security_level(SecurityLevel::Low);
        assert_eq!(session.security_level(), SecurityLevel::Low);
    }

    #[tokio::test]
    async fn test_switch_persona_replaces_head() {
        let (mut session, _) = session(vec![]);
        session.handle_utterance("hello").await;
        let len = session.store().len();

        session.switch_persona(Persona::Professional);
        assert_eq!(session.store().len(), len);
        let head = &session.store().messages()[0];
        assert_eq!(head.role, Role::System);
        assert!(head.content.contains("formal, precise"));
    }

    #[tokio::test]
    async fn test_stop_after_agent_run_does_not_cancel_later_plans() {
        let (mut session, _) = session(vec![
            Ok(json!({"action": "final_reply", "content": "done"}).to_string()),
            Ok(json!({"action": "planner_op", "goal": "check uptime"}).to_string()),
            Ok(json!({"plan": [{"action": "execute_command", "command": "uptime"}]}).to_string()),
        ]);
        let handle = session.handle();
        session.run_agent("warm up").await;
        handle.stop();

        let out = session.handle_utterance("plan a check of the uptime").await;
        assert!(!out.blocked);
        assert!(out.text.starts_with("Plan completed in 1 steps"), "got: {}", out.text);
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_run_agent_resets_running_flag() {
        let (mut session, _) = session(vec![
            Ok(json!({"action": "execute_command", "command": "date"}).to_string()),
            Ok(json!({"action": "final_reply", "content": "It is Monday."}).to_string()),
        ]);
        let handle = session.handle();
        // A stop before the run does not leak into it
        handle.stop();

        let report = session.run_agent("what day is it").await;
        assert_eq!(report.outcome, LoopOutcome::Completed);
        assert_eq!(report.final_text, "It is Monday.");
        assert!(!handle.is_running());
    }
}
