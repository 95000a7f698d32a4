//! Agent mode: repeated generate, gate and route cycles toward a goal.
//!
//! Every run ends in bounded time. The step ceiling caps iterations, each
//! generation is capped by the generator's attempt ceiling, and the stop
//! signal is checked between steps.

use std::fmt;

use aide_ai::Role;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::action::{Action, ActionKind};
use crate::brain::CommandGenerator;
use crate::events::PipelineEvent;
use crate::planner::{Plan, Planner};
use crate::policy::PolicyGate;
use crate::prompts::{AGENT_MODE_PROMPT, CONTINUE_PROMPT, blocked_prompt, corrective_prompt};
use crate::router::{ActionRouter, ExecutionResult};

/// How an agent run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopOutcome {
    /// A final reply was produced
    Completed,
    /// The step ceiling was reached first
    Incomplete,
    /// The generator gave up, or a plan step failed
    Aborted,
    /// The stop signal was observed
    Cancelled,
}

impl fmt::Display for LoopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoopOutcome::Completed => "completed",
            LoopOutcome::Incomplete => "incomplete",
            LoopOutcome::Aborted => "aborted",
            LoopOutcome::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running(u32),
    Done,
    Aborted,
}

/// One executed (or refused) step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: u32,
    pub kind: String,
    pub result: String,
    pub blocked: bool,
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopReport {
    pub outcome: LoopOutcome,
    pub steps: u32,
    /// Final reply content, or a description of why the run stopped
    pub final_text: String,
    pub trace: Vec<StepRecord>,
}

/// Result of pushing a single action through the gate and router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Blocked(String),
    Routed(ExecutionResult),
}

pub struct ControlLoop<'a> {
    brain: &'a mut CommandGenerator,
    router: &'a ActionRouter,
    gate: PolicyGate,
    cancel: CancellationToken,
    state: LoopState,
    trace: Vec<StepRecord>,
}

impl<'a> ControlLoop<'a> {
    pub fn new(
        brain: &'a mut CommandGenerator,
        router: &'a ActionRouter,
        gate: PolicyGate,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            brain,
            router,
            gate,
            cancel,
            state: LoopState::Running(0),
            trace: Vec::new(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Work toward `goal` until a final reply, the step ceiling, a generator
    /// failure or the stop signal.
    pub async fn run(mut self, goal: &str) -> LoopReport {
        let ceiling = self.brain.config().step_ceiling;
        let markers = self.brain.config().failure_markers.clone();
        self.brain.store_mut().append(Role::System, AGENT_MODE_PROMPT);
        tracing::info!(goal, ceiling, "agent run started");

        let mut prompt = goal.to_string();
        let mut step: u32 = 0;

        let (outcome, final_text) = loop {
            if self.cancel.is_cancelled() {
                tracing::info!(step, "agent run cancelled");
                break (LoopOutcome::Cancelled, "Task cancelled.".to_string());
            }
            if step >= ceiling {
                tracing::warn!(ceiling, "step ceiling reached");
                break (
                    LoopOutcome::Incomplete,
                    format!("Task incomplete: reached the limit of {} steps.", ceiling),
                );
            }

            step += 1;
            self.state = LoopState::Running(step);
            self.brain.emit(PipelineEvent::StepStart { step, ceiling });
            tracing::debug!(step, ceiling, "agent step");

            let action = self.brain.generate(&prompt).await;
            let kind = action.kind_name().to_string();

            if let ActionKind::Error { reason } = &action.kind {
                let result = self.router.route(&action, self.brain.store_mut()).await;
                self.record(step, &kind, &result.text, false, true);
                tracing::warn!(step, "generator gave up: {}", reason);
                break (LoopOutcome::Aborted, result.text);
            }

            match self.execute(&action).await {
                StepOutcome::Blocked(reason) => {
                    self.record(step, &kind, &reason, true, false);
                    prompt = blocked_prompt(&reason);
                }
                StepOutcome::Routed(result) if action.is_reply() => {
                    self.record(step, &kind, &result.text, false, false);
                    break (LoopOutcome::Completed, result.text);
                }
                StepOutcome::Routed(result) => {
                    let failed = result.is_failure(&markers);
                    self.record(step, &kind, &result.text, false, failed);
                    prompt = if failed {
                        tracing::info!(step, kind = %kind, "step failed, asking for a different approach");
                        corrective_prompt(&kind, &result.text, ceiling - step)
                    } else {
                        CONTINUE_PROMPT.to_string()
                    };
                }
            }
        };

        self.finish(outcome, step, final_text)
    }

    /// Execute a plan's actions in order. A blocked or failed step abandons
    /// the rest of the plan.
    pub async fn run_plan(mut self, plan: Plan) -> LoopReport {
        let (outcome, steps, final_text) = self.execute_plan(plan).await;
        self.finish(outcome, steps, final_text)
    }

    /// Gate and route one action. `planner_op` actions are expanded into a
    /// plan and executed in place.
    pub async fn execute(&mut self, action: &Action) -> StepOutcome {
        if let ActionKind::Plan { goal } = &action.kind {
            if let Some(blocked) = self.gate_check(action) {
                return blocked;
            }
            let plan = Planner::create_plan(&*self.brain, goal).await;
            let (outcome, steps, text) = self.execute_plan(plan).await;
            let text = match outcome {
                LoopOutcome::Completed => format!("Plan completed in {} steps. {}", steps, text),
                _ => text,
            };
            let text = crate::router::truncate(&text, self.brain.config().max_result_chars);
            self.brain
                .store_mut()
                .append(Role::System, format!("[{}] {}", action.kind_name(), text));
            return StepOutcome::Routed(ExecutionResult::new(text));
        }
        self.execute_step(action).await
    }

    fn gate_check(&mut self, action: &Action) -> Option<StepOutcome> {
        let decision = self.gate.evaluate(action);
        if decision.allowed {
            return None;
        }
        let kind = action.kind_name().to_string();
        tracing::warn!(kind = %kind, level = %self.gate.level, "action blocked: {}", decision.reason);
        self.brain.store_mut().append(
            Role::System,
            format!("[{}] BLOCKED: {}", kind, decision.reason),
        );
        self.brain.emit(PipelineEvent::ActionBlocked {
            kind,
            reason: decision.reason.clone(),
        });
        Some(StepOutcome::Blocked(decision.reason))
    }

    async fn execute_step(&mut self, action: &Action) -> StepOutcome {
        if let Some(blocked) = self.gate_check(action) {
            return blocked;
        }
        let result = self.router.route(action, self.brain.store_mut()).await;
        self.brain.emit(PipelineEvent::ActionRouted {
            kind: action.kind_name().to_string(),
            result: result.text.clone(),
        });
        StepOutcome::Routed(result)
    }

    async fn execute_plan(&mut self, mut plan: Plan) -> (LoopOutcome, u32, String) {
        let markers = self.brain.config().failure_markers.clone();
        let total = plan.steps.len() as u32;
        if plan.is_empty() {
            return (
                LoopOutcome::Aborted,
                0,
                format!("Planner failed to produce steps for: {}", plan.goal),
            );
        }
        tracing::info!(goal = %plan.goal, steps = total, "executing plan");

        let mut last_text = String::new();
        while let Some(action) = plan.next_step() {
            let step = plan.cursor as u32;
            if self.cancel.is_cancelled() {
                return (LoopOutcome::Cancelled, step - 1, "Plan cancelled.".to_string());
            }
            self.state = LoopState::Running(step);
            self.brain.emit(PipelineEvent::StepStart {
                step,
                ceiling: total,
            });
            let kind = action.kind_name().to_string();

            // Plans do not nest
            let outcome = self.execute_step(&action).await;
            match outcome {
                StepOutcome::Blocked(reason) => {
                    self.record(step, &kind, &reason, true, false);
                    return (
                        LoopOutcome::Aborted,
                        step,
                        format!("Plan failed at step {}/{}: blocked: {}", step, total, reason),
                    );
                }
                StepOutcome::Routed(result) => {
                    let failed = action.is_error() || result.is_failure(&markers);
                    self.record(step, &kind, &result.text, false, failed);
                    if failed {
                        tracing::warn!(step, kind = %kind, "plan step failed, abandoning plan");
                        return (
                            LoopOutcome::Aborted,
                            step,
                            format!("Plan failed at step {}/{}: {}", step, total, result.text),
                        );
                    }
                    if action.is_final() {
                        return (LoopOutcome::Completed, step, result.text);
                    }
                    last_text = result.text;
                }
            }
        }
        (LoopOutcome::Completed, total, last_text)
    }

    fn record(&mut self, step: u32, kind: &str, result: &str, blocked: bool, failed: bool) {
        self.trace.push(StepRecord {
            step,
            kind: kind.to_string(),
            result: result.to_string(),
            blocked,
            failed,
        });
    }

    fn finish(mut self, outcome: LoopOutcome, steps: u32, final_text: String) -> LoopReport {
        self.state = match outcome {
            LoopOutcome::Completed | LoopOutcome::Incomplete => LoopState::Done,
            LoopOutcome::Aborted | LoopOutcome::Cancelled => LoopState::Aborted,
        };
        tracing::info!(%outcome, steps, "agent run finished");
        self.brain.emit(PipelineEvent::LoopEnd { outcome, steps });
        LoopReport {
            outcome,
            steps,
            final_text,
            trace: self.trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::tests::{ScriptedProvider, generator, keys_for, test_config};
    use crate::config::{KeyRing, PipelineConfig};
    use crate::policy::SecurityLevel;
    use crate::tool::{Tool, ToolRegistry};
    use aide_ai::Provider;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{Map, Value, json};
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Executor stand-in replaying canned results.
    struct ScriptedExecutor {
        results: Mutex<VecDeque<String>>,
        commands: Mutex<Vec<String>>,
        cancel_on_call: Option<CancellationToken>,
    }

    impl ScriptedExecutor {
        fn new(results: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.iter().map(|s| s.to_string()).collect()),
                commands: Mutex::new(Vec::new()),
                cancel_on_call: None,
            })
        }
    }

    #[async_trait]
    impl Tool for ScriptedExecutor {
        fn name(&self) -> &str {
            "executor"
        }
        fn description(&self) -> &str {
            "runs shell commands"
        }
        async fn invoke(&self, _kind: &str, _sub: Option<&str>, params: &Map<String, Value>) -> String {
            let command = params
                .get("command")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            self.commands.lock().push(command);
            if let Some(token) = &self.cancel_on_call {
                token.cancel();
            }
            self.results.lock().pop_front().unwrap_or_else(|| "ok".into())
        }
    }

    fn exec(command: &str) -> aide_ai::Result<String> {
        Ok(json!({"action": "execute_command", "command": command}).to_string())
    }

    fn final_reply(content: &str) -> aide_ai::Result<String> {
        Ok(json!({"action": "final_reply", "content": content}).to_string())
    }

    fn last_user(messages: &[aide_ai::Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    fn setup(
        config: PipelineConfig,
        responses: Vec<aide_ai::Result<String>>,
        executor: Arc<ScriptedExecutor>,
    ) -> (CommandGenerator, ActionRouter, Arc<ScriptedProvider>) {
        let groq = ScriptedProvider::new(responses);
        let brain = generator(config, &[(Provider::Groq, groq.clone())], keys_for(&[Provider::Groq]));
        let router = ActionRouter::new(ToolRegistry::new().with(executor), 2000);
        (brain, router, groq)
    }

    fn gate() -> PolicyGate {
        PolicyGate::new(SecurityLevel::Medium)
    }

    #[tokio::test]
    async fn test_run_completes_on_final_reply() {
        let executor = ScriptedExecutor::new(&["notes.txt"]);
        let (mut brain, router, groq) = setup(
            test_config(),
            vec![exec("ls"), final_reply("You have one file.")],
            executor.clone(),
        );
        let mut events = brain.subscribe();

        let report = ControlLoop::new(&mut brain, &router, gate(), CancellationToken::new())
            .run("what files do I have")
            .await;

        assert_eq!(report.outcome, LoopOutcome::Completed);
        assert_eq!(report.steps, 2);
        assert_eq!(report.final_text, "You have one file.");
        assert_eq!(*executor.commands.lock(), vec!["ls"]);

        let seen = groq.seen.lock();
        assert_eq!(last_user(&seen[0].messages), "what files do I have");
        assert_eq!(last_user(&seen[1].messages), CONTINUE_PROMPT);
        assert!(seen[0].messages.iter().any(|m| m.content == AGENT_MODE_PROMPT));

        let mut saw_end = false;
        while let Ok(event) = events.try_recv() {
            if let PipelineEvent::LoopEnd { outcome, steps } = event {
                assert_eq!(outcome, LoopOutcome::Completed);
                assert_eq!(steps, 2);
                saw_end = true;
            }
        }
        assert!(saw_end);
    }

    #[tokio::test]
    async fn test_failed_step_gets_corrective_prompt() {
        let executor = ScriptedExecutor::new(&[
            "created",
            "entered",
            "[STDERR] cargo: command not found",
        ]);
        let (mut brain, router, groq) = setup(
            test_config(),
            vec![
                exec("mkdir demo"),
                exec("cd demo"),
                exec("cargo init"),
                exec("rustup run stable cargo init"),
                final_reply("done"),
            ],
            executor,
        );

        let report = ControlLoop::new(&mut brain, &router, gate(), CancellationToken::new())
            .run("start a rust project")
            .await;

        assert_eq!(report.outcome, LoopOutcome::Completed);
        assert!(report.trace[2].failed);
        assert!(!report.trace[1].failed);

        let seen = groq.seen.lock();
        let fourth = last_user(&seen[3].messages);
        assert!(fourth.contains(
            "The previous action 'execute_command' failed with: [STDERR] cargo: command not found"
        ));
        assert!(fourth.contains("DIFFERENT approach"));
        assert!(fourth.contains("7 steps left"));
        assert_eq!(last_user(&seen[2].messages), CONTINUE_PROMPT);
    }

    #[tokio::test]
    async fn test_blocked_action_asks_for_alternative() {
        let executor = ScriptedExecutor::new(&[]);
        let (mut brain, router, groq) = setup(
            test_config(),
            vec![exec("rm -rf /"), final_reply("I won't do that.")],
            executor.clone(),
        );

        let report = ControlLoop::new(&mut brain, &router, gate(), CancellationToken::new())
            .run("clean my disk")
            .await;

        assert_eq!(report.outcome, LoopOutcome::Completed);
        assert_eq!(report.steps, 2);
        assert!(report.trace[0].blocked);
        assert!(executor.commands.lock().is_empty());

        let seen = groq.seen.lock();
        let second = last_user(&seen[1].messages);
        assert!(second.contains("BLOCKED"));
        assert!(second.contains("safer alternative"));
        assert!(brain
            .store()
            .messages()
            .iter()
            .any(|m| m.is_system() && m.content.starts_with("[execute_command] BLOCKED")));
    }

    #[tokio::test]
    async fn test_step_ceiling_stops_run() {
        let config = PipelineConfig {
            step_ceiling: 3,
            ..test_config()
        };
        let executor = ScriptedExecutor::new(&[]);
        let (mut brain, router, groq) = setup(
            config,
            (0..10).map(|i| exec(&format!("echo {}", i))).collect(),
            executor,
        );

        let report = ControlLoop::new(&mut brain, &router, gate(), CancellationToken::new())
            .run("loop forever")
            .await;

        assert_eq!(report.outcome, LoopOutcome::Incomplete);
        assert_eq!(report.steps, 3);
        assert!(report.final_text.contains("incomplete"));
        assert_eq!(groq.calls(), 3);
    }

    #[tokio::test]
    async fn test_generator_exhaustion_aborts() {
        let mut brain = generator(test_config(), &[], KeyRing::new());
        let router = ActionRouter::new(ToolRegistry::new(), 2000);

        let report = ControlLoop::new(&mut brain, &router, gate(), CancellationToken::new())
            .run("anything")
            .await;

        assert_eq!(report.outcome, LoopOutcome::Aborted);
        assert_eq!(report.steps, 1);
        assert!(report.final_text.starts_with("AI Error:"));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let executor = ScriptedExecutor::new(&[]);
        let (mut brain, router, groq) = setup(test_config(), vec![exec("ls")], executor);
        let token = CancellationToken::new();
        token.cancel();

        let report = ControlLoop::new(&mut brain, &router, gate(), token).run("x").await;
        assert_eq!(report.outcome, LoopOutcome::Cancelled);
        assert_eq!(report.steps, 0);
        assert_eq!(groq.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_observed_between_steps() {
        let token = CancellationToken::new();
        let executor = Arc::new(ScriptedExecutor {
            results: Mutex::new(VecDeque::from(vec!["first".to_string()])),
            commands: Mutex::new(Vec::new()),
            cancel_on_call: Some(token.clone()),
        });
        let (mut brain, router, groq) = setup(
            test_config(),
            vec![exec("ls"), exec("pwd")],
            executor.clone(),
        );

        let report = ControlLoop::new(&mut brain, &router, gate(), token).run("x").await;
        assert_eq!(report.outcome, LoopOutcome::Cancelled);
        assert_eq!(report.steps, 1);
        // The in-flight step finished and its trace survived
        assert_eq!(report.trace.len(), 1);
        assert_eq!(report.trace[0].result, "first");
        assert_eq!(groq.calls(), 1);
    }

    #[tokio::test]
    async fn test_run_plan_abandons_on_failure() {
        let executor = ScriptedExecutor::new(&["ok", "Permission denied", "never"]);
        let (mut brain, router, _) = setup(test_config(), vec![], executor.clone());
        let plan = Plan::new(
            "tidy up",
            vec![
                Action::from_value(json!({"action": "execute_command", "command": "a"})),
                Action::from_value(json!({"action": "execute_command", "command": "b"})),
                Action::from_value(json!({"action": "execute_command", "command": "c"})),
            ],
        );

        let report = ControlLoop::new(&mut brain, &router, gate(), CancellationToken::new())
            .run_plan(plan)
            .await;

        assert_eq!(report.outcome, LoopOutcome::Aborted);
        assert_eq!(report.steps, 2);
        assert!(report.final_text.contains("step 2/3"));
        assert_eq!(*executor.commands.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_run_plan_blocked_step_abandons() {
        let executor = ScriptedExecutor::new(&[]);
        let (mut brain, router, _) = setup(test_config(), vec![], executor.clone());
        let plan = Plan::new(
            "wipe",
            vec![
                Action::from_value(json!({"action": "execute_command", "command": "shutdown /s"})),
                Action::from_value(json!({"action": "final_reply", "content": "bye"})),
            ],
        );

        let report = ControlLoop::new(&mut brain, &router, gate(), CancellationToken::new())
            .run_plan(plan)
            .await;
        assert_eq!(report.outcome, LoopOutcome::Aborted);
        assert!(report.trace[0].blocked);
        assert!(executor.commands.lock().is_empty());
    }

    #[tokio::test]
    async fn test_planner_action_runs_plan_in_loop() {
        let executor = ScriptedExecutor::new(&["made", "listed"]);
        let plan_json = json!({"plan": [
            {"action": "execute_command", "command": "mkdir out"},
            {"action": "execute_command", "command": "ls out"}
        ]})
        .to_string();
        let (mut brain, router, _) = setup(
            test_config(),
            vec![
                Ok(json!({"action": "planner_op", "goal": "prepare output dir"}).to_string()),
                Ok(plan_json),
                final_reply("prepared"),
            ],
            executor.clone(),
        );

        let report = ControlLoop::new(&mut brain, &router, gate(), CancellationToken::new())
            .run("prepare the output directory")
            .await;

        assert_eq!(report.outcome, LoopOutcome::Completed);
        assert_eq!(*executor.commands.lock(), vec!["mkdir out", "ls out"]);
        assert!(brain
            .store()
            .messages()
            .iter()
            .any(|m| m.content.starts_with("[planner_op] Plan completed in 2 steps.")));
    }
}
