//! aide-agent: the resilient command pipeline
//!
//! Turns free text into one structured [`Action`] through a failover chain of
//! language-model providers, checks it against a [`PolicyGate`], and routes it
//! to a [`Tool`]. Agent mode repeats that cycle under a step ceiling.

pub mod action;
pub mod brain;
pub mod config;
pub mod control_loop;
pub mod conversation;
pub mod distill;
pub mod error;
pub mod events;
pub mod gateway;
pub mod handle;
pub mod memory;
pub mod planner;
pub mod policy;
pub mod prompts;
pub mod router;
pub mod session;
pub mod tool;

pub use action::{Action, ActionKind, FileOpKind};
pub use brain::{CommandGenerator, ProviderState};
pub use config::{KeyRing, PipelineConfig};
pub use control_loop::{ControlLoop, LoopOutcome, LoopReport, StepOutcome};
pub use conversation::ConversationStore;
pub use distill::{DistillationConfig, DistillationReason};
pub use error::{Error, Result};
pub use events::PipelineEvent;
pub use gateway::{GatewayReply, ProviderFailure, ProviderGateway};
pub use handle::SessionHandle;
pub use memory::{InMemoryStore, JsonFileStore, MemoryStore};
pub use planner::{Plan, Planner};
pub use policy::{PolicyDecision, PolicyGate, SecurityLevel};
pub use prompts::Persona;
pub use router::{ActionRouter, ExecutionResult};
pub use session::{Session, TurnOutput};
pub use tool::{BoxedTool, Tool, ToolRegistry};
