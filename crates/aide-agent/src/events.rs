//! Pipeline event types

use aide_ai::{FailureKind, Provider};
use serde::{Deserialize, Serialize};

use crate::control_loop::LoopOutcome;

/// Events emitted while the pipeline runs.
///
/// Delivery is best effort: events are dropped when nobody subscribes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A provider exchange failed
    ProviderFailure {
        provider: Provider,
        kind: FailureKind,
        message: String,
    },

    /// The active provider, model or key changed
    ProviderSwitch {
        provider: Provider,
        model: String,
        key_index: usize,
    },

    /// History was summarized
    Distilled {
        messages_before: usize,
        messages_after: usize,
    },

    /// The generator produced an action
    ActionGenerated { kind: String },

    /// The policy gate refused an action
    ActionBlocked { kind: String, reason: String },

    /// An action was routed and produced a result
    ActionRouted { kind: String, result: String },

    /// Agent loop step started
    StepStart { step: u32, ceiling: u32 },

    /// Agent loop finished
    LoopEnd { outcome: LoopOutcome, steps: u32 },
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::LoopEnd { .. })
    }
}
