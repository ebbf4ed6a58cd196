//! Planner triggers.

use serde_json::Value;
use weft_core::{NodeRef, TokenId};
use weft_executor::TaskFailure;

use crate::error::ErrorKind;

/// The tagged input that drives one planning pass.
///
/// Everything the pass needs beyond the trigger (definitions, tokens, the
/// context) is marshalled into the planner's input by the actor — the
/// planner performs no I/O of its own.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// The run is starting with this input.
    WorkflowStart {
        /// The raw run input (validated by the pass).
        input: Value,
    },

    /// The executor completed a token's task invocation.
    TaskCompleted {
        /// The running token.
        token_id: TokenId,
        /// The task output payload (validated by the pass).
        output: Value,
        /// Which attempt produced the output, starting at 1.
        attempt: u32,
    },

    /// A token's task invocation failed for good — executor failure,
    /// exhausted retries, timeout or transport failure.
    TaskFailed {
        /// The running token.
        token_id: TokenId,
        /// The typed failure.
        error: TaskFailure,
        /// Attempts consumed, starting at 1.
        attempt: u32,
    },

    /// A token arrived at a node via a synchronized transition.
    ///
    /// Ordinarily arrivals are planned inline while firing transitions on
    /// task completion; this trigger covers externally injected arrivals
    /// and keeps the arrival logic independently testable.
    TokenArrivedAtNode {
        /// The arriving token.
        token_id: TokenId,
        /// The node it arrived at.
        node_ref: NodeRef,
    },

    /// The run is being torn down from outside the token flow: owner
    /// cancellation (`kind = Cancelled`) or an expired workflow deadline
    /// (`kind = Timeout`).
    CancelRun {
        /// Why, for the failure record.
        reason: String,
        /// The failure kind to report.
        kind: ErrorKind,
    },
}

impl Trigger {
    /// Short name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkflowStart { .. } => "workflow_start",
            Self::TaskCompleted { .. } => "task_completed",
            Self::TaskFailed { .. } => "task_failed",
            Self::TokenArrivedAtNode { .. } => "token_arrived",
            Self::CancelRun { .. } => "cancel_run",
        }
    }
}
