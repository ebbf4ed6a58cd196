//! Coarse workflow lifecycle events.
//!
//! Subscribers that do not need the inner trace follow this stream instead:
//! one event per run lifecycle edge and per task start/finish. These are
//! projections of committed state, never the source of truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_core::{DefinitionRef, NodeRef, RunId, TaskRef, TokenId};

/// The lifecycle edge a [`WorkflowEvent`] records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WorkflowEventKind {
    /// A run started.
    #[serde(rename = "workflow.started")]
    WorkflowStarted {
        /// The definition the run executes.
        definition_ref: DefinitionRef,
        /// The run input.
        input: Value,
    },

    /// A run completed successfully.
    #[serde(rename = "workflow.completed")]
    WorkflowCompleted {
        /// The validated final output.
        final_output: Value,
    },

    /// A run failed.
    #[serde(rename = "workflow.failed")]
    WorkflowFailed {
        /// Structured error kind.
        error_kind: String,
        /// Human-readable message.
        message: String,
    },

    /// A task invocation started.
    #[serde(rename = "task.started")]
    TaskStarted {
        /// The dispatched token.
        token_id: TokenId,
        /// Node being executed.
        node_ref: NodeRef,
        /// Task invoked by the node.
        task_ref: TaskRef,
    },

    /// A task invocation completed successfully.
    #[serde(rename = "task.completed")]
    TaskCompleted {
        /// The dispatched token.
        token_id: TokenId,
        /// Node that was executed.
        node_ref: NodeRef,
    },

    /// A task invocation failed.
    #[serde(rename = "task.failed")]
    TaskFailed {
        /// The dispatched token.
        token_id: TokenId,
        /// Node that was executed.
        node_ref: NodeRef,
        /// Failure description.
        error: String,
    },
}

impl WorkflowEventKind {
    /// The dotted type string of this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow.started",
            Self::WorkflowCompleted { .. } => "workflow.completed",
            Self::WorkflowFailed { .. } => "workflow.failed",
            Self::TaskStarted { .. } => "task.started",
            Self::TaskCompleted { .. } => "task.completed",
            Self::TaskFailed { .. } => "task.failed",
        }
    }
}

/// A workflow event addressed to one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// The run the event belongs to.
    pub run_id: RunId,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// The lifecycle edge.
    #[serde(flatten)]
    pub kind: WorkflowEventKind,
}

impl WorkflowEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn now(run_id: RunId, kind: WorkflowEventKind) -> Self {
        Self {
            run_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    /// The dotted type string of this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Whether this event's type starts with the given dotted prefix.
    #[must_use]
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        let ty = self.event_type();
        ty == prefix || (ty.starts_with(prefix) && ty.as_bytes().get(prefix.len()) == Some(&b'.'))
    }
}
