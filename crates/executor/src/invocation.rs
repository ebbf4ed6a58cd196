//! Invocation and reply types for the executor RPC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_core::{Revision, RunId, TaskRef, TokenId};

/// One task invocation handed to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInvocation {
    /// The task to run.
    pub task_ref: TaskRef,
    /// Revision of the task.
    pub task_revision: Revision,
    /// The composed, schema-valid task input.
    pub input: Value,
    /// The token this invocation executes.
    pub token_id: TokenId,
    /// The run the token belongs to.
    pub run_id: RunId,
    /// Absolute deadline after which the coordinator stops waiting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Key the executor may use to deduplicate redeliveries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// A typed task failure reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Human-readable message.
    pub message: String,
    /// Machine-readable failure code (e.g. `step_failure`).
    pub code: String,
    /// Whether the coordinator may retry the invocation.
    pub retryable: bool,
}

impl TaskFailure {
    /// A non-retryable failure.
    pub fn fatal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            retryable: false,
        }
    }

    /// A retryable failure.
    pub fn retryable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            retryable: true,
        }
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// The executor's answer to an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutorReply {
    /// The task ran to completion with this output payload.
    Completed {
        /// The task output.
        output: Value,
    },
    /// The task failed.
    Failed {
        /// The typed failure.
        error: TaskFailure,
    },
}
