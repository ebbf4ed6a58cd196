//! Task definitions.
//!
//! A task is a named composition of steps over actions. The coordinator
//! treats execution as atomic — steps are opaque data handed to the
//! executor — but owns the task's input/output contracts and its retry
//! and timeout policy.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_core::{Revision, TaskRef};
use weft_schema::Schema;

/// Retry policy for a task's invocations.
///
/// Enforced by the dispatcher so every attempt is visible on the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds.
    #[serde(default)]
    pub backoff_ms: u64,
}

impl RetryPolicy {
    /// A policy of `max_attempts` with no backoff.
    #[must_use]
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_ms: 0,
        }
    }

    /// Whether another attempt is admitted after `attempts_used`.
    #[must_use]
    pub fn admits_retry(&self, attempts_used: u32) -> bool {
        attempts_used < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::attempts(1)
    }
}

/// An authored task definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Catalog reference of this task.
    #[serde(rename = "id")]
    pub task_ref: TaskRef,
    /// Published revision.
    #[serde(rename = "version")]
    pub revision: Revision,
    /// Schema the composed task input must satisfy.
    #[serde(default)]
    pub input_schema: Schema,
    /// Schema the executor's success payload must satisfy.
    #[serde(default)]
    pub output_schema: Schema,
    /// Opaque step list; executed by the executor, never interpreted here.
    #[serde(default)]
    pub steps: Vec<Value>,
    /// Retry policy for failed invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    /// Per-invocation timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl TaskDefinition {
    /// A task with unconstrained input and output, no steps.
    #[must_use]
    pub fn new(task_ref: TaskRef, revision: Revision) -> Self {
        Self {
            task_ref,
            revision,
            input_schema: Schema::any(),
            output_schema: Schema::any(),
            steps: Vec::new(),
            retry: None,
            timeout_ms: None,
        }
    }

    /// The effective retry policy (single attempt when unset).
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.unwrap_or_default()
    }
}
