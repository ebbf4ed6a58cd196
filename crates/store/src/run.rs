//! Workflow run rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_core::{DefinitionRef, NodeRef, Revision, RunId, TokenId};

/// The lifecycle status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Tokens are (or may become) active.
    Running,
    /// The run finished and produced a validated final output. Terminal.
    Completed,
    /// The run failed. Terminal.
    Failed,
}

impl RunStatus {
    /// Returns `true` if the run has reached a final status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The user-visible description of a run failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    /// Structured error kind (`schema_violation`, `invalid_path`,
    /// `definition`, `task`, `synchronization`, `transport`, `timeout`,
    /// `cancelled`, `internal`).
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// The token the failure is attributed to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<TokenId>,
    /// The node the failure is attributed to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<NodeRef>,
    /// Retry attempts consumed before the failure stuck.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable_attempts_used: Option<u32>,
}

/// One row of the `runs` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run id.
    pub id: RunId,
    /// The definition the run executes.
    pub definition_ref: DefinitionRef,
    /// Revision of the definition.
    pub revision: Revision,
    /// Current status.
    pub status: RunStatus,
    /// The validated run input.
    pub input: Value,
    /// The validated final output, present once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<Value>,
    /// Failure description, present once failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    /// A fresh running run.
    #[must_use]
    pub fn new(id: RunId, definition_ref: DefinitionRef, revision: Revision, input: Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            definition_ref,
            revision,
            status: RunStatus::Running,
            input,
            final_output: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
