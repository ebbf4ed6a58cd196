//! Token rows and the token status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weft_core::{NodeRef, RunId, SiblingGroupId, TokenId, TransitionRef};

use crate::error::StoreError;

/// The lifecycle status of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Created, not yet dispatched.
    Pending,
    /// A task invocation is in flight.
    Running,
    /// Arrived at a fan-in, waiting for the readiness predicate.
    WaitingAtFanIn,
    /// Finished successfully. Terminal.
    Completed,
    /// Finished with a failure. Terminal.
    Failed,
    /// Cancelled before finishing. Terminal.
    Cancelled,
}

impl TokenStatus {
    /// Returns `true` if the token has reached a final status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` for statuses that count as active (non-terminal).
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::WaitingAtFanIn => "waiting_at_fan_in",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Returns `true` if the status transition from `from` to `to` is valid.
///
/// Admitted: `pending → running → (completed | failed)`,
/// `pending → waiting_at_fan_in → (running | completed)`, and any
/// non-terminal status to `cancelled`. Nothing else.
#[must_use]
pub fn can_transition(from: TokenStatus, to: TokenStatus) -> bool {
    matches!(
        (from, to),
        (TokenStatus::Pending, TokenStatus::Running)
            | (TokenStatus::Pending, TokenStatus::WaitingAtFanIn)
            | (TokenStatus::Running, TokenStatus::Completed)
            | (TokenStatus::Running, TokenStatus::Failed)
            | (TokenStatus::WaitingAtFanIn, TokenStatus::Running)
            | (TokenStatus::WaitingAtFanIn, TokenStatus::Completed)
    ) || (!from.is_terminal() && to == TokenStatus::Cancelled)
}

/// Validate a status transition, returning an error if not admitted.
pub fn validate_transition(from: TokenStatus, to: TokenStatus) -> Result<(), StoreError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// One row of the `tokens` table: an in-flight or historical occupant of
/// a node.
///
/// Lineage and sibling-group membership are carried as ids, never as
/// references; the graph they form is reconstructed by lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Unique token id.
    pub id: TokenId,
    /// The run this token belongs to.
    pub run_id: RunId,
    /// Node the token occupies.
    pub node_ref: NodeRef,
    /// Current status.
    pub status: TokenStatus,
    /// Token that fired the transition creating this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_token_id: Option<TokenId>,
    /// Sibling group instance, for fan-out tokens and their arrivals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sibling_group_id: Option<SiblingGroupId>,
    /// Author-visible sibling group name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sibling_group_name: Option<String>,
    /// Transition whose fan-out spawned this token's group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_out_transition_ref: Option<TransitionRef>,
    /// Position within the sibling group, unique in `[0, branch_total)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_index: Option<u32>,
    /// Size of the sibling group; equal for all siblings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_total: Option<u32>,
    /// For arrival tokens: the synchronized transition they arrived via.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrived_via: Option<TransitionRef>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl TokenRecord {
    /// A fresh pending token at `node_ref` with no lineage.
    #[must_use]
    pub fn root(run_id: RunId, node_ref: NodeRef) -> Self {
        let now = Utc::now();
        Self {
            id: TokenId::v4(),
            run_id,
            node_ref,
            status: TokenStatus::Pending,
            parent_token_id: None,
            sibling_group_id: None,
            sibling_group_name: None,
            fan_out_transition_ref: None,
            branch_index: None,
            branch_total: None,
            arrived_via: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this token is a member of a sibling group.
    #[must_use]
    pub fn in_sibling_group(&self) -> bool {
        self.sibling_group_id.is_some()
    }

    /// Whether this token is a fan-in arrival record.
    #[must_use]
    pub fn is_arrival(&self) -> bool {
        self.arrived_via.is_some()
    }
}
