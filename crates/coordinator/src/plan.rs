//! Planner output: decisions plus their explanation.

use serde_json::Value;
use weft_context::ContextStore;
use weft_core::TokenId;
use weft_store::{RunError, TokenRecord, TokenStatus};
use weft_trace::TraceEventKind;

/// One state-effect command for the applier.
///
/// Context mutations are not listed here: the planning pass executes them
/// against its working copy of the context (collecting the context events
/// as it goes) and the resulting tables ride in [`Plan::context_after`].
/// What remains are the token and run effects the store must apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Insert a new token row.
    CreateToken(TokenRecord),

    /// Transition an existing token's status.
    SetTokenStatus {
        /// The token.
        token_id: TokenId,
        /// The target status.
        to: TokenStatus,
        /// Why, recorded on the trace.
        reason: String,
    },

    /// Complete the run with its validated final output.
    CompleteRun {
        /// The final output.
        final_output: Value,
    },

    /// Fail the run.
    FailRun {
        /// The user-visible failure record.
        error: RunError,
    },
}

/// The output of one planning pass.
///
/// `events` is the complete, ordered explanation of the pass — context
/// events recorded by the store during the pass interleaved with the
/// planner's own routing/synchronization/token/completion events. The
/// applier commits `decisions`, `context_after` and `events` as one
/// atomic batch; sequence numbers are assigned at commit.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Token and run effects, in application order.
    pub decisions: Vec<Decision>,
    /// The ordered trace events explaining the pass.
    pub events: Vec<TraceEventKind>,
    /// The context tables after the pass.
    pub context_after: ContextStore,
    /// Every token after the pass, in creation order. The applier reads
    /// full rows from here when committing `decisions`.
    pub tokens_after: Vec<TokenRecord>,
}

impl Plan {
    /// Whether the pass decided nothing and recorded nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty() && self.events.is_empty()
    }

    /// The run-terminal decision carried by this plan, if any.
    #[must_use]
    pub fn terminal_decision(&self) -> Option<&Decision> {
        self.decisions
            .iter()
            .find(|d| matches!(d, Decision::CompleteRun { .. } | Decision::FailRun { .. }))
    }
}
