//! The trace event vocabulary.
//!
//! Every internal operation of the coordinator is recorded as exactly one
//! [`TraceEventKind`] from the closed set below, grouped by subsystem
//! (`context.*`, `tokens.*`, `routing.*`, `synchronization.*`,
//! `dispatch.*`, `completion.*`). The planner produces kinds; the applier
//! stamps each with a run-scoped, strictly monotonic sequence number and a
//! timestamp at commit, yielding a [`TraceEvent`].
//!
//! Token statuses appear in payloads as plain strings so this crate stays
//! below the store layer that defines the status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_core::{NodeRef, SiblingGroupId, TaskRef, TokenId, TransitionRef};

/// One operation record, tagged by its subsystem-scoped type string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum TraceEventKind {
    /// The context tables were created and the run input written.
    #[serde(rename = "context.init")]
    ContextInit {
        /// The validated run input.
        input: Value,
    },

    /// A value was validated against the schema subtree it targets.
    #[serde(rename = "context.validate")]
    ContextValidate {
        /// Dotted path of the validated subtree (`input` for the whole
        /// input table, `state.foo` for a write target, `output` for the
        /// final output).
        subtree: String,
    },

    /// A JSONPath read over the composite context root.
    #[serde(rename = "context.read")]
    ContextRead {
        /// The path that was read.
        path: String,
        /// The resolved value (`null` when undefined).
        value: Value,
        /// Whether the path was defined. Distinguishes an undefined path
        /// from one holding JSON `null`.
        defined: bool,
    },

    /// A write into `state`, `output` or a branch table.
    #[serde(rename = "context.write")]
    ContextWrite {
        /// Dotted destination path.
        path: String,
        /// The written value.
        value: Value,
        /// Write mode: `set` or `merge`.
        mode: String,
    },

    /// A referentially consistent snapshot of the composite root.
    #[serde(rename = "context.snapshot")]
    ContextSnapshot {
        /// The snapshot content.
        content: Value,
    },

    /// The source root an output mapping was applied against.
    #[serde(rename = "context.output_mapping.input")]
    OutputMappingInput {
        /// The source root value.
        source: Value,
    },

    /// One output-mapping entry was applied.
    #[serde(rename = "context.output_mapping.apply")]
    OutputMappingApply {
        /// Destination path of the entry.
        dest: String,
        /// The projected value.
        value: Value,
    },

    /// One output-mapping entry was skipped because its source was
    /// undefined.
    #[serde(rename = "context.output_mapping.skip")]
    OutputMappingSkip {
        /// Destination path of the entry.
        dest: String,
        /// Source JSONPath that resolved to undefined.
        source: String,
    },

    /// A token was created.
    #[serde(rename = "tokens.create")]
    TokenCreate {
        /// The new token.
        token_id: TokenId,
        /// Node the token occupies.
        node_ref: NodeRef,
        /// Sibling group, for fan-out tokens.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sibling_group: Option<SiblingGroupId>,
        /// Position within the sibling group.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch_index: Option<u32>,
        /// Size of the sibling group.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch_total: Option<u32>,
        /// Token that fired the creating transition.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_token_id: Option<TokenId>,
    },

    /// A token changed status.
    #[serde(rename = "tokens.status_transition")]
    TokenStatusTransition {
        /// The token.
        token_id: TokenId,
        /// Status before the transition.
        from: String,
        /// Status after the transition.
        to: String,
        /// Why the transition happened.
        reason: String,
    },

    /// A transition's condition matched and the transition fired.
    #[serde(rename = "routing.match")]
    RoutingMatch {
        /// The matching transition.
        transition_ref: TransitionRef,
        /// Source node.
        from_node: NodeRef,
        /// Destination node.
        to_node: NodeRef,
    },

    /// A transition was evaluated and did not fire.
    #[serde(rename = "routing.no_match")]
    RoutingNoMatch {
        /// The transition that did not fire.
        transition_ref: TransitionRef,
        /// Why it did not fire (`condition_false`, `empty_collection`,
        /// `superseded`).
        reason: String,
    },

    /// A sibling arrived at a fan-in.
    #[serde(rename = "synchronization.arrival")]
    SyncArrival {
        /// The synchronized sibling group.
        sibling_group: SiblingGroupId,
        /// The arrival token recording this arrival.
        token_id: TokenId,
        /// Arrivals so far, including this one.
        arrivals: u32,
        /// Branch total of the group.
        branch_total: u32,
    },

    /// A fan-in's readiness predicate was satisfied.
    #[serde(rename = "synchronization.ready")]
    SyncReady {
        /// The synchronized sibling group.
        sibling_group: SiblingGroupId,
        /// The contributing arrival tokens.
        arrivals: Vec<TokenId>,
    },

    /// Branch outputs were merged into shared context.
    #[serde(rename = "synchronization.merge")]
    SyncMerge {
        /// The synchronized sibling group.
        sibling_group: SiblingGroupId,
        /// Merge target path.
        target: String,
        /// Merge strategy name.
        strategy: String,
    },

    /// A task invocation was handed to the executor.
    #[serde(rename = "dispatch.task_start")]
    TaskStart {
        /// The dispatched token.
        token_id: TokenId,
        /// Node being executed.
        node_ref: NodeRef,
        /// Task invoked by the node.
        task_ref: TaskRef,
        /// Attempt number, starting at 1.
        attempt: u32,
    },

    /// A task invocation finished (either way).
    #[serde(rename = "dispatch.task_end")]
    TaskEnd {
        /// The dispatched token.
        token_id: TokenId,
        /// Node that was executed.
        node_ref: NodeRef,
        /// `completed` or `failed`.
        outcome: String,
        /// Attempt number, starting at 1.
        attempt: u32,
    },

    /// The run completed and produced its final output.
    #[serde(rename = "completion.complete")]
    CompletionComplete {
        /// The validated final output.
        final_output: Value,
    },

    /// The run failed.
    #[serde(rename = "completion.fail")]
    CompletionFail {
        /// Structured error kind (spec taxonomy).
        error_kind: String,
        /// Human-readable message.
        message: String,
    },
}

impl TraceEventKind {
    /// The dotted type string of this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ContextInit { .. } => "context.init",
            Self::ContextValidate { .. } => "context.validate",
            Self::ContextRead { .. } => "context.read",
            Self::ContextWrite { .. } => "context.write",
            Self::ContextSnapshot { .. } => "context.snapshot",
            Self::OutputMappingInput { .. } => "context.output_mapping.input",
            Self::OutputMappingApply { .. } => "context.output_mapping.apply",
            Self::OutputMappingSkip { .. } => "context.output_mapping.skip",
            Self::TokenCreate { .. } => "tokens.create",
            Self::TokenStatusTransition { .. } => "tokens.status_transition",
            Self::RoutingMatch { .. } => "routing.match",
            Self::RoutingNoMatch { .. } => "routing.no_match",
            Self::SyncArrival { .. } => "synchronization.arrival",
            Self::SyncReady { .. } => "synchronization.ready",
            Self::SyncMerge { .. } => "synchronization.merge",
            Self::TaskStart { .. } => "dispatch.task_start",
            Self::TaskEnd { .. } => "dispatch.task_end",
            Self::CompletionComplete { .. } => "completion.complete",
            Self::CompletionFail { .. } => "completion.fail",
        }
    }

    /// The token this event is about, if any.
    #[must_use]
    pub fn token_id(&self) -> Option<TokenId> {
        match self {
            Self::TokenCreate { token_id, .. }
            | Self::TokenStatusTransition { token_id, .. }
            | Self::SyncArrival { token_id, .. }
            | Self::TaskStart { token_id, .. }
            | Self::TaskEnd { token_id, .. } => Some(*token_id),
            _ => None,
        }
    }
}

/// A committed trace event: a [`TraceEventKind`] stamped with its sequence
/// number and commit timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Run-scoped, strictly monotonic, contiguous from 1.
    pub sequence_number: u64,
    /// When the event was committed.
    pub timestamp: DateTime<Utc>,
    /// The operation record.
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

impl TraceEvent {
    /// The dotted type string of this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Whether this event's type starts with the given prefix.
    ///
    /// Matches whole dotted segments: `"context"` matches
    /// `context.write` but `"con"` does not.
    #[must_use]
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        let ty = self.event_type();
        ty == prefix || (ty.starts_with(prefix) && ty.as_bytes().get(prefix.len()) == Some(&b'.'))
    }
}
