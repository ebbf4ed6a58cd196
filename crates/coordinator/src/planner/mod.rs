//! The planner: a pure function from run state and a trigger to a plan.
//!
//! A planning pass receives everything it needs up front — the
//! definition, every token row, a working copy of the context, the run
//! row — and produces decisions together with the trace events that
//! explain them. It performs no I/O: context mutations run against the
//! pass's working copy (which records its own `context.*` events), token
//! and run effects are emitted as [`Decision`]s for the applier, and the
//! whole pass commits atomically or not at all.

mod completion;
mod merge;
mod routing;
mod spawn;
mod sync;

pub use merge::merge_values;

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use weft_context::{ContextStore, MappingTarget};
use weft_core::{NodeRef, TokenId};
use weft_definition::{Mapping, TaskDefinition, WorkflowDefinition};
use weft_store::{can_transition, RunRecord, TokenRecord, TokenStatus};
use weft_trace::{Recorder, TraceEventKind};

use crate::config::MergeRegistry;
use crate::error::{run_error, ErrorKind};
use crate::plan::{Decision, Plan};
use crate::trigger::Trigger;

/// Everything a planning pass needs, marshalled in by the actor.
pub struct PlannerInput {
    /// The workflow definition the run executes.
    pub definition: Arc<WorkflowDefinition>,
    /// Every token row, in creation order.
    pub tokens: Vec<TokenRecord>,
    /// Working copy of the run's context.
    pub context: ContextStore,
    /// The run row.
    pub run: RunRecord,
    /// The task definition of the affected token's node, for task
    /// completion/failure triggers.
    pub task: Option<Arc<TaskDefinition>>,
    /// Hard ceiling on tokens created by this run.
    pub max_tokens: usize,
    /// Custom merge strategies available to this run's definitions.
    pub merge_registry: MergeRegistry,
}

/// Run one planning pass.
#[must_use]
pub fn plan(input: PlannerInput, trigger: Trigger) -> Plan {
    let mut pass = Pass::new(input);
    match trigger {
        Trigger::WorkflowStart { input } => pass.on_workflow_start(input),
        Trigger::TaskCompleted {
            token_id,
            output,
            attempt,
        } => pass.on_task_completed(token_id, output, attempt),
        Trigger::TaskFailed {
            token_id,
            error,
            attempt,
        } => pass.on_task_failed(token_id, &error, attempt),
        Trigger::TokenArrivedAtNode { token_id, node_ref } => {
            pass.on_token_arrived(token_id, &node_ref);
        }
        Trigger::CancelRun { reason, kind } => pass.on_cancel(kind, &reason),
    }
    pass.finish()
}

/// Working state of one planning pass.
pub(crate) struct Pass {
    pub(crate) definition: Arc<WorkflowDefinition>,
    pub(crate) run_id: weft_core::RunId,
    pub(crate) tokens: Vec<TokenRecord>,
    pub(crate) ctx: ContextStore,
    pub(crate) rec: Recorder,
    pub(crate) decisions: Vec<Decision>,
    pub(crate) task: Option<Arc<TaskDefinition>>,
    pub(crate) max_tokens: usize,
    pub(crate) merge_registry: MergeRegistry,
    /// Set once a run-terminal decision has been emitted; later steps of
    /// the pass become no-ops.
    pub(crate) terminal: bool,
}

impl Pass {
    fn new(input: PlannerInput) -> Self {
        Self {
            definition: input.definition,
            run_id: input.run.id,
            tokens: input.tokens,
            ctx: input.context,
            rec: Recorder::new(),
            decisions: Vec::new(),
            task: input.task,
            max_tokens: input.max_tokens,
            merge_registry: input.merge_registry,
            terminal: input.run.status.is_terminal(),
        }
    }

    fn finish(self) -> Plan {
        let mut rec = self.rec;
        Plan {
            decisions: self.decisions,
            events: rec.drain(),
            context_after: self.ctx,
            tokens_after: self.tokens,
        }
    }

    // ── trigger handlers ────────────────────────────────────────────────

    fn on_workflow_start(&mut self, input: Value) {
        if self.terminal {
            return;
        }
        if let Err(err) = self.ctx.initialize(input, &mut self.rec) {
            let kind = match &err {
                weft_context::ContextError::SchemaViolation(_) => ErrorKind::SchemaViolation,
                _ => ErrorKind::InvalidPath,
            };
            self.fail_run(kind, err.to_string(), None, None, None);
            return;
        }
        let root = TokenRecord::root(self.run_id, self.definition.initial_node_ref.clone());
        self.create_token(root);
    }

    fn on_task_completed(&mut self, token_id: TokenId, output: Value, attempt: u32) {
        if self.terminal {
            return;
        }
        let Some(token) = self.token(token_id).cloned() else {
            return;
        };
        if token.status != TokenStatus::Running {
            // Late reply for a cancelled or otherwise settled token:
            // its effect on context is discarded.
            return;
        }

        let Some(task) = self.task.clone() else {
            self.fail_run(
                ErrorKind::Internal,
                "task definition missing from planner input",
                Some(token_id),
                Some(token.node_ref.clone()),
                None,
            );
            return;
        };

        // Validate the executor's payload before anything of it becomes
        // visible.
        if let Err(err) = weft_schema::check(&task.output_schema, &output) {
            self.rec.push(TraceEventKind::TaskEnd {
                token_id,
                node_ref: token.node_ref.clone(),
                outcome: "failed".into(),
                attempt,
            });
            self.fail_token(
                &token,
                ErrorKind::SchemaViolation,
                format!("task output: {err}"),
                attempt,
            );
            return;
        }

        self.rec.push(TraceEventKind::TaskEnd {
            token_id,
            node_ref: token.node_ref.clone(),
            outcome: "completed".into(),
            attempt,
        });

        let Some(node) = self.definition.node(&token.node_ref).cloned() else {
            self.fail_token(
                &token,
                ErrorKind::Definition,
                format!("node {} not in definition", token.node_ref),
                attempt,
            );
            return;
        };

        // Branch isolation: output.* writes of a spawned sibling stay in
        // its branch table until the merge.
        let target = if token.in_sibling_group() && !token.is_arrival() {
            MappingTarget::Branch(token.id)
        } else {
            MappingTarget::Shared
        };
        let entries = mapping_entries(&node.output_mapping);
        if let Err(err) = self
            .ctx
            .apply_output_mapping(&entries, &output, target, &mut self.rec)
        {
            let kind = match &err {
                weft_context::ContextError::SchemaViolation(_) => ErrorKind::SchemaViolation,
                _ => ErrorKind::InvalidPath,
            };
            self.fail_token(&token, kind, err.to_string(), attempt);
            return;
        }

        self.set_status(token_id, TokenStatus::Completed, "task_completed");
        if let Some(completed) = self.token(token_id).cloned() {
            routing::fire_transitions(self, &completed);
        }
        completion::check_completion(self);
    }

    fn on_task_failed(&mut self, token_id: TokenId, error: &weft_executor::TaskFailure, attempt: u32) {
        if self.terminal {
            return;
        }
        let Some(token) = self.token(token_id).cloned() else {
            return;
        };
        if token.status != TokenStatus::Running {
            return;
        }

        self.rec.push(TraceEventKind::TaskEnd {
            token_id,
            node_ref: token.node_ref.clone(),
            outcome: "failed".into(),
            attempt,
        });

        let kind = match error.code.as_str() {
            "timeout" => ErrorKind::Timeout,
            "transport" => ErrorKind::Transport,
            "schema_violation" => ErrorKind::SchemaViolation,
            "definition" => ErrorKind::Definition,
            _ => ErrorKind::Task,
        };
        self.set_status(token_id, TokenStatus::Failed, &error.code);
        self.fail_run(
            kind,
            error.message.clone(),
            Some(token_id),
            Some(token.node_ref.clone()),
            Some(attempt),
        );
    }

    fn on_token_arrived(&mut self, token_id: TokenId, node_ref: &NodeRef) {
        if self.terminal {
            return;
        }
        let Some(token) = self.token(token_id).cloned() else {
            return;
        };
        // Resolve the synchronized transition this arrival belongs to.
        let transition = self
            .definition
            .transitions
            .iter()
            .find(|t| {
                &t.to_node_ref == node_ref
                    && t.synchronization
                        .as_ref()
                        .zip(token.sibling_group_name.as_ref())
                        .is_some_and(|(sync, name)| &sync.sibling_group == name)
            })
            .cloned();
        if let Some(transition) = transition {
            sync::record_arrival(self, &token, &transition);
            completion::check_completion(self);
        }
    }

    fn on_cancel(&mut self, kind: ErrorKind, reason: &str) {
        if self.terminal {
            return;
        }
        self.fail_run(kind, reason, None, None, None);
    }

    // ── shared plumbing ─────────────────────────────────────────────────

    pub(crate) fn token(&self, id: TokenId) -> Option<&TokenRecord> {
        self.tokens.iter().find(|t| t.id == id)
    }

    /// Create a token: record, decision and `tokens.create` event.
    ///
    /// Returns `false` (and fails the run) when the token ceiling is hit.
    pub(crate) fn create_token(&mut self, record: TokenRecord) -> bool {
        if self.terminal {
            return false;
        }
        if self.tokens.len() >= self.max_tokens {
            let limit = self.max_tokens;
            self.fail_run(
                ErrorKind::Internal,
                format!("token limit {limit} exceeded"),
                None,
                Some(record.node_ref.clone()),
                None,
            );
            return false;
        }
        // Arrival tokens inherit group coordinates for readiness tracking
        // but are not fan-out siblings; the group tag on `tokens.create`
        // counts the spawned branches only.
        let sibling_group = if record.is_arrival() {
            None
        } else {
            record.sibling_group_id
        };
        self.rec.push(TraceEventKind::TokenCreate {
            token_id: record.id,
            node_ref: record.node_ref.clone(),
            sibling_group,
            branch_index: record.branch_index,
            branch_total: record.branch_total,
            parent_token_id: record.parent_token_id,
        });
        if record.in_sibling_group() && !record.is_arrival() {
            self.ctx.ensure_branch(record.id);
        }
        self.decisions.push(Decision::CreateToken(record.clone()));
        self.tokens.push(record);
        true
    }

    /// Transition a token's status: record, decision and
    /// `tokens.status_transition` event.
    pub(crate) fn set_status(&mut self, token_id: TokenId, to: TokenStatus, reason: &str) {
        let Some(position) = self.tokens.iter().position(|t| t.id == token_id) else {
            return;
        };
        let from = self.tokens[position].status;
        if from == to {
            return;
        }
        if !can_transition(from, to) {
            // A planning bug, not an authoring error: quarantine the run.
            self.fail_run(
                ErrorKind::Internal,
                format!("planned invalid transition {from} -> {to} for token {token_id}"),
                Some(token_id),
                None,
                None,
            );
            return;
        }
        self.tokens[position].status = to;
        self.tokens[position].updated_at = Utc::now();
        self.rec.push(TraceEventKind::TokenStatusTransition {
            token_id,
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.to_owned(),
        });
        self.decisions.push(Decision::SetTokenStatus {
            token_id,
            to,
            reason: reason.to_owned(),
        });
    }

    /// Fail the token's run: the token is already settled by the caller;
    /// this records the run-level failure.
    pub(crate) fn fail_token(
        &mut self,
        token: &TokenRecord,
        kind: ErrorKind,
        message: String,
        attempt: u32,
    ) {
        if self.token(token.id).map(|t| t.status) == Some(TokenStatus::Running) {
            self.set_status(token.id, TokenStatus::Failed, kind.as_str());
        }
        self.fail_run(
            kind,
            message,
            Some(token.id),
            Some(token.node_ref.clone()),
            Some(attempt),
        );
    }

    /// Emit the run-failure decision: cancel every still-active token,
    /// record `completion.fail`, mark the pass terminal.
    pub(crate) fn fail_run(
        &mut self,
        kind: ErrorKind,
        message: impl Into<String>,
        token_id: Option<TokenId>,
        node_ref: Option<NodeRef>,
        attempts: Option<u32>,
    ) {
        if self.terminal {
            return;
        }
        let message = message.into();
        let active: Vec<TokenId> = self
            .tokens
            .iter()
            .filter(|t| t.status.is_active())
            .map(|t| t.id)
            .collect();
        for id in active {
            self.set_status(id, TokenStatus::Cancelled, "run_failed");
        }
        self.rec.push(TraceEventKind::CompletionFail {
            error_kind: kind.as_str().to_owned(),
            message: message.clone(),
        });
        self.decisions.push(Decision::FailRun {
            error: run_error(kind, message, token_id, node_ref, attempts),
        });
        self.terminal = true;
    }
}

/// All entries of a mapping table as owned pairs.
pub(crate) fn mapping_entries(mapping: &Mapping) -> Vec<(String, String)> {
    mapping
        .iter()
        .map(|(dest, source)| (dest.clone(), source.clone()))
        .collect()
}
