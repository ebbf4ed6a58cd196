//! Dispatch preparation.
//!
//! The dispatcher drives pending tokens into the executor. Preparation is
//! pure: compose the task input from the node's input mapping, validate
//! it, and produce the plan (task-start event, status transition) plus
//! either the invocation to send or the input rejection to fail with.
//! The actor owns the cursor over pending tokens and the actual RPC.

use chrono::{DateTime, Utc};
use serde_json::Value;
use weft_context::{compose_object, ContextStore};
use weft_definition::{NodeDefinition, TaskDefinition};
use weft_executor::TaskInvocation;
use weft_schema::SchemaError;
use weft_store::{TokenRecord, TokenStatus};
use weft_trace::TraceEventKind;

use crate::plan::{Decision, Plan};
use crate::planner::mapping_entries;

/// What the actor should do after committing a dispatch plan.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Hand this invocation to the executor.
    Invoke(TaskInvocation),
    /// The composed input violated the task's input schema; fail the
    /// token without calling the executor.
    RejectInput(SchemaError),
}

/// A prepared dispatch: the plan to commit and the follow-up action.
#[derive(Debug)]
pub struct Dispatch {
    /// Task-start event plus the pending→running transition (first
    /// attempt only; retries re-dispatch an already-running token).
    pub plan: Plan,
    /// Invocation or input rejection.
    pub outcome: DispatchOutcome,
}

/// Prepare one dispatch attempt for a token.
#[must_use]
pub fn prepare_dispatch(
    token: &TokenRecord,
    tokens: Vec<TokenRecord>,
    context: &ContextStore,
    node: &NodeDefinition,
    task: &TaskDefinition,
    attempt: u32,
    deadline: Option<DateTime<Utc>>,
) -> Dispatch {
    let mut events = Vec::new();
    let mut decisions = Vec::new();
    let mut tokens_after = tokens;

    events.push(TraceEventKind::TaskStart {
        token_id: token.id,
        node_ref: token.node_ref.clone(),
        task_ref: node.task_ref.clone(),
        attempt,
    });

    if token.status == TokenStatus::Pending {
        events.push(TraceEventKind::TokenStatusTransition {
            token_id: token.id,
            from: TokenStatus::Pending.to_string(),
            to: TokenStatus::Running.to_string(),
            reason: "dispatch".into(),
        });
        decisions.push(Decision::SetTokenStatus {
            token_id: token.id,
            to: TokenStatus::Running,
            reason: "dispatch".into(),
        });
        if let Some(record) = tokens_after.iter_mut().find(|t| t.id == token.id) {
            record.status = TokenStatus::Running;
            record.updated_at = Utc::now();
        }
    }

    let outcome = match compose_input(token, context, node) {
        Ok(input) => match weft_schema::check(&task.input_schema, &input) {
            Ok(()) => DispatchOutcome::Invoke(TaskInvocation {
                task_ref: node.task_ref.clone(),
                task_revision: node.task_revision,
                input,
                token_id: token.id,
                run_id: token.run_id,
                deadline,
                idempotency_key: Some(format!("{}/{}/{attempt}", token.run_id, token.id)),
            }),
            Err(err) => DispatchOutcome::RejectInput(err),
        },
        Err(err) => DispatchOutcome::RejectInput(SchemaError::Violations(vec![
            weft_schema::Violation::new("", err.to_string()),
        ])),
    };

    Dispatch {
        plan: Plan {
            decisions,
            events,
            context_after: context.clone(),
            tokens_after,
        },
        outcome,
    }
}

/// Compose the task input by evaluating the node's input mapping against
/// the current context view, augmented with the token's branch bindings.
fn compose_input(
    token: &TokenRecord,
    context: &ContextStore,
    node: &NodeDefinition,
) -> Result<Value, weft_context::ContextError> {
    let branch_scope = (token.in_sibling_group() && !token.is_arrival()).then_some(token.id);
    let root = context.composite(branch_scope);
    let entries = mapping_entries(&node.input_mapping);
    let (input, skipped) = compose_object(&entries, &root)?;
    for (dest, source) in skipped {
        tracing::debug!(
            token_id = %token.id,
            dest,
            source,
            "input mapping source undefined, key omitted"
        );
    }
    Ok(input)
}
