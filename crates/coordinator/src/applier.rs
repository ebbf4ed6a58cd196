//! The applier: sole writer of tokens, run state and trace.
//!
//! One plan becomes one atomic store batch. Sequence numbers exist only
//! past this point: the store stamps them at commit, in commit order, and
//! a rejected batch leaves no trace events behind. After a successful
//! commit the stamped events are fanned out to subscribers.

use chrono::Utc;
use serde_json::{Map, Value};
use weft_context::ContextStore;
use weft_store::{
    ApplyBatch, ContextPage, ContextTable, RunRecord, RunStatus, RunStore,
};
use weft_trace::{EventHub, TraceEvent};

use crate::error::CoordinatorError;
use crate::plan::{Decision, Plan};

/// Outcome of applying one plan.
#[derive(Debug)]
pub struct Applied {
    /// The context working copy the run continues with.
    pub context: ContextStore,
    /// The committed events, stamped with their sequence numbers.
    pub events: Vec<TraceEvent>,
}

/// Commit a plan: build the batch, apply it atomically, fan out the
/// stamped events.
///
/// `run` is updated in place with any run-terminal decision. A store
/// rejection (uniqueness, transition, internal) is surfaced unchanged;
/// the caller quarantines the run.
pub async fn apply(
    plan: Plan,
    run: &mut RunRecord,
    store: &dyn RunStore,
    hub: &EventHub,
) -> Result<Applied, CoordinatorError> {
    let mut batch = ApplyBatch::new();

    for decision in &plan.decisions {
        match decision {
            Decision::CreateToken(record) => batch.tokens.push(record.clone()),
            Decision::SetTokenStatus { token_id, .. } => {
                let Some(record) = plan.tokens_after.iter().find(|t| t.id == *token_id) else {
                    return Err(CoordinatorError::Internal(format!(
                        "plan updates unknown token {token_id}"
                    )));
                };
                batch.tokens.push(record.clone());
            }
            Decision::CompleteRun { final_output } => {
                run.status = RunStatus::Completed;
                run.final_output = Some(final_output.clone());
                run.updated_at = Utc::now();
            }
            Decision::FailRun { error } => {
                run.status = RunStatus::Failed;
                run.error = Some(error.clone());
                run.updated_at = Utc::now();
            }
        }
    }

    batch.run = Some(run.clone());
    batch.context_pages = context_pages(&plan.context_after);
    batch.events = plan.events;

    let events = store.apply(batch).await?;
    if !events.is_empty() {
        tracing::debug!(
            run_id = %run.id,
            first_sequence = events[0].sequence_number,
            count = events.len(),
            "committed trace events"
        );
        hub.push_trace(&events);
    }

    Ok(Applied {
        context: plan.context_after,
        events,
    })
}

/// Snapshot every context table (including live branch tables) into
/// persistence pages.
fn context_pages(context: &ContextStore) -> Vec<ContextPage> {
    let mut pages = vec![
        page(ContextTable::Input, context.input()),
        page(ContextTable::State, context.state()),
        page(ContextTable::Output, context.output()),
    ];
    for (token, table) in context.branches() {
        pages.push(page(ContextTable::Branch(token), table));
    }
    pages
}

fn page(table: ContextTable, rows: &Map<String, Value>) -> ContextPage {
    ContextPage {
        table,
        rows: rows.clone(),
    }
}
