//! Fan-in synchronization: arrivals, readiness, merge and continuation.

use weft_context::{JsonPath, PathRoot, WriteMode, WritePath};
use weft_core::TokenId;
use weft_definition::TransitionDefinition;
use weft_store::{TokenRecord, TokenStatus};
use weft_trace::TraceEventKind;

use crate::error::ErrorKind;
use crate::planner::{merge, spawn, Pass};

/// Record a sibling's arrival at a synchronized transition and resolve
/// the fan-in if its readiness predicate is now satisfied.
pub(crate) fn record_arrival(
    pass: &mut Pass,
    sibling: &TokenRecord,
    transition: &TransitionDefinition,
) {
    let Some(sync) = transition.synchronization.clone() else {
        return;
    };

    // The arriving token must belong to the group this fan-in resolves.
    let (Some(group), Some(group_name), Some(branch_total)) = (
        sibling.sibling_group_id,
        sibling.sibling_group_name.clone(),
        sibling.branch_total,
    ) else {
        pass.fail_run(
            ErrorKind::Synchronization,
            format!(
                "token {} reached synchronized transition {} outside any sibling group",
                sibling.id, transition.transition_ref
            ),
            Some(sibling.id),
            Some(sibling.node_ref.clone()),
            None,
        );
        return;
    };
    if group_name != sync.sibling_group {
        pass.fail_run(
            ErrorKind::Synchronization,
            format!(
                "transition {} synchronizes group {:?} but token {} belongs to {:?}",
                transition.transition_ref, sync.sibling_group, sibling.id, group_name
            ),
            Some(sibling.id),
            Some(sibling.node_ref.clone()),
            None,
        );
        return;
    }

    // The arrival token: waiting at the fan-in, inheriting the sibling's
    // group coordinates so readiness can be judged from token rows alone.
    let mut arrival = spawn::child_token(pass, sibling, transition);
    arrival.status = TokenStatus::WaitingAtFanIn;
    arrival.sibling_group_id = Some(group);
    arrival.sibling_group_name = Some(group_name);
    arrival.fan_out_transition_ref = sibling.fan_out_transition_ref.clone();
    arrival.branch_index = sibling.branch_index;
    arrival.branch_total = Some(branch_total);
    arrival.arrived_via = Some(transition.transition_ref.clone());
    let arrival_id = arrival.id;
    if !pass.create_token(arrival) {
        return;
    }

    // Arrivals of this group through this transition, in branch order.
    // Tracking is per `(group, transition)`: a second fan-in over the
    // same group counts its own arrivals independently.
    let mut contributing: Vec<TokenRecord> = pass
        .tokens
        .iter()
        .filter(|t| {
            t.sibling_group_id == Some(group)
                && t.arrived_via.as_ref() == Some(&transition.transition_ref)
                && t.status == TokenStatus::WaitingAtFanIn
        })
        .cloned()
        .collect();
    contributing.sort_by_key(|t| t.branch_index);

    let arrivals = u32::try_from(contributing.len()).unwrap_or(u32::MAX);
    pass.rec.push(TraceEventKind::SyncArrival {
        sibling_group: group,
        token_id: arrival_id,
        arrivals,
        branch_total,
    });

    if !sync.strategy.is_ready(arrivals, branch_total) {
        return;
    }

    pass.rec.push(TraceEventKind::SyncReady {
        sibling_group: group,
        arrivals: contributing.iter().map(|t| t.id).collect(),
    });

    // `any` / `m_of_n`: the losers are cancelled before the continuation
    // exists; their late replies will be discarded.
    if sync.strategy.cancels_stragglers() {
        let contributing_ids: Vec<TokenId> = contributing.iter().map(|t| t.id).collect();
        let stragglers: Vec<TokenId> = pass
            .tokens
            .iter()
            .filter(|t| {
                t.sibling_group_id == Some(group)
                    && t.status.is_active()
                    && !contributing_ids.contains(&t.id)
            })
            .map(|t| t.id)
            .collect();
        for id in stragglers {
            pass.set_status(id, TokenStatus::Cancelled, "fan_in_resolved");
        }
    }

    if let Some(merge_spec) = &sync.merge {
        if let Err(message) = perform_merge(pass, group, merge_spec, &contributing) {
            pass.fail_run(
                ErrorKind::Synchronization,
                message,
                Some(arrival_id),
                Some(transition.to_node_ref.clone()),
                None,
            );
            return;
        }
    }

    // Exactly one continuation token carries execution past the fan-in.
    let first_arrival = &contributing[0];
    let mut continuation = spawn::child_token(pass, first_arrival, transition);
    continuation.parent_token_id = Some(first_arrival.id);
    if !pass.create_token(continuation) {
        return;
    }

    for token in &contributing {
        pass.set_status(token.id, TokenStatus::Completed, "fan_in_resolved");
    }
}

/// Collect each contributing branch's source value and project the merged
/// result into shared context.
fn perform_merge(
    pass: &mut Pass,
    group: weft_core::SiblingGroupId,
    spec: &weft_definition::MergeSpec,
    contributing: &[TokenRecord],
) -> Result<(), String> {
    let source = JsonPath::parse(&spec.source)
        .map_err(|err| format!("merge source {:?}: {err}", spec.source))?;
    if source.root() != PathRoot::Branch {
        return Err(format!(
            "merge source {:?} must be rooted at _branch",
            spec.source
        ));
    }

    let mut contributions: Vec<(u32, Option<serde_json::Value>)> = Vec::new();
    for arrival in contributing {
        // The branch table belongs to the sibling that produced the
        // output; the arrival is its child.
        let Some(owner) = arrival.parent_token_id else {
            return Err(format!("arrival {} has no parent sibling", arrival.id));
        };
        let value = pass.ctx.branch_value(owner, &source);
        if value.is_none() {
            tracing::debug!(
                arrival = %arrival.id,
                source = %spec.source,
                "merge source undefined for branch, omitting"
            );
        }
        contributions.push((arrival.branch_index.unwrap_or(0), value));
    }

    let merged = match &spec.strategy {
        weft_definition::MergeStrategy::Custom(name) => {
            let custom = pass
                .merge_registry
                .get(name)
                .ok_or_else(|| format!("unknown custom merge strategy {name:?}"))?;
            custom(&contributions)?
        }
        builtin => merge::merge_values(builtin, &contributions)?,
    };
    pass.rec.push(TraceEventKind::SyncMerge {
        sibling_group: group,
        target: spec.target.clone(),
        strategy: spec.strategy.name().to_owned(),
    });

    let target =
        WritePath::parse(&spec.target).map_err(|err| format!("merge target: {err}"))?;
    pass.ctx
        .write(&target, merged, WriteMode::Set, &mut pass.rec)
        .map_err(|err| format!("merge write to {}: {err}", spec.target))?;
    Ok(())
}
