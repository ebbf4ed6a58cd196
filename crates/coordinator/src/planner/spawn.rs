//! Token spawning for firing transitions.

use chrono::Utc;
use serde_json::Value;
use weft_core::{SiblingGroupId, TokenId};
use weft_definition::{SpawnMode, TransitionDefinition};
use weft_store::{TokenRecord, TokenStatus};

use crate::planner::{sync, Pass};

/// Produce tokens for one firing transition.
pub(crate) fn spawn_for_transition(
    pass: &mut Pass,
    parent: &TokenRecord,
    transition: &TransitionDefinition,
    foreach_items: Option<Vec<Value>>,
) {
    match transition.spawn_mode() {
        SpawnMode::Single => {
            if transition.synchronization.is_some() {
                sync::record_arrival(pass, parent, transition);
            } else {
                let token = child_token(pass, parent, transition);
                pass.create_token(token);
            }
        }
        SpawnMode::Fanout { count } => {
            spawn_siblings(pass, parent, transition, count, None);
        }
        SpawnMode::Foreach { item_var, .. } => {
            // Routing resolved the collection; an empty or undefined one
            // never fires.
            let items = foreach_items.unwrap_or_default();
            let total = u32::try_from(items.len()).unwrap_or(u32::MAX);
            spawn_siblings(pass, parent, transition, total, Some((item_var, items)));
        }
    }
}

/// Create `count` siblings atomically: the `tokens.create` events stay
/// contiguous, item-variable bindings are written after the whole group
/// exists.
fn spawn_siblings(
    pass: &mut Pass,
    parent: &TokenRecord,
    transition: &TransitionDefinition,
    count: u32,
    foreach: Option<(String, Vec<Value>)>,
) {
    let group = SiblingGroupId::v4();
    let group_name = transition.spawn_group_name();
    let mut created: Vec<TokenId> = Vec::with_capacity(count as usize);

    for index in 0..count {
        let mut token = child_token(pass, parent, transition);
        token.sibling_group_id = Some(group);
        token.sibling_group_name = Some(group_name.clone());
        token.fan_out_transition_ref = Some(transition.transition_ref.clone());
        token.branch_index = Some(index);
        token.branch_total = Some(count);
        let id = token.id;
        if !pass.create_token(token) {
            return;
        }
        created.push(id);
    }

    if let Some((item_var, items)) = foreach {
        let segments = vec![item_var];
        for (token_id, item) in created.into_iter().zip(items) {
            // Snapshot-bound binding of the item variable, exposed to the
            // sibling through its branch table.
            if let Err(err) = pass.ctx.write_branch(
                token_id,
                &segments,
                item,
                weft_context::WriteMode::Set,
                &mut pass.rec,
            ) {
                pass.fail_run(
                    crate::error::ErrorKind::InvalidPath,
                    err.to_string(),
                    Some(token_id),
                    Some(transition.to_node_ref.clone()),
                    None,
                );
                return;
            }
        }
    }
}

/// A fresh pending child of `parent` at the transition's destination.
pub(crate) fn child_token(
    pass: &Pass,
    parent: &TokenRecord,
    transition: &TransitionDefinition,
) -> TokenRecord {
    let now = Utc::now();
    TokenRecord {
        id: TokenId::v4(),
        run_id: pass.run_id,
        node_ref: transition.to_node_ref.clone(),
        status: TokenStatus::Pending,
        parent_token_id: Some(parent.id),
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
