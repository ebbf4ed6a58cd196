//! Transition firing on node completion.

use serde_json::Value;
use weft_context::{JsonPath, PathRoot};
use weft_definition::TransitionDefinition;
use weft_store::TokenRecord;
use weft_trace::TraceEventKind;

use crate::error::ErrorKind;
use crate::planner::{spawn, Pass};

/// Fire the outgoing transitions of the completed token's node.
///
/// Transitions are evaluated in `(priority asc, ref asc)` order against
/// one snapshot taken at the start of the pass. Every transition at
/// priority 0 that matches fires (the parallel group); otherwise the
/// first match wins and later candidates are recorded as superseded.
pub(crate) fn fire_transitions(pass: &mut Pass, completed: &TokenRecord) {
    if pass.terminal {
        return;
    }
    let outgoing: Vec<TransitionDefinition> = pass
        .definition
        .outgoing(&completed.node_ref)
        .into_iter()
        .cloned()
        .collect();
    if outgoing.is_empty() {
        return;
    }

    // One consistent view for every condition and collection in this pass.
    let branch_scope = (completed.in_sibling_group() && !completed.is_arrival())
        .then_some(completed.id);
    let snapshot = pass.ctx.snapshot(branch_scope, &mut pass.rec);

    let mut fired: Vec<(TransitionDefinition, Option<Vec<Value>>)> = Vec::new();
    let mut winner_above_zero = false;

    for transition in outgoing {
        if pass.terminal {
            return;
        }
        // A winner above priority 0 supersedes everything after it, and
        // any firing at all supersedes the non-zero priorities.
        if transition.priority > 0 && (winner_above_zero || !fired.is_empty()) {
            pass.rec.push(TraceEventKind::RoutingNoMatch {
                transition_ref: transition.transition_ref.clone(),
                reason: "superseded".into(),
            });
            continue;
        }

        match evaluate(&transition, &snapshot) {
            Ok(Evaluation::Match { foreach_items }) => {
                pass.rec.push(TraceEventKind::RoutingMatch {
                    transition_ref: transition.transition_ref.clone(),
                    from_node: transition.from_node_ref.clone(),
                    to_node: transition.to_node_ref.clone(),
                });
                if transition.priority > 0 {
                    winner_above_zero = true;
                }
                fired.push((transition, foreach_items));
            }
            Ok(Evaluation::NoMatch { reason }) => {
                pass.rec.push(TraceEventKind::RoutingNoMatch {
                    transition_ref: transition.transition_ref.clone(),
                    reason,
                });
            }
            Err(message) => {
                pass.fail_run(
                    ErrorKind::InvalidPath,
                    message,
                    Some(completed.id),
                    Some(completed.node_ref.clone()),
                    None,
                );
                return;
            }
        }
    }

    for (transition, foreach_items) in fired {
        if pass.terminal {
            return;
        }
        spawn::spawn_for_transition(pass, completed, &transition, foreach_items);
    }
}

enum Evaluation {
    Match { foreach_items: Option<Vec<Value>> },
    NoMatch { reason: String },
}

/// A transition matches iff its condition holds (or is absent) and its
/// `foreach` collection (if any) resolves to a non-empty array.
fn evaluate(transition: &TransitionDefinition, snapshot: &Value) -> Result<Evaluation, String> {
    if let Some(condition) = &transition.condition {
        let path = JsonPath::parse(&condition.path)
            .map_err(|err| format!("condition path on {}: {err}", transition.transition_ref))?;
        let resolved = resolve_in_snapshot(&path, snapshot);
        if !condition.predicate.matches(resolved) {
            return Ok(Evaluation::NoMatch {
                reason: "condition_false".into(),
            });
        }
    }

    if let Some(foreach) = &transition.foreach {
        let path = JsonPath::parse(&foreach.collection)
            .map_err(|err| format!("foreach collection on {}: {err}", transition.transition_ref))?;
        let items = resolve_in_snapshot(&path, snapshot).and_then(|v| v.as_array().cloned());
        match items {
            Some(items) if !items.is_empty() => {
                return Ok(Evaluation::Match {
                    foreach_items: Some(items),
                });
            }
            // Undefined, not an array, or empty: nothing to spawn.
            _ => {
                return Ok(Evaluation::NoMatch {
                    reason: "empty_collection".into(),
                });
            }
        }
    }

    Ok(Evaluation::Match {
        foreach_items: None,
    })
}

/// Resolve a path against the snapshot, which already embeds the token's
/// branch table under `_branch` when one is in scope.
fn resolve_in_snapshot<'a>(path: &JsonPath, snapshot: &'a Value) -> Option<&'a Value> {
    match path.root() {
        PathRoot::Composite => path.resolve(snapshot),
        PathRoot::Branch => path.resolve(snapshot.get("_branch")?),
    }
}
