//! Definition loader checks.

use std::collections::HashSet;

use crate::error::DefinitionError;
use crate::transition::SyncStrategy;
use crate::workflow::WorkflowDefinition;

/// Validate a workflow definition on load.
///
/// Rejects the malformed shapes the coordinator cannot tolerate: dangling
/// node references, duplicate refs, `spawn_count = 0`, conflicting spawn
/// modes, zero quorums, and transitions that try to both spawn and
/// synchronize.
pub fn validate_workflow(def: &WorkflowDefinition) -> Result<(), DefinitionError> {
    let mut node_refs = HashSet::new();
    for node in &def.nodes {
        if !node_refs.insert(&node.node_ref) {
            return Err(DefinitionError::DuplicateNode(node.node_ref.clone()));
        }
    }

    if !node_refs.contains(&def.initial_node_ref) {
        return Err(DefinitionError::UnknownInitialNode(
            def.initial_node_ref.clone(),
        ));
    }

    let mut transition_refs = HashSet::new();
    for transition in &def.transitions {
        if !transition_refs.insert(&transition.transition_ref) {
            return Err(DefinitionError::DuplicateTransition(
                transition.transition_ref.clone(),
            ));
        }

        for node_ref in [&transition.from_node_ref, &transition.to_node_ref] {
            if !node_refs.contains(node_ref) {
                return Err(DefinitionError::UnknownNode {
                    transition_ref: transition.transition_ref.clone(),
                    node_ref: node_ref.clone(),
                });
            }
        }

        if transition.spawn_count == Some(0) {
            return Err(DefinitionError::ZeroSpawnCount(
                transition.transition_ref.clone(),
            ));
        }
        if transition.spawn_count.is_some() && transition.foreach.is_some() {
            return Err(DefinitionError::ConflictingSpawnModes(
                transition.transition_ref.clone(),
            ));
        }
        if transition.is_spawning() && transition.synchronization.is_some() {
            return Err(DefinitionError::SpawnAndSync(
                transition.transition_ref.clone(),
            ));
        }
        if let Some(sync) = &transition.synchronization {
            if sync.strategy == (SyncStrategy::MOfN { m: 0 }) {
                return Err(DefinitionError::ZeroQuorum(
                    transition.transition_ref.clone(),
                ));
            }
        }
    }

    Ok(())
}
