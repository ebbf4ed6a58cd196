//! Definition loading errors.

use thiserror::Error;
use weft_core::{NodeRef, TransitionRef};

/// Errors found while loading a definition from the catalog.
///
/// Full author-time graph validation happens upstream; these are the
/// checks the coordinator still refuses to run without.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// A transition references a node the definition does not contain.
    #[error("transition {transition_ref} references unknown node {node_ref}")]
    UnknownNode {
        /// The referencing transition.
        transition_ref: TransitionRef,
        /// The missing node.
        node_ref: NodeRef,
    },

    /// The initial node does not exist.
    #[error("initial node {0} does not exist")]
    UnknownInitialNode(NodeRef),

    /// Two nodes share a ref.
    #[error("duplicate node ref {0}")]
    DuplicateNode(NodeRef),

    /// Two transitions share a ref.
    #[error("duplicate transition ref {0}")]
    DuplicateTransition(TransitionRef),

    /// A static fan-out declared zero siblings.
    #[error("transition {0} declares spawn_count = 0")]
    ZeroSpawnCount(TransitionRef),

    /// A transition declared both static and dynamic fan-out.
    #[error("transition {0} declares both spawn_count and foreach")]
    ConflictingSpawnModes(TransitionRef),

    /// A synchronization declared `m_of_n` with `m = 0`.
    #[error("transition {0} declares m_of_n with m = 0")]
    ZeroQuorum(TransitionRef),

    /// A transition both spawns and synchronizes.
    #[error("transition {0} both spawns and synchronizes")]
    SpawnAndSync(TransitionRef),
}
