#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Definition
//!
//! The authored artifact model: what the definition store hands the
//! coordinator, immutable per `(ref, revision)`.
//!
//! - [`WorkflowDefinition`] — the graph: nodes, transitions, schemas and
//!   the final output projection
//! - [`NodeDefinition`] — one task invocation site with its input/output
//!   mappings
//! - [`TransitionDefinition`] — routing (priority, [`Condition`]),
//!   spawning ([`SpawnMode`]) and fan-in ([`Synchronization`],
//!   [`MergeSpec`])
//! - [`TaskDefinition`] — task contracts plus retry/timeout policy
//! - [`validate_workflow`] — the loader checks the coordinator insists on

pub mod condition;
pub mod error;
pub mod task;
pub mod transition;
pub mod validate;
pub mod workflow;

pub use condition::{Condition, Predicate};
pub use error::DefinitionError;
pub use task::{RetryPolicy, TaskDefinition};
pub use transition::{
    Foreach, MergeSpec, MergeStrategy, SpawnMode, SyncStrategy, Synchronization,
    TransitionDefinition,
};
pub use validate::validate_workflow;
pub use workflow::{Mapping, NodeDefinition, WorkflowDefinition};
