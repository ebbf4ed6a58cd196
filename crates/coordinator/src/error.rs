//! The coordinator error taxonomy.
//!
//! Errors are classified by source: authoring (schemas, paths,
//! definitions), task (executor-reported), synchronization (merges),
//! transport (executor unreachable / timed out) and internal invariants.
//! Token-scoped errors fail the token; workflow-scoped errors fail the
//! run immediately.

use thiserror::Error;
use weft_context::ContextError;
use weft_core::{NodeRef, TokenId};
use weft_definition::DefinitionError;
use weft_executor::{TaskFailure, TransportError};
use weft_resource::ResourceError;
use weft_schema::SchemaError;
use weft_store::{RunError, StoreError};

/// The structured kind attached to every failure the coordinator reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A value violated a schema (input, state, task payloads, output).
    SchemaViolation,
    /// A path could not be resolved to a writable location.
    InvalidPath,
    /// A definition was missing or malformed.
    Definition,
    /// The executor reported a task failure.
    Task,
    /// A merge or fan-in could not be resolved.
    Synchronization,
    /// The executor was unreachable.
    Transport,
    /// A node or workflow deadline expired.
    Timeout,
    /// The run owner cancelled the run.
    Cancelled,
    /// An internal invariant was violated; the run is quarantined.
    Internal,
}

impl ErrorKind {
    /// The kind's wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaViolation => "schema_violation",
            Self::InvalidPath => "invalid_path",
            Self::Definition => "definition",
            Self::Task => "task",
            Self::Synchronization => "synchronization",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the coordinator's components.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinatorError {
    /// An authoring-time schema violation.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A context path or write failure.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// A definition failed its loader checks.
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// A definition lookup failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// The store rejected an operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The executor transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The executor reported a task failure.
    #[error("task failed: {0}")]
    Task(TaskFailure),

    /// A merge could not be executed.
    #[error("synchronization: {0}")]
    Synchronization(String),

    /// The run is not in a state that admits the operation.
    #[error("run {0} is not active")]
    RunNotActive(weft_core::RunId),

    /// The run was not found.
    #[error("run {0} not found")]
    RunNotFound(weft_core::RunId),

    /// The token ceiling was hit.
    #[error("token limit {0} exceeded")]
    TokenLimitExceeded(usize),

    /// An internal invariant was violated.
    #[error("internal: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Classify this error into the reportable taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Schema(_) => ErrorKind::SchemaViolation,
            Self::Context(ContextError::SchemaViolation(_)) => ErrorKind::SchemaViolation,
            Self::Context(_) => ErrorKind::InvalidPath,
            Self::Definition(_) | Self::Resource(_) => ErrorKind::Definition,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Task(_) => ErrorKind::Task,
            Self::Synchronization(_) => ErrorKind::Synchronization,
            Self::RunNotActive(_) | Self::RunNotFound(_) => ErrorKind::Internal,
            Self::TokenLimitExceeded(_) | Self::Internal(_) | Self::Store(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Build the user-visible [`RunError`] row for a failure.
#[must_use]
pub fn run_error(
    kind: ErrorKind,
    message: impl Into<String>,
    token_id: Option<TokenId>,
    node_ref: Option<NodeRef>,
    retryable_attempts_used: Option<u32>,
) -> RunError {
    RunError {
        kind: kind.as_str().to_owned(),
        message: message.into(),
        token_id,
        node_ref,
        retryable_attempts_used,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_wire_names() {
        assert_eq!(ErrorKind::SchemaViolation.as_str(), "schema_violation");
        assert_eq!(ErrorKind::Task.to_string(), "task");
        assert_eq!(ErrorKind::Internal.as_str(), "internal");
    }

    #[test]
    fn classification() {
        let err = CoordinatorError::from(SchemaError::Violations(vec![]));
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);

        let err = CoordinatorError::from(ContextError::invalid_path("x", "nope"));
        assert_eq!(err.kind(), ErrorKind::InvalidPath);

        let err = CoordinatorError::from(TransportError::new("down"));
        assert_eq!(err.kind(), ErrorKind::Transport);

        let err = CoordinatorError::Task(TaskFailure::fatal("step_failure", "boom"));
        assert_eq!(err.kind(), ErrorKind::Task);

        let err = CoordinatorError::from(StoreError::Internal("bad".into()));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn run_error_shape() {
        let token = TokenId::v4();
        let err = run_error(ErrorKind::Task, "boom", Some(token), None, Some(2));
        assert_eq!(err.kind, "task");
        assert_eq!(err.token_id, Some(token));
        assert_eq!(err.retryable_attempts_used, Some(2));
    }
}
