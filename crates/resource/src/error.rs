//! Resource lookup errors.

use thiserror::Error;
use weft_core::Revision;

/// The kinds of definition the catalog serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A workflow definition.
    Workflow,
    /// A task definition.
    Task,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Workflow => f.write_str("workflow"),
            Self::Task => f.write_str("task"),
        }
    }
}

/// Errors from the definition catalog and the resource gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// No definition with the given reference and revision.
    #[error("{kind} definition not found: {reference} {revision}")]
    NotFound {
        /// The definition kind.
        kind: ResourceKind,
        /// The looked-up reference.
        reference: String,
        /// The looked-up revision.
        revision: Revision,
    },

    /// Backend failure in the catalog.
    #[error("catalog error: {0}")]
    Catalog(String),
}

impl ResourceError {
    /// Convenience constructor for [`ResourceError::NotFound`].
    pub fn not_found(kind: ResourceKind, reference: impl Into<String>, revision: Revision) -> Self {
        Self::NotFound {
            kind,
            reference: reference.into(),
            revision,
        }
    }
}
