//! Store errors.
//!
//! Backend drivers map their internal failures into these variants. Any
//! rejection of an apply batch is fatal to the affected run — the
//! coordinator quarantines it as `failed(internal)` rather than retrying
//! blind.

use thiserror::Error;
use weft_core::TokenId;

/// Error type for all store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity (e.g. `"run"`, `"token"`).
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A uniqueness constraint was violated.
    #[error("unique violation on {entity}: {detail}")]
    UniqueViolation {
        /// Kind of entity.
        entity: &'static str,
        /// Which constraint, and the offending key.
        detail: String,
    },

    /// A token status transition outside the admitted table.
    #[error("invalid token transition from {from} to {to}")]
    InvalidTransition {
        /// Status before.
        from: String,
        /// Attempted status after.
        to: String,
    },

    /// An update targeted a token already in terminal status.
    #[error("token {0} is terminal and immutable")]
    TerminalTokenImmutable(TokenId),

    /// The trace sequence would not be contiguous.
    #[error("sequence gap: expected {expected}, found {found}")]
    SequenceGap {
        /// Next sequence the store expected to assign.
        expected: u64,
        /// Sequence that was observed instead.
        found: u64,
    },

    /// Serialization or deserialization failure.
    #[error("serialization: {0}")]
    Serialization(String),

    /// Catch-all internal error.
    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Convenience constructor for [`StoreError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = StoreError::not_found("run", "abc");
        assert_eq!(err.to_string(), "run not found: abc");
    }

    #[test]
    fn unique_violation_display() {
        let err = StoreError::UniqueViolation {
            entity: "token",
            detail: "duplicate id".into(),
        };
        assert!(err.to_string().contains("duplicate id"));
    }

    #[test]
    fn from_serde_error() {
        let serde_err = serde_json::from_str::<String>("{").unwrap_err();
        let err = StoreError::from(serde_err);
        assert!(err.to_string().starts_with("serialization:"));
    }
}
