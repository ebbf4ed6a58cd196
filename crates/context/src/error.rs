//! Context store errors.

use thiserror::Error;
use weft_schema::SchemaError;

/// Errors raised by context reads, writes and mapping application.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContextError {
    /// A path could not be parsed or does not target a writable location.
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The offending path as written.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A write targeted the immutable `input` table.
    #[error("path {0} targets the immutable input table")]
    ImmutableInput(String),

    /// A value failed validation against its governing schema subtree.
    #[error(transparent)]
    SchemaViolation(#[from] SchemaError),

    /// The input table was written more than once.
    #[error("context already initialized")]
    AlreadyInitialized,

    /// A branch-scoped operation named a token with no branch table.
    #[error("no branch table for token {0}")]
    MissingBranch(weft_core::TokenId),
}

impl ContextError {
    /// Create an invalid-path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
