//! Schema validation errors.

use thiserror::Error;

/// A single constraint violation found during validation.
///
/// `path` is a JSON pointer (`""` for the root, `"/a/0/b"` below it) into
/// the validated value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON pointer to the offending location.
    pub path: String,
    /// Human-readable description of the violated constraint.
    pub message: String,
}

impl Violation {
    /// Create a violation at the given pointer.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Errors produced by schema validation and schema path resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The value violated one or more constraints.
    #[error("schema violation: {}", format_violations(.0))]
    Violations(Vec<Violation>),

    /// A write path is not admitted by the schema.
    #[error("path {path} is not admitted by the schema (denied at {denied_at})")]
    PathDenied {
        /// The dotted path that was being resolved.
        path: String,
        /// The segment at which resolution was denied.
        denied_at: String,
    },
}

impl SchemaError {
    /// The violations carried by this error, if any.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Violations(v) => v,
            Self::PathDenied { .. } => &[],
        }
    }
}

fn format_violations(violations: &[Violation]) -> String {
    let mut out = String::new();
    for (i, v) in violations.iter().enumerate() {
        if i > 0 {
            out.push_str("; ");
        }
        out.push_str(&v.to_string());
    }
    out
}
