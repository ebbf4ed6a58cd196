//! Transition conditions.
//!
//! A condition pairs a JSONPath into the run snapshot with a predicate
//! over the resolved value. Resolution happens in the context layer; this
//! module only judges the resolved value, so condition evaluation stays a
//! pure function of the snapshot.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Predicate applied to a resolved snapshot value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// True when the value is defined and truthy (not `null`, `false`,
    /// `0`, `""`, `[]` or `{}`).
    Truthy,
    /// True when the path resolves to any value, including `null`.
    Exists,
    /// True when the value equals the given JSON value.
    Eq(Value),
    /// True when the value does not equal the given JSON value.
    /// An undefined value is considered unequal.
    Ne(Value),
    /// True when the value is a number greater than the given number.
    Gt(f64),
    /// True when the value is a number less than the given number.
    Lt(f64),
}

impl Predicate {
    /// Judge a resolved value. `None` means the path was undefined.
    #[must_use]
    pub fn matches(&self, resolved: Option<&Value>) -> bool {
        match self {
            Self::Truthy => resolved.is_some_and(is_truthy),
            Self::Exists => resolved.is_some(),
            Self::Eq(expected) => resolved == Some(expected),
            Self::Ne(expected) => resolved != Some(expected),
            Self::Gt(bound) => resolved.and_then(Value::as_f64).is_some_and(|n| n > *bound),
            Self::Lt(bound) => resolved.and_then(Value::as_f64).is_some_and(|n| n < *bound),
        }
    }
}

/// A transition condition: a snapshot path and a predicate over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// JSONPath into the composite snapshot root.
    pub path: String,
    /// Predicate applied to the resolved value.
    pub predicate: Predicate,
}

impl Condition {
    /// A truthiness check on a path.
    #[must_use]
    pub fn truthy(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            predicate: Predicate::Truthy,
        }
    }

    /// An equality check on a path.
    #[must_use]
    pub fn eq(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            predicate: Predicate::Eq(value),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
