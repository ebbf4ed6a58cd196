//! Reference keys for authored artifacts.
//!
//! Definitions address their parts by author-chosen string references:
//! nodes by [`NodeRef`], transitions by [`TransitionRef`], tasks by
//! [`TaskRef`], whole workflow definitions by [`DefinitionRef`]. Each kind
//! is a distinct newtype over a validated string so a transition ref cannot
//! be used where a node ref is expected, and so that lexicographic ordering
//! (used for deterministic tie-breaking) is part of the type's contract.
//!
//! A valid reference is 1..=128 characters of ASCII alphanumerics plus
//! `_`, `-` and `.`.

use serde::{Deserialize, Serialize};

/// Maximum length of a reference key in characters.
pub const MAX_REF_LEN: usize = 128;

/// Error returned when a reference key fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefError {
    /// The reference was empty.
    #[error("{kind} reference must not be empty")]
    Empty {
        /// The reference kind (e.g. `"node"`).
        kind: &'static str,
    },

    /// The reference exceeded [`MAX_REF_LEN`].
    #[error("{kind} reference is {len} characters, max is {MAX_REF_LEN}")]
    TooLong {
        /// The reference kind.
        kind: &'static str,
        /// Actual length in characters.
        len: usize,
    },

    /// The reference contained a character outside the allowed set.
    #[error("{kind} reference contains invalid character {ch:?}")]
    InvalidChar {
        /// The reference kind.
        kind: &'static str,
        /// The offending character.
        ch: char,
    },
}

fn validate(kind: &'static str, s: &str) -> Result<(), RefError> {
    if s.is_empty() {
        return Err(RefError::Empty { kind });
    }
    if s.len() > MAX_REF_LEN {
        return Err(RefError::TooLong { kind, len: s.len() });
    }
    if let Some(ch) = s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(RefError::InvalidChar { kind, ch });
    }
    Ok(())
}

macro_rules! define_ref {
    ($(#[$doc:meta])* $name:ident, $kind:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create a reference, validating the key format.
            pub fn new(s: impl Into<String>) -> Result<Self, RefError> {
                let s = s.into();
                validate($kind, &s)?;
                Ok(Self(s))
            }

            /// The reference as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = RefError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = RefError;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(r: $name) -> Self {
                r.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

define_ref!(
    /// Reference to a node within a workflow definition.
    NodeRef,
    "node"
);
define_ref!(
    /// Reference to a transition within a workflow definition.
    TransitionRef,
    "transition"
);
define_ref!(
    /// Reference to a task definition in the catalog.
    TaskRef,
    "task"
);
define_ref!(
    /// Reference to a workflow definition in the catalog.
    DefinitionRef,
    "definition"
);
