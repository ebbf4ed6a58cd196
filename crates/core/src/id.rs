//! Unique identifiers for weft entities.
//!
//! Strongly-typed UUID identifiers for the entities the coordinator owns.
//! Each identifier is a distinct newtype over [`uuid::Uuid`], so a
//! [`TokenId`] can never be passed where a [`RunId`] is expected.
//!
//! All ID types are `Copy` (16 bytes, stack-allocated) and support:
//! - `v4()` for random generation
//! - `nil()` for the zero-valued default
//! - `parse(&str)` for string parsing
//! - Full serde support (serializes as a UUID string)
//! - `Display`, `FromStr`, `Eq`, `Ord`, `Hash`

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error returned when parsing an identifier from a string fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} identifier: {source}")]
pub struct IdParseError {
    /// The identifier type that failed to parse.
    pub kind: &'static str,
    /// The underlying UUID parse error.
    #[source]
    pub source: uuid::Error,
}

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random (v4) identifier.
            #[must_use]
            pub fn v4() -> Self {
                Self(Uuid::new_v4())
            }

            /// The zero-valued identifier.
            #[must_use]
            pub const fn nil() -> Self {
                Self(Uuid::nil())
            }

            /// Returns `true` if this is the zero-valued identifier.
            #[must_use]
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            /// Parse an identifier from its string form.
            pub fn parse(s: &str) -> Result<Self, IdParseError> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|source| IdParseError {
                        kind: stringify!($name),
                        source,
                    })
            }

            /// Wrap a raw UUID.
            #[must_use]
            pub const fn new(raw: Uuid) -> Self {
                Self(raw)
            }

            /// The underlying UUID.
            #[must_use]
            pub const fn get(&self) -> Uuid {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<Uuid> for $name {
            fn from(raw: Uuid) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifies one workflow run.
    RunId
);
define_id!(
    /// Identifies one token within a run.
    TokenId
);
define_id!(
    /// Identifies a set of sibling tokens spawned by one fan-out.
    SiblingGroupId
);
define_id!(
    /// Identifies one event-stream subscription.
    SubscriptionId
);
