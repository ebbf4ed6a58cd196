#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Core
//!
//! Core identifier and reference types for the weft workflow engine.
//!
//! Every other weft crate builds on the types defined here:
//!
//! - **Identifiers**: [`RunId`], [`TokenId`], [`SiblingGroupId`],
//!   [`SubscriptionId`] — typed UUIDs for runtime entities.
//! - **Reference keys**: [`NodeRef`], [`TransitionRef`], [`TaskRef`],
//!   [`DefinitionRef`] — validated author-chosen names for definition
//!   parts, with lexicographic ordering used for deterministic
//!   tie-breaking.
//! - **[`Revision`]** — immutable definition versioning.

pub mod id;
pub mod refs;
pub mod revision;

pub use id::{IdParseError, RunId, SiblingGroupId, SubscriptionId, TokenId};
pub use refs::{DefinitionRef, NodeRef, RefError, TaskRef, TransitionRef, MAX_REF_LEN};
pub use revision::Revision;
