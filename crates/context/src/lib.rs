#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Context
//!
//! The typed per-run data plane of the weft coordinator.
//!
//! - [`ContextStore`] — the three shared tables (`input` write-once,
//!   `state`, `output`) plus per-token branch tables, with every
//!   operation traced from inside the store
//! - [`JsonPath`] — read paths over the composite `{input, state,
//!   output}` root (and `_branch` within a token scope); undefined is
//!   distinct from `null`
//! - [`WritePath`] / [`WriteMode`] — dotted writes into `state`/`output`
//!   with `set`/`merge` semantics, creating intermediate objects
//! - [`compose_object`] — mapping-table projection used for task inputs
//!   and the final output

pub mod error;
pub mod path;
pub mod store;

pub use error::ContextError;
pub use path::{parse_key_path, JsonPath, PathRoot, Segment, WriteMode, WriteNamespace, WritePath};
pub use store::{compose_object, ContextStore, MappingTarget};
