#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Schema
//!
//! The JSON-Schema subset used to type workflow inputs, context state,
//! task payloads and final outputs.
//!
//! - [`Schema`] — the declarative model (type keyword, object properties,
//!   `required`, `additionalProperties`, array `items`, `enum`, `nullable`)
//! - [`validate`] / [`check`] — full-value validation with JSON-pointer
//!   addressed [`Violation`]s
//! - [`locate`] — resolve the subschema governing a dotted write path, so
//!   the context store can validate only the subtree a write touches

pub mod error;
pub mod schema;
pub mod validate;

pub use error::{SchemaError, Violation};
pub use schema::{Schema, SchemaType};
pub use validate::{check, locate, validate, Located};
