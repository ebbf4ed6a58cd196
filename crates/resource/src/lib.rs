#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Resource
//!
//! Read-only access to authored definitions.
//!
//! - [`DefinitionCatalog`] — the port to the external definition store;
//!   returned definitions are immutable per `(reference, revision)`
//! - [`ResourceGateway`] — the per-run caching facade the coordinator
//!   resolves nodes and tasks through
//! - [`MemoryCatalog`] — in-memory catalog for embedding and tests

pub mod catalog;
pub mod error;
pub mod gateway;
pub mod memory;

pub use catalog::DefinitionCatalog;
pub use error::{ResourceError, ResourceKind};
pub use gateway::{GatewayStats, ResourceGateway};
pub use memory::MemoryCatalog;
