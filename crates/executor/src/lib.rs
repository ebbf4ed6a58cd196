#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Executor
//!
//! The executor side of the coordinator's world, as a port.
//!
//! - [`TaskExecutor`] — invoke a task, get [`ExecutorReply::Completed`]
//!   or [`ExecutorReply::Failed`] with a typed, retryable-aware
//!   [`TaskFailure`]; advisory [`cancel`](TaskExecutor::cancel)
//! - [`TransportError`] — the RPC itself failed; outcome unknown,
//!   retryable by default
//! - [`FnExecutor`] — closure-backed driver for tests and in-process
//!   embedding

pub mod executor;
pub mod invocation;

pub use executor::{BoxedReply, FnExecutor, TaskExecutor, TransportError};
pub use invocation::{ExecutorReply, TaskFailure, TaskInvocation};
