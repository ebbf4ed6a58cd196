#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Coordinator
//!
//! The coordinator drives workflow runs: it owns token lifecycle,
//! schedules node dispatch, resolves fan-out/fan-in with branch-isolated
//! merges, maintains the per-run context and produces the totally
//! ordered trace.
//!
//! The shape of the machine:
//!
//! - [`planner`] — a pure function from run state and a [`Trigger`] to a
//!   [`Plan`]: decisions plus the trace events explaining them
//! - [`applier`] — commits one plan as one atomic store batch; the only
//!   writer of tokens, run state and trace; stamps sequence numbers
//! - [`dispatcher`] — composes task inputs and drives pending tokens
//!   into the executor, enforcing schemas, retry policies and timeouts
//! - [`actor`] — the single-writer actor owning one run; executor
//!   replies and timers marshal back through its mailbox
//! - [`Coordinator`] — the multi-run service surface: `start_run`,
//!   `get_run`, `cancel_run`, subscriptions and trace queries
//!
//! Parallelism exists across runs and across in-flight executor calls,
//! never within a run's write path.

pub mod actor;
pub mod applier;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod plan;
pub mod planner;
pub mod service;
pub mod trigger;

pub use actor::RunHandle;
pub use config::{CoordinatorConfig, MergeFn, MergeRegistry};
pub use error::{CoordinatorError, ErrorKind};
pub use plan::{Decision, Plan};
pub use planner::{plan, PlannerInput};
pub use service::{Coordinator, StoreFactory};
pub use trigger::Trigger;
