#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Trace
//!
//! The observability vocabulary of the weft coordinator.
//!
//! - [`TraceEventKind`] / [`TraceEvent`] — the closed set of internal
//!   operation records, totally ordered per run by sequence number
//! - [`WorkflowEventKind`] / [`WorkflowEvent`] — the coarse lifecycle
//!   stream for subscribers that do not need the inner trace
//! - [`EventHub`] — bounded per-subscriber fan-out with explicit lag-drop
//! - [`MetricsRegistry`] — in-memory counters, gauges and histograms
//!
//! Events on both streams are projections of committed state; the store's
//! trace table is the source of truth.

pub mod event;
pub mod hub;
pub mod metrics;
pub mod recorder;
pub mod workflow_event;

pub use event::{TraceEvent, TraceEventKind};
pub use hub::{EventHub, StreamFrame, StreamKind, SubscriptionFilter};
pub use metrics::{Counter, Gauge, Histogram, MetricsRegistry};
pub use recorder::Recorder;
pub use workflow_event::{WorkflowEvent, WorkflowEventKind};
