//! Subscriber fan-out for one run's event streams.
//!
//! One producer (the applier's commit hook), many consumers. Each
//! subscriber gets its own bounded buffer; a subscriber that stops
//! draining is dropped with an explicit `subscriber_lagged` frame rather
//! than ever back-pressuring the coordinator. A dropped subscriber
//! reattaches by catching up from the store (`since_sequence`) and
//! subscribing again.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use weft_core::SubscriptionId;

use crate::event::TraceEvent;
use crate::workflow_event::WorkflowEvent;

/// Which of the two per-run streams a subscription follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Coarse workflow lifecycle events.
    Events,
    /// The full internal trace.
    Trace,
}

/// What a subscriber receives: one frame per delivered event, shaped for a
/// WebSocket-style transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stream", rename_all = "snake_case")]
pub enum StreamFrame {
    /// A committed trace event.
    Trace {
        /// The event.
        #[serde(flatten)]
        event: TraceEvent,
    },
    /// A workflow lifecycle event.
    Events {
        /// The event.
        #[serde(flatten)]
        event: WorkflowEvent,
    },
    /// The subscriber's buffer overflowed and the subscription was
    /// dropped. This is always the final frame.
    SubscriberLagged {
        /// Sequence number of the last trace frame that was delivered
        /// (0 if none were).
        last_delivered_sequence: u64,
    },
}

/// Per-subscription filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    /// Which stream to follow.
    pub stream: StreamKind,
    /// Optional dotted type prefix (`"context"`, `"tokens.create"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_prefix: Option<String>,
}

impl SubscriptionFilter {
    /// Follow the full trace stream.
    #[must_use]
    pub fn trace() -> Self {
        Self {
            stream: StreamKind::Trace,
            type_prefix: None,
        }
    }

    /// Follow the workflow event stream.
    #[must_use]
    pub fn events() -> Self {
        Self {
            stream: StreamKind::Events,
            type_prefix: None,
        }
    }

    /// Restrict to events whose type matches a dotted prefix.
    #[must_use]
    pub fn with_type_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.type_prefix = Some(prefix.into());
        self
    }

    fn admits_trace(&self, event: &TraceEvent) -> bool {
        self.stream == StreamKind::Trace
            && self
                .type_prefix
                .as_deref()
                .map_or(true, |p| event.matches_prefix(p))
    }

    fn admits_event(&self, event: &WorkflowEvent) -> bool {
        self.stream == StreamKind::Events
            && self
                .type_prefix
                .as_deref()
                .map_or(true, |p| event.matches_prefix(p))
    }
}

struct Subscriber {
    id: SubscriptionId,
    filter: SubscriptionFilter,
    sender: mpsc::Sender<StreamFrame>,
    last_delivered_sequence: u64,
}

/// Fan-out hub for one run.
pub struct EventHub {
    subscribers: Mutex<Vec<Subscriber>>,
    buffer_size: usize,
}

impl EventHub {
    /// Create a hub whose subscribers each buffer `buffer_size` frames.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Register a subscriber; returns its id and the frame receiver.
    pub fn subscribe(
        &self,
        filter: SubscriptionFilter,
    ) -> (SubscriptionId, mpsc::Receiver<StreamFrame>) {
        // One slot is reserved for the final SubscriberLagged frame.
        let (sender, receiver) = mpsc::channel(self.buffer_size + 1);
        let id = SubscriptionId::v4();
        self.subscribers.lock().push(Subscriber {
            id,
            filter,
            sender,
            last_delivered_sequence: 0,
        });
        (id, receiver)
    }

    /// Remove a subscriber. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Push committed trace events to every matching subscriber.
    pub fn push_trace(&self, events: &[TraceEvent]) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain_mut(|sub| {
            for event in events {
                if !sub.filter.admits_trace(event) {
                    continue;
                }
                let frame = StreamFrame::Trace {
                    event: event.clone(),
                };
                if !deliver(sub, frame, event.sequence_number) {
                    return false;
                }
            }
            true
        });
    }

    /// Deliver already-committed trace events to one subscriber only.
    ///
    /// Used for `since_sequence` catch-up right after subscribing, before
    /// any new commit is pushed. Frames pass the subscriber's filter and
    /// count against its buffer like live frames.
    pub fn push_backlog(&self, id: SubscriptionId, events: &[TraceEvent]) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain_mut(|sub| {
            if sub.id != id {
                return true;
            }
            for event in events {
                if !sub.filter.admits_trace(event) {
                    continue;
                }
                let frame = StreamFrame::Trace {
                    event: event.clone(),
                };
                if !deliver(sub, frame, event.sequence_number) {
                    return false;
                }
            }
            true
        });
    }

    /// Push a workflow event to every matching subscriber.
    pub fn push_event(&self, event: &WorkflowEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain_mut(|sub| {
            if !sub.filter.admits_event(event) {
                return true;
            }
            let frame = StreamFrame::Events {
                event: event.clone(),
            };
            let seq = sub.last_delivered_sequence;
            deliver(sub, frame, seq)
        });
    }
}

/// Try to hand `frame` to a subscriber. On overflow the subscriber gets a
/// final `SubscriberLagged` frame (the reserved slot guarantees room) and
/// is removed. Returns `false` if the subscriber should be dropped.
fn deliver(sub: &mut Subscriber, frame: StreamFrame, sequence: u64) -> bool {
    if sub.sender.capacity() > 1 {
        match sub.sender.try_send(frame) {
            Ok(()) => {
                sub.last_delivered_sequence = sequence;
                true
            }
            // Receiver gone: drop silently.
            Err(_) => false,
        }
    } else {
        tracing::warn!(
            subscription = %sub.id,
            last_delivered_sequence = sub.last_delivered_sequence,
            "subscriber lagged, dropping"
        );
        let _ = sub.sender.try_send(StreamFrame::SubscriberLagged {
            last_delivered_sequence: sub.last_delivered_sequence,
        });
        false
    }
}
