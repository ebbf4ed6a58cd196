//! Event recorder.
//!
//! Operations that must explain themselves (context reads/writes, token
//! transitions, routing decisions) push [`TraceEventKind`]s into a
//! `Recorder` as they execute. The applier drains the recorder and stamps
//! the events with sequence numbers at commit. Emission stays inside the
//! stores; call sites never construct trace events themselves.

use crate::event::TraceEventKind;

/// An ordered buffer of not-yet-committed trace events.
#[derive(Debug, Default)]
pub struct Recorder {
    events: Vec<TraceEventKind>,
}

impl Recorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn push(&mut self, event: TraceEventKind) {
        self.events.push(event);
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the recorder holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The buffered events, in emission order.
    #[must_use]
    pub fn events(&self) -> &[TraceEventKind] {
        &self.events
    }

    /// Drain the buffered events, leaving the recorder empty.
    #[must_use]
    pub fn drain(&mut self) -> Vec<TraceEventKind> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_and_drain_preserve_order() {
        let mut rec = Recorder::new();
        rec.push(TraceEventKind::ContextInit { input: json!({}) });
        rec.push(TraceEventKind::ContextValidate {
            subtree: "input".into(),
        });
        assert_eq!(rec.len(), 2);

        let events = rec.drain();
        assert!(rec.is_empty());
        assert_eq!(events[0].event_type(), "context.init");
        assert_eq!(events[1].event_type(), "context.validate");
    }
}
