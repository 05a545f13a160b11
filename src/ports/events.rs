//! Observer event sink.
//!
//! The observer reports coarse lifecycle events through this capability so
//! operators can alert on reorgs and on monotonically growing failure rates
//! without scraping logs.

use crate::types::TransactionNumber;

// ═══════════════════════════════════════════════════════════════════════════════
// OBSERVER EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle events emitted by the observer loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverEvent {
    /// A chain reorganization was detected and derived state was rewound.
    BlockReorganization {
        /// The deepest still-valid transaction after the rewind, or `None`
        /// if the entire history was invalidated.
        reverted_to: Option<TransactionNumber>,
    },
    /// One full live iteration drained without error.
    LoopSuccess {
        /// Records consolidated into the transaction store this iteration.
        processed: usize,
    },
    /// A live iteration aborted; the loop retries on the next tick.
    LoopFailure {
        /// Human-readable failure description.
        reason: String,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT SINK
// ═══════════════════════════════════════════════════════════════════════════════

/// Capability for receiving observer events.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Must not block.
    fn emit(&self, event: ObserverEvent);
}

/// Default sink: structured log lines via `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: ObserverEvent) {
        match event {
            ObserverEvent::BlockReorganization { reverted_to } => {
                tracing::warn!(?reverted_to, "observer: block reorganization handled");
            }
            ObserverEvent::LoopSuccess { processed } => {
                tracing::debug!(processed, "observer: loop success");
            }
            ObserverEvent::LoopFailure { reason } => {
                tracing::warn!(%reason, "observer: loop failure");
            }
        }
    }
}

/// Test sink that records every emitted event.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: parking_lot::Mutex<Vec<ObserverEvent>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingEventSink {
    /// Create an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events emitted so far.
    #[must_use]
    pub fn events(&self) -> Vec<ObserverEvent> {
        self.events.lock().clone()
    }

    /// Count of reorganization events.
    #[must_use]
    pub fn reorg_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, ObserverEvent::BlockReorganization { .. }))
            .count()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl EventSink for RecordingEventSink {
    fn emit(&self, event: ObserverEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_captures_in_order() {
        let sink = RecordingEventSink::new();
        sink.emit(ObserverEvent::LoopSuccess { processed: 3 });
        sink.emit(ObserverEvent::LoopFailure {
            reason: "rpc down".into(),
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ObserverEvent::LoopSuccess { processed: 3 });
    }

    #[test]
    fn reorg_count_filters() {
        let sink = RecordingEventSink::new();
        sink.emit(ObserverEvent::BlockReorganization { reverted_to: None });
        sink.emit(ObserverEvent::LoopSuccess { processed: 0 });
        assert_eq!(sink.reorg_count(), 1);
    }
}
