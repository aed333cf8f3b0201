//! Trace record type.
//!
//! A record wraps one [`EngineEvent`] with its position in the session's
//! history: a record id, the firing cycle it belongs to, and a timestamp.

use reteline_engine::EngineEvent;

// =============================================================================
// Trace Record
// =============================================================================

/// A timestamped engine event.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceRecord {
    /// Unique record ID within the tracer.
    pub id: u64,
    /// Firing cycle: how many activations had started firing when the event
    /// happened. Events before the first firing belong to cycle 0.
    pub cycle: u64,
    /// Timestamp in nanoseconds since the tracer was created.
    pub timestamp_ns: u64,
    /// The event.
    pub event: EngineEvent,
}

impl TraceRecord {
    /// Creates a new trace record.
    #[must_use]
    pub fn new(id: u64, cycle: u64, timestamp_ns: u64, event: EngineEvent) -> Self {
        Self {
            id,
            cycle,
            timestamp_ns,
            event,
        }
    }

    /// Returns the event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.event.name()
    }

    /// The rule the event concerns, if any.
    #[must_use]
    pub fn rule(&self) -> Option<&str> {
        self.event.rule()
    }

    /// Returns true for fact insert/update/retract events.
    #[must_use]
    pub fn is_fact_event(&self) -> bool {
        matches!(
            self.event,
            EngineEvent::FactInserted { .. }
                | EngineEvent::FactUpdated { .. }
                | EngineEvent::FactRetracted { .. }
        )
    }

    /// Returns true for activation and focus events.
    #[must_use]
    pub fn is_agenda_event(&self) -> bool {
        matches!(
            self.event,
            EngineEvent::ActivationCreated { .. }
                | EngineEvent::ActivationCancelled { .. }
                | EngineEvent::FocusPushed { .. }
                | EngineEvent::FocusPopped { .. }
        )
    }

    /// Returns true for events reporting something that went wrong.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self.event,
            EngineEvent::ActionFailed { .. }
                | EngineEvent::ConstraintFailed { .. }
                | EngineEvent::LoopCeilingReached { .. }
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
