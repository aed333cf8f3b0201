//! Engine events and listeners.
//!
//! Sessions report fact changes, agenda changes, firings, and failures to
//! registered [`EngineListener`]s. Failures that do not abort the call that
//! caused them (constraint errors, action errors, the loop ceiling) are only
//! visible here.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use reteline_foundation::FactHandle;
use reteline_storage::InsertionKind;

use crate::token::FactTuple;

/// Why a pending activation was removed without firing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// Its match stopped holding.
    Unmatched,
    /// Another member of its activation group fired.
    ActivationGroup,
    /// The agenda (or its agenda group) was cleared.
    Cleared,
}

/// Something that happened inside a session.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// A fact entered working memory.
    FactInserted {
        /// Its handle.
        handle: FactHandle,
        /// Its type.
        fact_type: Arc<str>,
        /// Stated or derived.
        kind: InsertionKind,
    },
    /// A fact's value changed.
    FactUpdated {
        /// Its handle.
        handle: FactHandle,
        /// Its (new) type.
        fact_type: Arc<str>,
    },
    /// A fact left working memory.
    FactRetracted {
        /// Its handle.
        handle: FactHandle,
        /// Its type.
        fact_type: Arc<str>,
        /// Stated or derived.
        kind: InsertionKind,
    },
    /// A rule matched and its activation was queued.
    ActivationCreated {
        /// The rule.
        rule: Arc<str>,
        /// The matched facts.
        facts: FactTuple,
    },
    /// A queued activation was removed without firing.
    ActivationCancelled {
        /// The rule.
        rule: Arc<str>,
        /// The matched facts.
        facts: FactTuple,
        /// Why.
        reason: CancelReason,
    },
    /// An activation is about to fire.
    BeforeMatchFired {
        /// The rule.
        rule: Arc<str>,
        /// The matched facts.
        facts: FactTuple,
    },
    /// An activation's action completed.
    AfterMatchFired {
        /// The rule.
        rule: Arc<str>,
        /// The matched facts.
        facts: FactTuple,
    },
    /// An activation's action returned an error.
    ActionFailed {
        /// The rule.
        rule: Arc<str>,
        /// The matched facts.
        facts: FactTuple,
        /// The error, rendered.
        error: String,
    },
    /// A constraint raised an error while matching a fact; the candidate
    /// match was dropped.
    ConstraintFailed {
        /// Rules whose condition raised the error.
        rules: Vec<Arc<str>>,
        /// The fact being matched, when known.
        fact: Option<FactHandle>,
        /// The error, rendered.
        error: String,
    },
    /// An agenda group was pushed onto the focus stack.
    FocusPushed {
        /// The group.
        group: Arc<str>,
    },
    /// An exhausted agenda group was popped off the focus stack.
    FocusPopped {
        /// The group.
        group: Arc<str>,
    },
    /// An execution loop stopped at its firing ceiling.
    LoopCeilingReached {
        /// The ceiling.
        limit: usize,
        /// The rule that fired last.
        rule: Option<Arc<str>>,
    },
}

impl EngineEvent {
    /// Short name of the event variant.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::FactInserted { .. } => "fact-inserted",
            Self::FactUpdated { .. } => "fact-updated",
            Self::FactRetracted { .. } => "fact-retracted",
            Self::ActivationCreated { .. } => "activation-created",
            Self::ActivationCancelled { .. } => "activation-cancelled",
            Self::BeforeMatchFired { .. } => "before-fire",
            Self::AfterMatchFired { .. } => "after-fire",
            Self::ActionFailed { .. } => "action-failed",
            Self::ConstraintFailed { .. } => "constraint-failed",
            Self::FocusPushed { .. } => "focus-pushed",
            Self::FocusPopped { .. } => "focus-popped",
            Self::LoopCeilingReached { .. } => "loop-ceiling",
        }
    }

    /// The rule the event concerns, if it concerns exactly one.
    #[must_use]
    pub fn rule(&self) -> Option<&str> {
        match self {
            Self::ActivationCreated { rule, .. }
            | Self::ActivationCancelled { rule, .. }
            | Self::BeforeMatchFired { rule, .. }
            | Self::AfterMatchFired { rule, .. }
            | Self::ActionFailed { rule, .. } => Some(rule),
            Self::LoopCeilingReached { rule, .. } => rule.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FactInserted {
                handle,
                fact_type,
                kind,
            } => write!(f, "insert {fact_type} {handle} ({kind:?})"),
            Self::FactUpdated { handle, fact_type } => write!(f, "update {fact_type} {handle}"),
            Self::FactRetracted {
                handle,
                fact_type,
                kind,
            } => write!(f, "retract {fact_type} {handle} ({kind:?})"),
            Self::ActivationCreated { rule, facts } => write!(f, "activate {rule} {facts}"),
            Self::ActivationCancelled {
                rule,
                facts,
                reason,
            } => write!(f, "cancel {rule} {facts} ({reason:?})"),
            Self::BeforeMatchFired { rule, facts } => write!(f, "fire {rule} {facts}"),
            Self::AfterMatchFired { rule, facts } => write!(f, "fired {rule} {facts}"),
            Self::ActionFailed { rule, facts, error } => {
                write!(f, "action failed {rule} {facts}: {error}")
            }
            Self::ConstraintFailed { rules, fact, error } => {
                write!(f, "constraint failed")?;
                for rule in rules {
                    write!(f, " {rule}")?;
                }
                if let Some(fact) = fact {
                    write!(f, " on {fact}")?;
                }
                write!(f, ": {error}")
            }
            Self::FocusPushed { group } => write!(f, "focus {group}"),
            Self::FocusPopped { group } => write!(f, "pop {group}"),
            Self::LoopCeilingReached { limit, rule } => {
                write!(f, "loop ceiling {limit}")?;
                if let Some(rule) = rule {
                    write!(f, " after {rule}")?;
                }
                Ok(())
            }
        }
    }
}

/// Receives events from a session.
pub trait EngineListener: Send {
    /// Called synchronously for every event, in order.
    fn on_event(&mut self, event: &EngineEvent);
}

impl<F> EngineListener for F
where
    F: FnMut(&EngineEvent) + Send,
{
    fn on_event(&mut self, event: &EngineEvent) {
        self(event);
    }
}

/// A listener that records every event; clones share one log.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every event recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    /// Number of events recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Names of rules whose actions completed, in firing order.
    #[must_use]
    pub fn fired(&self) -> Vec<Arc<str>> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                EngineEvent::AfterMatchFired { rule, .. } => Some(rule.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of events satisfying a predicate.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&EngineEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    /// Forgets everything recorded.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EngineListener for EventLog {
    fn on_event(&mut self, event: &EngineEvent) {
        self.events.lock().push(event.clone());
    }
}
