//! Session configuration.

/// Default firing ceiling for one execution loop.
pub const DEFAULT_MAX_FIRINGS: usize = 10_000;

/// Configuration for a [`Session`](crate::Session).
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Maximum activations one execution loop may fire before it stops and
    /// reports a loop ceiling.
    pub max_firings: usize,

    /// Emit fact insert/update/retract events to listeners.
    pub fact_events: bool,

    /// Emit activation created/cancelled events to listeners.
    pub agenda_events: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_firings: DEFAULT_MAX_FIRINGS,
            fact_events: true,
            agenda_events: true,
        }
    }
}

impl SessionConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration that only reports firings and failures.
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            fact_events: false,
            agenda_events: false,
            ..Self::default()
        }
    }

    /// Builder method to set the firing ceiling.
    #[must_use]
    pub fn with_max_firings(mut self, max_firings: usize) -> Self {
        self.max_firings = max_firings;
        self
    }

    /// Builder method to toggle fact events.
    #[must_use]
    pub fn with_fact_events(mut self, enabled: bool) -> Self {
        self.fact_events = enabled;
        self
    }

    /// Builder method to toggle agenda events.
    #[must_use]
    pub fn with_agenda_events(mut self, enabled: bool) -> Self {
        self.agenda_events = enabled;
        self
    }
}
