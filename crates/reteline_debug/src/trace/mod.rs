//! Tracing system for Reteline sessions.
//!
//! A [`Tracer`] is an engine listener. Register a clone of it with a session
//! and it records every event the session emits into a bounded
//! [`TraceBuffer`], optionally echoing each record to stderr in human or
//! JSON form. Recording costs one branch when the tracer is disabled.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use reteline_debug::{Tracer, TracerConfig};
//! use reteline_engine::{Condition, Rule, RuleBase};
//! use reteline_foundation::Fact;
//!
//! let rulebase = RuleBase::builder()
//!     .rule(Rule::new("any-claim").when(Condition::new("Claim")))
//!     .build()
//!     .unwrap();
//! let tracer = Tracer::new(TracerConfig::new().enabled());
//!
//! let mut session = Arc::new(rulebase).new_session();
//! session.add_listener(tracer.clone());
//! session.insert(Fact::new("Claim"));
//! session.fire_all_rules();
//!
//! assert_eq!(tracer.current_cycle(), 1);
//! assert_eq!(tracer.stats().event_counts.get("after-fire"), Some(&1));
//! ```

pub mod buffer;
pub mod format;
pub mod record;

pub use buffer::{TraceBuffer, TraceBufferStats};
pub use format::{HumanFormatter, JsonFormatter, TraceFormatter};
pub use record::TraceRecord;

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use reteline_engine::{EngineEvent, EngineListener};

// =============================================================================
// Trace Output
// =============================================================================

/// Where trace output should be sent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TraceOutput {
    /// No output (traces still recorded in buffer).
    #[default]
    None,
    /// Write to stderr.
    Stderr,
}

// =============================================================================
// Tracer Configuration
// =============================================================================

/// Configuration for the tracer.
#[derive(Clone, Debug)]
pub struct TracerConfig {
    /// Whether tracing is enabled.
    pub enabled: bool,
    /// Maximum records to keep in buffer.
    pub buffer_size: usize,
    /// Where to output traces.
    pub output: TraceOutput,
    /// Whether to use JSON format.
    pub json_format: bool,
    /// Filter for specific event types (empty = all).
    pub event_filter: Vec<String>,
    /// Filter for events concerning specific rules (empty = all).
    pub rule_filter: Vec<String>,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            buffer_size: 10000,
            output: TraceOutput::None,
            json_format: false,
            event_filter: Vec::new(),
            rule_filter: Vec::new(),
        }
    }
}

impl TracerConfig {
    /// Creates a new tracer configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to enable tracing.
    #[must_use]
    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// Builder method to set buffer size.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Builder method to output to stderr.
    #[must_use]
    pub fn to_stderr(mut self) -> Self {
        self.output = TraceOutput::Stderr;
        self
    }

    /// Builder method to use JSON format.
    #[must_use]
    pub fn json(mut self) -> Self {
        self.json_format = true;
        self
    }

    /// Builder method to filter event types.
    #[must_use]
    pub fn filter_events(mut self, types: Vec<String>) -> Self {
        self.event_filter = types;
        self
    }

    /// Builder method to keep only events about the named rules. Events
    /// that concern no single rule are dropped while this filter is set.
    #[must_use]
    pub fn filter_rules(mut self, rules: Vec<String>) -> Self {
        self.rule_filter = rules;
        self
    }
}

// =============================================================================
// Tracer
// =============================================================================

#[derive(Debug)]
struct TracerState {
    config: TracerConfig,
    buffer: TraceBuffer,
    current_cycle: u64,
}

/// Records session events.
///
/// Clones share one buffer, so keep a clone to read the trace after handing
/// another to [`Session::add_listener`](reteline_engine::Session::add_listener).
#[derive(Clone, Debug)]
pub struct Tracer {
    state: Arc<Mutex<TracerState>>,
    start_time: Instant,
    human_formatter: HumanFormatter,
    json_formatter: JsonFormatter,
}

impl Tracer {
    /// Creates a new tracer with the given configuration.
    #[must_use]
    pub fn new(config: TracerConfig) -> Self {
        let buffer = TraceBuffer::new(config.buffer_size);
        Self {
            state: Arc::new(Mutex::new(TracerState {
                config,
                buffer,
                current_cycle: 0,
            })),
            start_time: Instant::now(),
            human_formatter: HumanFormatter::new().with_timestamps(),
            json_formatter: JsonFormatter::new(),
        }
    }

    /// Creates a tracer with default configuration (disabled).
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(TracerConfig::default())
    }

    /// Creates an enabled tracer that outputs to stderr.
    #[must_use]
    pub fn to_stderr() -> Self {
        Self::new(TracerConfig::new().enabled().to_stderr())
    }

    /// Returns whether tracing is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state.lock().config.enabled
    }

    /// Enables tracing.
    pub fn enable(&self) {
        self.state.lock().config.enabled = true;
    }

    /// Disables tracing.
    pub fn disable(&self) {
        self.state.lock().config.enabled = false;
    }

    /// Sets whether to use JSON output format.
    pub fn set_json_format(&self, json: bool) {
        self.state.lock().config.json_format = json;
    }

    /// Sets the trace output destination.
    pub fn set_output(&self, output: TraceOutput) {
        self.state.lock().config.output = output;
    }

    /// Number of firings observed so far.
    #[must_use]
    pub fn current_cycle(&self) -> u64 {
        self.state.lock().current_cycle
    }

    /// Records an engine event.
    pub fn record(&self, event: &EngineEvent) {
        let mut state = self.state.lock();
        if !state.config.enabled {
            return;
        }
        if matches!(event, EngineEvent::BeforeMatchFired { .. }) {
            state.current_cycle += 1;
        }
        if !Self::passes_filters(&state.config, event) {
            return;
        }

        #[allow(clippy::cast_possible_truncation)]
        let timestamp_ns = self.start_time.elapsed().as_nanos() as u64;
        let cycle = state.current_cycle;
        state.buffer.push(cycle, timestamp_ns, event.clone());

        if state.config.output == TraceOutput::Stderr {
            if let Some(record) = state.buffer.latest() {
                let line = self.format_with(&state.config, record);
                let _ = writeln!(io::stderr(), "{line}");
            }
        }
    }

    fn passes_filters(config: &TracerConfig, event: &EngineEvent) -> bool {
        if !config.event_filter.is_empty()
            && !config.event_filter.iter().any(|t| t == event.name())
        {
            return false;
        }
        if !config.rule_filter.is_empty() {
            return event
                .rule()
                .is_some_and(|rule| config.rule_filter.iter().any(|r| r == rule));
        }
        true
    }

    fn format_with(&self, config: &TracerConfig, record: &TraceRecord) -> String {
        if config.json_format {
            self.json_formatter.format(record)
        } else {
            self.human_formatter.format(record)
        }
    }

    /// Formats a record using the current format settings.
    #[must_use]
    pub fn format_record(&self, record: &TraceRecord) -> String {
        let state = self.state.lock();
        self.format_with(&state.config, record)
    }

    /// Formats the most recent `count` records.
    #[must_use]
    pub fn format_recent(&self, count: usize) -> String {
        let state = self.state.lock();
        let records = state.buffer.recent(count);
        if state.config.json_format {
            self.json_formatter.format_many(&records)
        } else {
            self.human_formatter.format_many(&records)
        }
    }

    /// A copy of every record in the buffer, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<TraceRecord> {
        self.state.lock().buffer.iter().cloned().collect()
    }

    /// Runs `f` with the trace buffer.
    pub fn with_buffer<R>(&self, f: impl FnOnce(&TraceBuffer) -> R) -> R {
        f(&self.state.lock().buffer)
    }

    /// Clears the trace buffer.
    pub fn clear(&self) {
        self.state.lock().buffer.clear();
    }

    /// Returns buffer statistics.
    #[must_use]
    pub fn stats(&self) -> TraceBufferStats {
        self.state.lock().buffer.stats()
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::disabled()
    }
}

impl EngineListener for Tracer {
    fn on_event(&mut self, event: &EngineEvent) {
        self.record(event);
    }
}

// =============================================================================
// Tests
// =============================================================================
