//! Trace output formatters.
//!
//! Provides human-readable and JSON formatters for trace records.

use std::fmt::Write;

use reteline_engine::{EngineEvent, FactTuple};

use super::record::TraceRecord;

// =============================================================================
// Trace Formatter Trait
// =============================================================================

/// Trait for formatting trace records.
pub trait TraceFormatter {
    /// Formats a single trace record to a string.
    fn format(&self, record: &TraceRecord) -> String;

    /// Formats multiple records.
    fn format_many(&self, records: &[&TraceRecord]) -> String {
        records
            .iter()
            .map(|r| self.format(r))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// =============================================================================
// Human-Readable Formatter
// =============================================================================

/// Formats trace records in human-readable form.
#[derive(Clone, Debug, Default)]
pub struct HumanFormatter {
    /// Whether to include timestamps.
    pub show_timestamps: bool,
    /// Whether to include record IDs.
    pub show_ids: bool,
}

impl HumanFormatter {
    /// Creates a new human formatter with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to show timestamps.
    #[must_use]
    pub fn with_timestamps(mut self) -> Self {
        self.show_timestamps = true;
        self
    }

    /// Builder method to show record IDs.
    #[must_use]
    pub fn with_ids(mut self) -> Self {
        self.show_ids = true;
        self
    }

    /// Formats timestamp in microseconds.
    #[allow(clippy::cast_precision_loss)]
    fn format_timestamp(ns: u64) -> String {
        let us = ns / 1000;
        if us >= 1_000_000 {
            format!("{:.3}s", us as f64 / 1_000_000.0)
        } else if us >= 1000 {
            format!("{:.3}ms", us as f64 / 1000.0)
        } else {
            format!("{us}us")
        }
    }
}

impl TraceFormatter for HumanFormatter {
    fn format(&self, record: &TraceRecord) -> String {
        let mut prefix = String::new();

        if self.show_ids {
            let _ = write!(prefix, "[{:06}] ", record.id);
        }

        let _ = write!(prefix, "C{:04} ", record.cycle);

        if self.show_timestamps {
            let _ = write!(
                prefix,
                "{:>10} ",
                Self::format_timestamp(record.timestamp_ns)
            );
        }

        let event_str = match &record.event {
            EngineEvent::FactInserted {
                handle,
                fact_type,
                kind,
            } => format!("    INSERT {fact_type} {handle} ({kind:?})"),
            EngineEvent::FactUpdated { handle, fact_type } => {
                format!("    UPDATE {fact_type} {handle}")
            }
            EngineEvent::FactRetracted {
                handle,
                fact_type,
                kind,
            } => format!("    RETRACT {fact_type} {handle} ({kind:?})"),
            EngineEvent::ActivationCreated { rule, facts } => {
                format!("  ACTIVATED {rule} {facts}")
            }
            EngineEvent::ActivationCancelled {
                rule,
                facts,
                reason,
            } => format!("  CANCELLED {rule} {facts} ({reason:?})"),
            EngineEvent::BeforeMatchFired { rule, facts } => {
                format!("=== FIRING {rule} {facts} ===")
            }
            EngineEvent::AfterMatchFired { rule, .. } => format!("  COMPLETE {rule}"),
            EngineEvent::ActionFailed { rule, error, .. } => {
                format!("  FAILED {rule}: {error}")
            }
            EngineEvent::ConstraintFailed { rules, fact, error } => {
                let on = fact.map(|f| format!(" on {f}")).unwrap_or_default();
                format!("  CONSTRAINT [{}]{on}: {error}", rules.join(", "))
            }
            EngineEvent::FocusPushed { group } => format!("  >> {group}"),
            EngineEvent::FocusPopped { group } => format!("  << {group}"),
            EngineEvent::LoopCeilingReached { limit, rule } => {
                let after = rule
                    .as_ref()
                    .map(|r| format!(" after {r}"))
                    .unwrap_or_default();
                format!("!!! LOOP CEILING {limit}{after} !!!")
            }
        };

        format!("{prefix}{event_str}")
    }
}

// =============================================================================
// JSON Formatter
// =============================================================================

/// Formats trace records as JSON.
#[derive(Clone, Debug, Default)]
pub struct JsonFormatter {
    /// Whether to pretty-print arrays of records.
    pub pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method for pretty printing.
    #[must_use]
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    /// Escapes a string for JSON.
    fn escape_string(s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '"' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if u32::from(c) < 0x20 => out.push_str(&format!("\\u{:04x}", u32::from(c))),
                c => out.push(c),
            }
        }
        out
    }

    fn string(s: &str) -> String {
        format!("\"{}\"", Self::escape_string(s))
    }

    fn facts(facts: &FactTuple) -> String {
        let ids: Vec<String> = facts.handles().iter().map(|h| h.id().to_string()).collect();
        format!("[{}]", ids.join(","))
    }
}

impl TraceFormatter for JsonFormatter {
    fn format(&self, record: &TraceRecord) -> String {
        let event_data = match &record.event {
            EngineEvent::FactInserted {
                handle,
                fact_type,
                kind,
            }
            | EngineEvent::FactRetracted {
                handle,
                fact_type,
                kind,
            } => format!(
                "\"fact\":{},\"fact_type\":{},\"kind\":\"{kind:?}\"",
                handle.id(),
                Self::string(fact_type)
            ),
            EngineEvent::FactUpdated { handle, fact_type } => format!(
                "\"fact\":{},\"fact_type\":{}",
                handle.id(),
                Self::string(fact_type)
            ),
            EngineEvent::ActivationCreated { rule, facts }
            | EngineEvent::BeforeMatchFired { rule, facts }
            | EngineEvent::AfterMatchFired { rule, facts } => format!(
                "\"rule\":{},\"facts\":{}",
                Self::string(rule),
                Self::facts(facts)
            ),
            EngineEvent::ActivationCancelled {
                rule,
                facts,
                reason,
            } => format!(
                "\"rule\":{},\"facts\":{},\"reason\":\"{reason:?}\"",
                Self::string(rule),
                Self::facts(facts)
            ),
            EngineEvent::ActionFailed { rule, facts, error } => format!(
                "\"rule\":{},\"facts\":{},\"error\":{}",
                Self::string(rule),
                Self::facts(facts),
                Self::string(error)
            ),
            EngineEvent::ConstraintFailed { rules, fact, error } => {
                let rules: Vec<String> = rules.iter().map(|r| Self::string(r)).collect();
                let fact = fact.map_or_else(|| "null".to_string(), |f| f.id().to_string());
                format!(
                    "\"rules\":[{}],\"fact\":{fact},\"error\":{}",
                    rules.join(","),
                    Self::string(error)
                )
            }
            EngineEvent::FocusPushed { group } | EngineEvent::FocusPopped { group } => {
                format!("\"group\":{}", Self::string(group))
            }
            EngineEvent::LoopCeilingReached { limit, rule } => {
                let rule = rule
                    .as_ref()
                    .map_or_else(|| "null".to_string(), |r| Self::string(r));
                format!("\"limit\":{limit},\"rule\":{rule}")
            }
        };

        format!(
            "{{\"id\":{},\"cycle\":{},\"timestamp_ns\":{},\"type\":\"{}\",{}}}",
            record.id,
            record.cycle,
            record.timestamp_ns,
            record.event_type(),
            event_data
        )
    }

    fn format_many(&self, records: &[&TraceRecord]) -> String {
        let items: Vec<_> = records.iter().map(|r| self.format(r)).collect();
        if self.pretty {
            format!("[\n  {}\n]", items.join(",\n  "))
        } else {
            format!("[{}]", items.join(","))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
