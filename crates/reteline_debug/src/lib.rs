//! Execution tracing for Reteline sessions.
//!
//! This crate provides:
//! - [`Tracer`] - An engine listener that records session events
//! - [`TraceBuffer`] - A bounded ring of timestamped [`TraceRecord`]s indexed by firing cycle
//! - [`HumanFormatter`] and [`JsonFormatter`] - Rendering records for people and tools

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod trace;

pub use trace::{
    HumanFormatter, JsonFormatter, TraceBuffer, TraceBufferStats, TraceFormatter, TraceOutput,
    TraceRecord, Tracer, TracerConfig,
};
