//! Integration tests for Layer 2: Engine
//!
//! Tests for matching, incrementality, the agenda, truth maintenance,
//! queries, and stateless execution.

mod agenda;
mod incremental;
mod matching;
mod queries;
