//! Reteline - Forward-chaining production rule engine
//!
//! This crate re-exports all layers of the Reteline system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: reteline_debug      — Event tracing and trace formatting
//! Layer 2: reteline_engine     — Rule base, matching network, agenda, truth maintenance, sessions
//! Layer 1: reteline_storage    — Fact store, handles, change deltas
//! Layer 0: reteline_foundation — Core types (Value, Fact, FactHandle, TypeHierarchy, Error)
//! ```

pub use reteline_debug as debug;
pub use reteline_engine as engine;
pub use reteline_foundation as foundation;
pub use reteline_storage as storage;
