//! Fact store, identities, and change deltas for Reteline.
//!
//! This crate provides:
//! - [`FactStore`] - The canonical table of live facts and their handles
//! - [`Delta`] - The change record every mutation produces for the network
//! - [`InsertionKind`] - Whether a fact was stated or logically derived

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod delta;
pub mod store;

pub use delta::{Delta, DeltaKind};
pub use store::{FactEntry, FactStore, InsertionKind};
