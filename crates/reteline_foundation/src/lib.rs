//! Core values, fact handles, type hierarchy, and errors for Reteline.
//!
//! This crate provides:
//! - [`Value`] - The value type stored in fact fields and variable bindings
//! - [`FactHandle`] - Stable fact identities issued by the fact store
//! - [`Fact`] - A typed record of named field values
//! - [`TypeHierarchy`] - Declared supertypes and their precomputed closure
//! - [`Error`] - Rich error types with context
//! - Persistent collections ([`LtVec`], [`LtMap`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collections;
pub mod error;
pub mod fact;
pub mod handle;
pub mod types;
pub mod value;

pub use collections::{LtMap, LtVec};
pub use error::{Error, ErrorContext, ErrorKind};
pub use fact::Fact;
pub use handle::FactHandle;
pub use types::TypeHierarchy;
pub use value::Value;

/// Result alias used across every Reteline crate.
pub type Result<T> = std::result::Result<T, Error>;
