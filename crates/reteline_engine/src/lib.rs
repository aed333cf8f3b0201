//! Incremental matching, agenda, truth maintenance, and sessions for Reteline.
//!
//! This crate provides:
//! - [`Condition`] and [`Rule`] - Declarative patterns and the productions built from them
//! - [`RuleBase`] - An immutable, shareable compilation of rules into a matching network
//! - [`Session`] - A working memory that matches incrementally and fires rules
//! - [`Agenda`] - Pending activations, agenda groups, and conflict resolution
//! - Truth maintenance for facts inserted with [`RuleContext::insert_logical`]
//! - [`EngineEvent`] and [`EngineListener`] - Observing what a session does
//! - [`StatelessSession`] - One-shot execution over a shared rule base
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use reteline_engine::{Condition, Rule, RuleBase, field};
//! use reteline_foundation::Fact;
//!
//! let rulebase = RuleBase::builder()
//!     .rule(
//!         Rule::new("approve")
//!             .when(Condition::new("Claim").bind("c").filter(field("amount").lt(1000)))
//!             .then(|ctx| {
//!                 let claim = ctx.handle("c")?;
//!                 ctx.modify(claim, |f| f.set("status", "APPROVED"))
//!             })
//!             .with_no_loop(true),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let mut session = Arc::new(rulebase).new_session();
//! let claim = session.insert(Fact::new("Claim").with("amount", 250));
//! assert_eq!(session.fire_all_rules(), 1);
//! assert_eq!(session.get(claim).unwrap().get("status").unwrap().as_str(), Some("APPROVED"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod agenda;
pub mod condition;
pub mod config;
pub mod context;
pub mod event;
pub mod halt;
mod network;
pub mod query;
pub mod rule;
pub mod rulebase;
pub mod session;
pub mod stateless;
pub mod token;
pub mod truth;

pub use agenda::{Activation, ActivationId, Agenda, GroupState};
pub use condition::{
    Accumulate, AccumulateFunction, AlphaConstraint, Condition, ConditionKind, Extractor,
    JoinConstraint, Op, average, collect, count, field, max, min, sum,
};
pub use config::{DEFAULT_MAX_FIRINGS, SessionConfig};
pub use context::RuleContext;
pub use event::{CancelReason, EngineEvent, EngineListener, EventLog};
pub use halt::HaltHandle;
pub use network::NetworkStats;
pub use query::QueryRow;
pub use rule::{Action, MAIN_GROUP, Query, Rule};
pub use rulebase::{RuleBase, RuleBaseBuilder, RuleId};
pub use session::Session;
pub use stateless::{ExecutionResults, StatelessSession};
pub use token::{Bindings, FactTuple};
pub use truth::{MatchKey, TruthMaintenance};
