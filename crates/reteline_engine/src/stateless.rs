//! One-shot execution over a shared rule base.

use std::sync::Arc;

use reteline_foundation::{Fact, FactHandle};
use reteline_storage::InsertionKind;

use crate::config::SessionConfig;
use crate::event::EngineListener;
use crate::rulebase::RuleBase;
use crate::session::Session;

/// Runs a batch of facts to quiescence in a fresh session and reports what
/// working memory ended up holding.
///
/// Cheap to clone and `Send + Sync`; every [`execute`](Self::execute) is
/// independent, so one value can serve many threads.
#[derive(Clone, Debug)]
pub struct StatelessSession {
    rulebase: Arc<RuleBase>,
    config: SessionConfig,
}

/// Outcome of one stateless execution.
#[derive(Clone, Debug, Default)]
pub struct ExecutionResults {
    /// Actions that completed.
    pub fired: usize,
    /// Working memory at quiescence, in handle order.
    pub facts: Vec<(FactHandle, Fact, InsertionKind)>,
}

impl ExecutionResults {
    /// Facts of exactly the given type.
    pub fn facts_of_type<'a>(&'a self, fact_type: &'a str) -> impl Iterator<Item = &'a Fact> + 'a {
        self.facts
            .iter()
            .filter(move |(_, fact, _)| fact.fact_type() == fact_type)
            .map(|(_, fact, _)| fact)
    }

    /// Facts that were derived rather than stated.
    pub fn logical_facts(&self) -> impl Iterator<Item = &Fact> {
        self.facts
            .iter()
            .filter(|(_, _, kind)| *kind == InsertionKind::Logical)
            .map(|(_, fact, _)| fact)
    }
}

impl StatelessSession {
    /// Creates a stateless session with default configuration.
    #[must_use]
    pub fn new(rulebase: Arc<RuleBase>) -> Self {
        Self::with_config(rulebase, SessionConfig::default())
    }

    /// Creates a stateless session with the given configuration.
    #[must_use]
    pub fn with_config(rulebase: Arc<RuleBase>, config: SessionConfig) -> Self {
        Self { rulebase, config }
    }

    /// Inserts `facts`, fires to quiescence, and collects the result.
    pub fn execute(&self, facts: impl IntoIterator<Item = Fact>) -> ExecutionResults {
        self.run(facts, |_| {})
    }

    /// Like [`execute`](Self::execute), reporting events to `listener`.
    pub fn execute_with(
        &self,
        facts: impl IntoIterator<Item = Fact>,
        listener: impl EngineListener + 'static,
    ) -> ExecutionResults {
        self.run(facts, |session| session.add_listener(listener))
    }

    fn run(
        &self,
        facts: impl IntoIterator<Item = Fact>,
        prepare: impl FnOnce(&mut Session),
    ) -> ExecutionResults {
        let mut session = Session::with_config(Arc::clone(&self.rulebase), self.config.clone());
        prepare(&mut session);
        for fact in facts {
            session.insert(fact);
        }
        let fired = session.fire_all_rules();
        tracing::debug!(fired, facts = session.fact_count(), "stateless execution");

        let facts = session
            .facts()
            .filter_map(|(handle, fact)| {
                session
                    .kind(handle)
                    .map(|kind| (handle, fact.clone(), kind))
            })
            .collect();
        ExecutionResults { fired, facts }
    }
}
