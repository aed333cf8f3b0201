//! The discrimination network.
//!
//! The network is split in two:
//!
//! - [`Topology`] is the compiled, immutable node graph owned by a
//!   [`RuleBase`](crate::RuleBase) and shared by every session.
//! - [`NetworkMemory`] holds one session's alpha and beta memories and does
//!   the incremental propagation.
//!
//! Alpha nodes test one fact at a time and are shared between rules that
//! state the same fact type with the same constraints. Each rule then owns a
//! left-deep chain of beta nodes, one per condition; the output tokens of the
//! last node in the chain are the rule's complete matches.

mod accumulate;
mod memory;

pub(crate) use accumulate::AccumulatorState;
pub(crate) use memory::NetworkMemory;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use reteline_foundation::{Error, Fact, FactHandle, Result, Value};

use crate::condition::{AlphaConstraint, AlphaKey, Condition, Extractor, JoinConstraint, Op};
use crate::rule::Rule;
use crate::rulebase::RuleId;
use crate::token::{Bindings, FactTuple};

pub(crate) type AlphaId = usize;
pub(crate) type BetaId = usize;

/// Values of a node's equality joins, used as a hash key on both inputs.
pub(crate) type JoinKey = Vec<Value>;

// =============================================================================
// Statistics
// =============================================================================

/// Counters describing how much matching work a session has done.
///
/// These make incrementality observable: the work done for one insertion
/// should depend on what the inserted fact can join with, not on the size of
/// working memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetworkStats {
    /// Alpha node evaluations (one per node a fact was routed to).
    pub alpha_evaluations: u64,
    /// Candidate pairs tested at beta nodes.
    pub join_evaluations: u64,
    /// Full rescans of an accumulator's contributors.
    pub accumulate_rescans: u64,
    /// Tokens added to beta memories.
    pub tokens_created: u64,
    /// Tokens removed from beta memories.
    pub tokens_removed: u64,
}

// =============================================================================
// Propagation Output
// =============================================================================

/// A change to a rule's set of complete matches.
#[derive(Clone, Debug)]
pub(crate) enum TerminalChange {
    Matched {
        rule: RuleId,
        tuple: FactTuple,
        bindings: Bindings,
    },
    Unmatched {
        rule: RuleId,
        tuple: FactTuple,
    },
}

/// A constraint that raised an error while a fact was being matched.
#[derive(Debug)]
pub(crate) struct ConstraintFailure {
    pub rules: Vec<Arc<str>>,
    pub fact: Option<FactHandle>,
    pub error: Error,
}

/// Everything one propagation produced, in order.
#[derive(Debug, Default)]
pub(crate) struct Propagation {
    pub changes: Vec<TerminalChange>,
    pub failures: Vec<ConstraintFailure>,
}

impl Propagation {
    fn fail(&mut self, rules: Vec<Arc<str>>, fact: Option<FactHandle>, error: Error) {
        self.failures.push(ConstraintFailure { rules, fact, error });
    }
}

// =============================================================================
// Topology
// =============================================================================

/// A shared single-fact test.
#[derive(Debug)]
pub(crate) struct AlphaNode {
    pub fact_type: Arc<str>,
    pub constraints: Vec<AlphaConstraint>,
    pub successors: Vec<BetaId>,
    pub rules: Vec<Arc<str>>,
}

impl AlphaNode {
    fn passes(&self, fact: &Fact) -> Result<bool> {
        for constraint in &self.constraints {
            if !constraint.evaluate(fact)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// One condition of one rule.
#[derive(Debug)]
pub(crate) struct BetaNode {
    pub rule: RuleId,
    pub rule_name: Arc<str>,
    pub parent: Option<BetaId>,
    pub child: Option<BetaId>,
    pub condition: Condition,
    /// Equality joins, hashed on both inputs.
    pub keyed: Vec<(Extractor, Arc<str>)>,
    /// Remaining join tests, evaluated per candidate pair.
    pub tests: Vec<JoinConstraint>,
}

impl BetaNode {
    fn left_key(&self, bindings: &Bindings) -> Result<JoinKey> {
        self.keyed
            .iter()
            .map(|(_, var)| bindings.require(var).map(Value::numeric_key))
            .collect()
    }

    fn right_key(&self, fact: &Fact) -> Result<JoinKey> {
        self.keyed
            .iter()
            .map(|(ex, _)| ex.extract(fact).map(|v| v.numeric_key()))
            .collect()
    }

    fn test(&self, fact: &Fact, bindings: &Bindings) -> Result<bool> {
        for constraint in &self.tests {
            if !constraint.evaluate(fact, bindings)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// The compiled node graph.
#[derive(Debug, Default)]
pub(crate) struct Topology {
    pub alpha: Vec<AlphaNode>,
    pub beta: Vec<BetaNode>,
    /// Alpha nodes a fact of each concrete type is routed to.
    pub routes: HashMap<Arc<str>, Vec<AlphaId>>,
    /// Last beta node of each rule; `None` for rules without conditions.
    pub terminals: Vec<Option<BetaId>>,
    /// First beta node of each rule.
    pub entries: Vec<Option<BetaId>>,
}

impl Topology {
    /// Compiles rules into a node graph. `ancestors` maps every known type
    /// to itself and its supertypes.
    pub fn build(rules: &[Rule], ancestors: &HashMap<Arc<str>, BTreeSet<Arc<str>>>) -> Self {
        let mut topo = Self::default();
        let mut shared: HashMap<(Arc<str>, Vec<AlphaKey>), AlphaId> = HashMap::new();

        for (index, rule) in rules.iter().enumerate() {
            let rule_id = RuleId(index);
            let mut parent: Option<BetaId> = None;
            let mut entry: Option<BetaId> = None;

            for condition in &rule.conditions {
                let key = (
                    condition.fact_type.clone(),
                    condition.alpha.iter().map(AlphaConstraint::key).collect(),
                );
                let alpha = *shared.entry(key).or_insert_with(|| {
                    topo.alpha.push(AlphaNode {
                        fact_type: condition.fact_type.clone(),
                        constraints: condition.alpha.clone(),
                        successors: Vec::new(),
                        rules: Vec::new(),
                    });
                    topo.alpha.len() - 1
                });

                let (keyed, tests): (Vec<_>, Vec<_>) =
                    condition.joins.iter().cloned().partition(|j| j.op() == Op::Eq);
                let id = topo.beta.len();
                topo.beta.push(BetaNode {
                    rule: rule_id,
                    rule_name: rule.name.clone(),
                    parent,
                    child: None,
                    condition: condition.clone(),
                    keyed: keyed
                        .into_iter()
                        .map(|j| (j.extractor().clone(), j.variable().clone()))
                        .collect(),
                    tests,
                });

                let node = &mut topo.alpha[alpha];
                node.successors.push(id);
                if !node.rules.contains(&rule.name) {
                    node.rules.push(rule.name.clone());
                }
                if let Some(p) = parent {
                    topo.beta[p].child = Some(id);
                }
                entry.get_or_insert(id);
                parent = Some(id);
            }

            topo.entries.push(entry);
            topo.terminals.push(parent);
        }

        for (concrete, supertypes) in ancestors {
            let ids: Vec<AlphaId> = topo
                .alpha
                .iter()
                .enumerate()
                .filter(|(_, node)| supertypes.contains(&node.fact_type))
                .map(|(id, _)| id)
                .collect();
            if !ids.is_empty() {
                topo.routes.insert(concrete.clone(), ids);
            }
        }

        topo
    }
}
