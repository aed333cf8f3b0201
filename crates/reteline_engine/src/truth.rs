//! Truth maintenance for logically inserted facts.
//!
//! A justification ties a logical fact to the rule match whose firing
//! inserted it. Justifications live in an index-addressed arena with two
//! lookup tables: by fact (to tell whether a fact is still supported) and by
//! match (to find what a match supported once it stops matching).

use std::collections::HashMap;

use reteline_foundation::FactHandle;

use crate::rulebase::RuleId;
use crate::token::FactTuple;

/// A rule match that can justify logical facts.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchKey {
    /// The rule.
    pub rule: RuleId,
    /// The matched facts.
    pub facts: FactTuple,
}

impl MatchKey {
    /// Creates a match key.
    #[must_use]
    pub fn new(rule: RuleId, facts: FactTuple) -> Self {
        Self { rule, facts }
    }
}

#[derive(Clone, Debug)]
struct Justification {
    fact: FactHandle,
    support: MatchKey,
}

/// The justification arena of one session.
#[derive(Debug, Default)]
pub struct TruthMaintenance {
    arena: Vec<Option<Justification>>,
    free: Vec<usize>,
    by_fact: HashMap<FactHandle, Vec<usize>>,
    by_match: HashMap<MatchKey, Vec<usize>>,
}

impl TruthMaintenance {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live justifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len() - self.free.len()
    }

    /// True if nothing is justified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `fact` has at least one justification.
    #[must_use]
    pub fn is_justified(&self, fact: FactHandle) -> bool {
        self.by_fact.get(&fact).is_some_and(|ids| !ids.is_empty())
    }

    /// The matches currently supporting `fact`.
    #[must_use]
    pub fn supports(&self, fact: FactHandle) -> Vec<&MatchKey> {
        self.by_fact
            .get(&fact)
            .into_iter()
            .flatten()
            .filter_map(|&id| self.arena[id].as_ref().map(|j| &j.support))
            .collect()
    }

    /// Records that `support` justifies `fact`. Returns false if that exact
    /// justification already exists.
    pub fn justify(&mut self, fact: FactHandle, support: MatchKey) -> bool {
        let exists = self.by_match.get(&support).is_some_and(|ids| {
            ids.iter()
                .any(|&id| self.arena[id].as_ref().is_some_and(|j| j.fact == fact))
        });
        if exists {
            return false;
        }

        let justification = Justification {
            fact,
            support: support.clone(),
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.arena[id] = Some(justification);
                id
            }
            None => {
                self.arena.push(Some(justification));
                self.arena.len() - 1
            }
        };
        self.by_fact.entry(fact).or_default().push(id);
        self.by_match.entry(support).or_default().push(id);
        true
    }

    /// Drops every justification a match provided. Returns the facts that
    /// were left without any support, in handle order.
    pub fn withdraw_match(&mut self, support: &MatchKey) -> Vec<FactHandle> {
        let Some(ids) = self.by_match.remove(support) else {
            return Vec::new();
        };
        let mut orphans = Vec::new();
        for id in ids {
            let Some(justification) = self.arena[id].take() else {
                continue;
            };
            self.free.push(id);
            if let Some(remaining) = self.by_fact.get_mut(&justification.fact) {
                remaining.retain(|&other| other != id);
                if remaining.is_empty() {
                    self.by_fact.remove(&justification.fact);
                    orphans.push(justification.fact);
                }
            }
        }
        orphans.sort_unstable();
        orphans
    }

    /// Drops every justification of a fact that left working memory.
    pub fn forget_fact(&mut self, fact: FactHandle) {
        let Some(ids) = self.by_fact.remove(&fact) else {
            return;
        };
        for id in ids {
            let Some(justification) = self.arena[id].take() else {
                continue;
            };
            self.free.push(id);
            if let Some(siblings) = self.by_match.get_mut(&justification.support) {
                siblings.retain(|&other| other != id);
                if siblings.is_empty() {
                    self.by_match.remove(&justification.support);
                }
            }
        }
    }
}
