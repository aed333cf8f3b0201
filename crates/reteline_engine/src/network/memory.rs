//! Per-session network memories and incremental propagation.
//!
//! Every beta node keeps:
//!
//! - its output tokens (the partial matches it passes on),
//! - its left input indexed by join key (tuples from the parent's output),
//! - its right input indexed by join key (facts from its alpha memory),
//! - which right facts currently pair with each left tuple, and the reverse.
//!
//! A change on either input only probes the opposite index under the same
//! key, so the cost of a change is proportional to what it can join with.
//! Removals follow the recorded pairings instead of re-evaluating anything.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use reteline_foundation::{Fact, FactHandle};
use reteline_storage::FactStore;

use super::accumulate::AccumulatorState;
use super::{BetaId, JoinKey, NetworkStats, Propagation, TerminalChange, Topology};
use crate::condition::ConditionKind;
use crate::rulebase::RuleId;
use crate::token::{Bindings, FactTuple};

#[derive(Debug, Default)]
struct BetaMemory {
    tokens: BTreeMap<FactTuple, Bindings>,
    left: HashMap<JoinKey, BTreeSet<FactTuple>>,
    left_keys: HashMap<FactTuple, JoinKey>,
    right: HashMap<JoinKey, BTreeSet<FactHandle>>,
    right_keys: HashMap<FactHandle, JoinKey>,
    by_left: HashMap<FactTuple, BTreeSet<FactHandle>>,
    by_right: HashMap<FactHandle, BTreeSet<FactTuple>>,
    accumulators: HashMap<FactTuple, AccumulatorState>,
}

impl BetaMemory {
    fn pair(&mut self, left: &FactTuple, handle: FactHandle) -> usize {
        self.by_right.entry(handle).or_default().insert(left.clone());
        let partners = self.by_left.entry(left.clone()).or_default();
        partners.insert(handle);
        partners.len()
    }

    fn unpair(&mut self, left: &FactTuple, handle: FactHandle) -> usize {
        self.by_left.get_mut(left).map_or(0, |partners| {
            partners.remove(&handle);
            partners.len()
        })
    }
}

/// One session's network state.
#[derive(Debug)]
pub(crate) struct NetworkMemory {
    alpha: Vec<BTreeSet<FactHandle>>,
    beta: Vec<BetaMemory>,
    stats: NetworkStats,
}

impl NetworkMemory {
    /// Creates empty memories for a topology.
    pub fn new(topo: &Topology) -> Self {
        Self {
            alpha: vec![BTreeSet::new(); topo.alpha.len()],
            beta: (0..topo.beta.len()).map(|_| BetaMemory::default()).collect(),
            stats: NetworkStats::default(),
        }
    }

    /// Feeds the empty root token into every rule.
    ///
    /// Rules without conditions match once, immediately; conditions that hold
    /// on an empty working memory (negations, accumulations) produce their
    /// tokens here.
    pub fn seed(&mut self, topo: &Topology, store: &FactStore) -> Propagation {
        let mut out = Propagation::default();
        for (index, entry) in topo.entries.iter().enumerate() {
            match entry {
                Some(node) => {
                    self.left_activate(
                        topo,
                        store,
                        *node,
                        FactTuple::empty(),
                        Bindings::new(),
                        &mut out,
                    );
                }
                None => out.changes.push(TerminalChange::Matched {
                    rule: RuleId(index),
                    tuple: FactTuple::empty(),
                    bindings: Bindings::new(),
                }),
            }
        }
        out
    }

    /// Work counters so far.
    pub fn stats(&self) -> NetworkStats {
        self.stats
    }

    /// Resets the work counters.
    pub fn reset_stats(&mut self) {
        self.stats = NetworkStats::default();
    }

    /// Current complete matches of a rule, in tuple order.
    pub fn matches(&self, topo: &Topology, rule: RuleId) -> Vec<(FactTuple, Bindings)> {
        match topo.terminals.get(rule.0) {
            Some(Some(node)) => self.beta[*node]
                .tokens
                .iter()
                .map(|(t, b)| (t.clone(), b.clone()))
                .collect(),
            Some(None) => vec![(FactTuple::empty(), Bindings::new())],
            None => Vec::new(),
        }
    }

    /// True if `tuple` is currently a complete match of `rule`.
    pub fn has_match(&self, topo: &Topology, rule: RuleId, tuple: &FactTuple) -> bool {
        match topo.terminals.get(rule.0) {
            Some(Some(node)) => self.beta[*node].tokens.contains_key(tuple),
            Some(None) => tuple.is_empty(),
            None => false,
        }
    }

    /// Number of facts held by an alpha memory.
    #[cfg(test)]
    fn alpha_len(&self, id: usize) -> usize {
        self.alpha[id].len()
    }

    // =========================================================================
    // Fact Changes
    // =========================================================================

    /// Routes a newly live fact through the alpha network and onward.
    pub fn assert_fact(
        &mut self,
        topo: &Topology,
        store: &FactStore,
        handle: FactHandle,
        out: &mut Propagation,
    ) {
        let Some(fact) = store.get(handle) else {
            return;
        };
        let Some(alphas) = topo.routes.get(fact.fact_type()) else {
            return;
        };
        for &alpha in alphas {
            self.stats.alpha_evaluations += 1;
            let node = &topo.alpha[alpha];
            match node.passes(fact) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(error) => {
                    out.fail(node.rules.clone(), Some(handle), error);
                    continue;
                }
            }
            self.alpha[alpha].insert(handle);
            for &beta in &node.successors {
                self.right_activate(topo, store, beta, handle, fact, out);
            }
        }
    }

    /// Withdraws a fact (already removed from or replaced in the store)
    /// from every memory that holds it.
    pub fn retract_fact(
        &mut self,
        topo: &Topology,
        store: &FactStore,
        handle: FactHandle,
        fact_type: &str,
        out: &mut Propagation,
    ) {
        let Some(alphas) = topo.routes.get(fact_type) else {
            return;
        };
        for &alpha in alphas {
            if !self.alpha[alpha].remove(&handle) {
                continue;
            }
            for &beta in &topo.alpha[alpha].successors {
                self.right_retract(topo, store, beta, handle, out);
            }
        }
    }

    // =========================================================================
    // Token Output
    // =========================================================================

    fn emit(
        &mut self,
        topo: &Topology,
        store: &FactStore,
        node: BetaId,
        tuple: FactTuple,
        bindings: Bindings,
        out: &mut Propagation,
    ) {
        self.beta[node].tokens.insert(tuple.clone(), bindings.clone());
        self.stats.tokens_created += 1;
        let beta = &topo.beta[node];
        match beta.child {
            Some(child) => self.left_activate(topo, store, child, tuple, bindings, out),
            None => out.changes.push(TerminalChange::Matched {
                rule: beta.rule,
                tuple,
                bindings,
            }),
        }
    }

    fn withdraw(
        &mut self,
        topo: &Topology,
        store: &FactStore,
        node: BetaId,
        tuple: &FactTuple,
        out: &mut Propagation,
    ) {
        if self.beta[node].tokens.remove(tuple).is_none() {
            return;
        }
        self.stats.tokens_removed += 1;
        let beta = &topo.beta[node];
        match beta.child {
            Some(child) => self.left_retract(topo, store, child, tuple, out),
            None => out.changes.push(TerminalChange::Unmatched {
                rule: beta.rule,
                tuple: tuple.clone(),
            }),
        }
    }

    fn left_bindings(&self, topo: &Topology, node: BetaId, left: &FactTuple) -> Option<Bindings> {
        match topo.beta[node].parent {
            Some(parent) => self.beta[parent].tokens.get(left).cloned(),
            None => Some(Bindings::new()),
        }
    }

    // =========================================================================
    // Left Input
    // =========================================================================

    fn left_activate(
        &mut self,
        topo: &Topology,
        store: &FactStore,
        node: BetaId,
        left: FactTuple,
        bindings: Bindings,
        out: &mut Propagation,
    ) {
        let beta = &topo.beta[node];
        let key = match beta.left_key(&bindings) {
            Ok(key) => key,
            Err(error) => {
                out.fail(vec![beta.rule_name.clone()], left.handles().last().copied(), error);
                return;
            }
        };

        let mem = &mut self.beta[node];
        mem.left.entry(key.clone()).or_default().insert(left.clone());
        mem.left_keys.insert(left.clone(), key.clone());
        let candidates: Vec<FactHandle> = mem
            .right
            .get(&key)
            .map(|facts| facts.iter().copied().collect())
            .unwrap_or_default();

        let mut matched: Vec<(FactHandle, &Fact)> = Vec::new();
        for handle in candidates {
            let Some(fact) = store.get(handle) else {
                continue;
            };
            self.stats.join_evaluations += 1;
            match beta.test(fact, &bindings) {
                Ok(true) => matched.push((handle, fact)),
                Ok(false) => {}
                Err(error) => out.fail(vec![beta.rule_name.clone()], Some(handle), error),
            }
        }

        match &beta.condition.kind {
            ConditionKind::Positive => {
                for (handle, fact) in matched {
                    self.join(topo, store, node, &left, &bindings, handle, fact, out);
                }
            }
            ConditionKind::Not => {
                let mem = &mut self.beta[node];
                for (handle, _) in &matched {
                    mem.pair(&left, *handle);
                }
                if matched.is_empty() {
                    self.emit(topo, store, node, left, bindings, out);
                }
            }
            ConditionKind::Exists => {
                let mem = &mut self.beta[node];
                for (handle, _) in &matched {
                    mem.pair(&left, *handle);
                }
                if !matched.is_empty() {
                    self.emit(topo, store, node, left, bindings, out);
                }
            }
            ConditionKind::Accumulate(acc) => {
                let mut state = AccumulatorState::new();
                let mem = &mut self.beta[node];
                for (handle, fact) in matched {
                    match acc.function.contribution(fact) {
                        Ok(value) => {
                            state.add(&acc.function, handle, value);
                            mem.pair(&left, handle);
                        }
                        Err(error) => out.fail(vec![beta.rule_name.clone()], Some(handle), error),
                    }
                }
                mem.accumulators.insert(left.clone(), state);
                self.refresh_accumulate(topo, store, node, &left, &bindings, out);
            }
        }
    }

    fn left_retract(
        &mut self,
        topo: &Topology,
        store: &FactStore,
        node: BetaId,
        left: &FactTuple,
        out: &mut Propagation,
    ) {
        let mem = &mut self.beta[node];
        if let Some(key) = mem.left_keys.remove(left) {
            if let Some(bucket) = mem.left.get_mut(&key) {
                bucket.remove(left);
                if bucket.is_empty() {
                    mem.left.remove(&key);
                }
            }
        }
        let partners = mem.by_left.remove(left).unwrap_or_default();
        for handle in &partners {
            if let Some(lefts) = mem.by_right.get_mut(handle) {
                lefts.remove(left);
                if lefts.is_empty() {
                    mem.by_right.remove(handle);
                }
            }
        }
        mem.accumulators.remove(left);

        if topo.beta[node].condition.kind.is_positive() {
            for handle in partners {
                self.withdraw(topo, store, node, &left.extend(handle), out);
            }
        } else {
            self.withdraw(topo, store, node, left, out);
        }
    }

    // =========================================================================
    // Right Input
    // =========================================================================

    fn right_activate(
        &mut self,
        topo: &Topology,
        store: &FactStore,
        node: BetaId,
        handle: FactHandle,
        fact: &Fact,
        out: &mut Propagation,
    ) {
        let beta = &topo.beta[node];
        let key = match beta.right_key(fact) {
            Ok(key) => key,
            Err(error) => {
                out.fail(vec![beta.rule_name.clone()], Some(handle), error);
                return;
            }
        };

        let mem = &mut self.beta[node];
        mem.right.entry(key.clone()).or_default().insert(handle);
        mem.right_keys.insert(handle, key.clone());
        let candidates: Vec<FactTuple> = mem
            .left
            .get(&key)
            .map(|tuples| tuples.iter().cloned().collect())
            .unwrap_or_default();

        for left in candidates {
            let Some(bindings) = self.left_bindings(topo, node, &left) else {
                continue;
            };
            self.stats.join_evaluations += 1;
            match beta.test(fact, &bindings) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(error) => {
                    out.fail(vec![beta.rule_name.clone()], Some(handle), error);
                    continue;
                }
            }

            match &beta.condition.kind {
                ConditionKind::Positive => {
                    self.join(topo, store, node, &left, &bindings, handle, fact, out);
                }
                ConditionKind::Not => {
                    if self.beta[node].pair(&left, handle) == 1 {
                        self.withdraw(topo, store, node, &left, out);
                    }
                }
                ConditionKind::Exists => {
                    if self.beta[node].pair(&left, handle) == 1 {
                        self.emit(topo, store, node, left, bindings, out);
                    }
                }
                ConditionKind::Accumulate(acc) => match acc.function.contribution(fact) {
                    Ok(value) => {
                        let mem = &mut self.beta[node];
                        mem.pair(&left, handle);
                        if let Some(state) = mem.accumulators.get_mut(&left) {
                            state.add(&acc.function, handle, value);
                        }
                        self.refresh_accumulate(topo, store, node, &left, &bindings, out);
                    }
                    Err(error) => out.fail(vec![beta.rule_name.clone()], Some(handle), error),
                },
            }
        }
    }

    fn right_retract(
        &mut self,
        topo: &Topology,
        store: &FactStore,
        node: BetaId,
        handle: FactHandle,
        out: &mut Propagation,
    ) {
        let mem = &mut self.beta[node];
        if let Some(key) = mem.right_keys.remove(&handle) {
            if let Some(bucket) = mem.right.get_mut(&key) {
                bucket.remove(&handle);
                if bucket.is_empty() {
                    mem.right.remove(&key);
                }
            }
        }
        let lefts = mem.by_right.remove(&handle).unwrap_or_default();

        let beta = &topo.beta[node];
        for left in lefts {
            let remaining = self.beta[node].unpair(&left, handle);
            match &beta.condition.kind {
                ConditionKind::Positive => {
                    if remaining == 0 {
                        self.beta[node].by_left.remove(&left);
                    }
                    self.withdraw(topo, store, node, &left.extend(handle), out);
                }
                ConditionKind::Not => {
                    if remaining == 0 {
                        if let Some(bindings) = self.left_bindings(topo, node, &left) {
                            self.emit(topo, store, node, left, bindings, out);
                        }
                    }
                }
                ConditionKind::Exists => {
                    if remaining == 0 {
                        self.withdraw(topo, store, node, &left, out);
                    }
                }
                ConditionKind::Accumulate(acc) => {
                    if let Some(state) = self.beta[node].accumulators.get_mut(&left) {
                        if state.remove(&acc.function, handle) {
                            self.stats.accumulate_rescans += 1;
                        }
                    }
                    if let Some(bindings) = self.left_bindings(topo, node, &left) {
                        self.refresh_accumulate(topo, store, node, &left, &bindings, out);
                    }
                }
            }
        }
    }

    // =========================================================================
    // Node Kinds
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    fn join(
        &mut self,
        topo: &Topology,
        store: &FactStore,
        node: BetaId,
        left: &FactTuple,
        bindings: &Bindings,
        handle: FactHandle,
        fact: &Fact,
        out: &mut Propagation,
    ) {
        let beta = &topo.beta[node];
        match beta.condition.bind_fact(handle, fact, bindings) {
            Ok(extended) => {
                self.beta[node].pair(left, handle);
                self.emit(topo, store, node, left.extend(handle), extended, out);
            }
            Err(error) => out.fail(vec![beta.rule_name.clone()], Some(handle), error),
        }
    }

    /// Re-derives an accumulate node's output for one left tuple.
    fn refresh_accumulate(
        &mut self,
        topo: &Topology,
        store: &FactStore,
        node: BetaId,
        left: &FactTuple,
        bindings: &Bindings,
        out: &mut Propagation,
    ) {
        let ConditionKind::Accumulate(acc) = &topo.beta[node].condition.kind else {
            return;
        };
        let mem = &self.beta[node];
        let Some(state) = mem.accumulators.get(left) else {
            return;
        };
        let result = state.result(&acc.function);
        let holds = acc
            .having
            .as_ref()
            .is_none_or(|(op, value)| op.test(&result, value));

        let previous = mem.tokens.get(left).and_then(|b| b.get(&acc.result));
        if holds && previous == Some(&result) {
            return;
        }
        self.withdraw(topo, store, node, left, out);
        if holds {
            let extended = bindings.bind(acc.result.clone(), result);
            self.emit(topo, store, node, left.clone(), extended, out);
        }
    }
}
