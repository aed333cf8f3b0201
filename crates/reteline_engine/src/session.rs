//! Stateful sessions: working memory, propagation, and the execution loop.
//!
//! A session owns everything that changes while rules run: the fact store,
//! the network memories, the agenda, and the justification arena. Every
//! public mutation propagates completely through the network, and settles
//! truth maintenance, before it returns.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use reteline_foundation::{Error, ErrorKind, Fact, FactHandle, Result, Value};
use reteline_storage::{FactStore, InsertionKind};
use tracing::{debug, trace, warn};

use crate::agenda::{Activation, Agenda};
use crate::condition::Condition;
use crate::config::SessionConfig;
use crate::context::RuleContext;
use crate::event::{CancelReason, EngineEvent, EngineListener};
use crate::halt::HaltHandle;
use crate::network::{NetworkMemory, NetworkStats, Propagation, TerminalChange};
use crate::query::{self, QueryRow};
use crate::rulebase::{RuleBase, RuleId, validate_conditions};
use crate::token::{Bindings, FactTuple};
use crate::truth::{MatchKey, TruthMaintenance};

/// A working memory bound to a shared [`RuleBase`].
///
/// Sessions are `Send` but meant to be driven from one thread at a time.
/// The only cross-thread entry point is the [`HaltHandle`].
pub struct Session {
    rulebase: Arc<RuleBase>,
    config: SessionConfig,
    store: FactStore,
    network: NetworkMemory,
    agenda: Agenda,
    truth: TruthMaintenance,
    listeners: Vec<Box<dyn EngineListener>>,
    halt: HaltHandle,
    /// The match whose action is running, if any.
    firing: Option<MatchKey>,
    /// Logical facts that lost a justification and may need retracting.
    pending: VecDeque<FactHandle>,
    settling: bool,
}

impl Session {
    /// Opens a session with default configuration.
    #[must_use]
    pub fn new(rulebase: Arc<RuleBase>) -> Self {
        Self::with_config(rulebase, SessionConfig::default())
    }

    /// Opens a session with the given configuration.
    #[must_use]
    pub fn with_config(rulebase: Arc<RuleBase>, config: SessionConfig) -> Self {
        let store = FactStore::new();
        let mut network = NetworkMemory::new(&rulebase.topology);
        let seeded = network.seed(&rulebase.topology, &store);
        let mut session = Self {
            rulebase,
            config,
            store,
            network,
            agenda: Agenda::new(),
            truth: TruthMaintenance::new(),
            listeners: Vec::new(),
            halt: HaltHandle::new(),
            firing: None,
            pending: VecDeque::new(),
            settling: false,
        };
        session.apply(seeded);
        session
    }

    /// The rule base this session runs.
    #[must_use]
    pub fn rulebase(&self) -> &Arc<RuleBase> {
        &self.rulebase
    }

    /// The session's configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registers a listener. Listeners see events in registration order.
    pub fn add_listener(&mut self, listener: impl EngineListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    // =========================================================================
    // Working Memory
    // =========================================================================

    /// Inserts a stated fact and propagates it.
    pub fn insert(&mut self, fact: Fact) -> FactHandle {
        let (handle, delta) = self.store.insert(fact, InsertionKind::Explicit);
        self.propagate_insert(handle, delta.fact_type, InsertionKind::Explicit);
        handle
    }

    /// Inserts a stated fact under a caller-chosen handle.
    ///
    /// # Errors
    /// Returns [`ErrorKind::DuplicateHandle`] if the handle is live.
    pub fn insert_with_handle(&mut self, handle: FactHandle, fact: Fact) -> Result<()> {
        let delta = self
            .store
            .insert_with_handle(handle, fact, InsertionKind::Explicit)?;
        self.propagate_insert(handle, delta.fact_type, InsertionKind::Explicit);
        Ok(())
    }

    /// Replaces a fact's value, keeping its handle, and re-matches it.
    ///
    /// # Errors
    /// Returns [`ErrorKind::UnknownFact`] if the handle is not live.
    pub fn update(&mut self, handle: FactHandle, fact: Fact) -> Result<()> {
        let (old, delta) = self.store.update(handle, fact)?;
        debug!(%handle, fact_type = %delta.fact_type, "update");
        if self.config.fact_events {
            self.emit(EngineEvent::FactUpdated {
                handle,
                fact_type: delta.fact_type,
            });
        }

        let mut out = Propagation::default();
        let topology = &self.rulebase.topology;
        self.network
            .retract_fact(topology, &self.store, handle, old.fact_type(), &mut out);
        self.network
            .assert_fact(topology, &self.store, handle, &mut out);
        self.apply(out);
        Ok(())
    }

    /// Edits a fact in place through a closure, then updates it.
    ///
    /// # Errors
    /// Returns [`ErrorKind::UnknownFact`] if the handle is not live.
    pub fn modify(&mut self, handle: FactHandle, edit: impl FnOnce(&mut Fact)) -> Result<()> {
        let mut fact = self
            .store
            .get(handle)
            .cloned()
            .ok_or_else(|| Error::unknown_fact(handle))?;
        edit(&mut fact);
        self.update(handle, fact)
    }

    /// Removes a fact, stated or logical.
    ///
    /// # Errors
    /// Returns [`ErrorKind::UnknownFact`] if the handle is not live.
    pub fn retract(&mut self, handle: FactHandle) -> Result<()> {
        self.retract_internal(handle)
    }

    /// Gets a live fact.
    #[must_use]
    pub fn get(&self, handle: FactHandle) -> Option<&Fact> {
        self.store.get(handle)
    }

    /// How a live fact was inserted.
    #[must_use]
    pub fn kind(&self, handle: FactHandle) -> Option<InsertionKind> {
        self.store.kind(handle)
    }

    /// True if the handle is live.
    #[must_use]
    pub fn contains(&self, handle: FactHandle) -> bool {
        self.store.contains(handle)
    }

    /// Number of live facts.
    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.store.len()
    }

    /// Every live fact in handle order.
    pub fn facts(&self) -> impl Iterator<Item = (FactHandle, &Fact)> {
        self.store.iter().map(|(handle, entry)| (handle, &entry.fact))
    }

    /// Live facts of a type or any of its subtypes, in handle order.
    pub fn facts_of_type<'a>(
        &'a self,
        fact_type: &'a str,
    ) -> impl Iterator<Item = (FactHandle, &'a Fact)> + 'a {
        self.facts()
            .filter(move |(_, fact)| self.rulebase.is_instance(fact.fact_type(), fact_type))
    }

    /// The matches currently justifying a logical fact.
    #[must_use]
    pub fn supports(&self, handle: FactHandle) -> Vec<MatchKey> {
        self.truth.supports(handle).into_iter().cloned().collect()
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Fires activations until the agenda is exhausted, the session is
    /// halted, or the firing ceiling is reached. Returns how many actions
    /// completed.
    pub fn fire_all_rules(&mut self) -> usize {
        self.run(None, false)
    }

    /// Like [`fire_all_rules`](Self::fire_all_rules), firing at most `limit`
    /// activations.
    pub fn fire_all_rules_limit(&mut self, limit: usize) -> usize {
        self.run(Some(limit), false)
    }

    /// Fires activations as they appear, blocking while the agenda is empty,
    /// until a halt is requested through a [`HaltHandle`].
    pub fn fire_until_halt(&mut self) -> usize {
        self.run(None, true)
    }

    /// Requests that the running (or next) execution loop stop.
    pub fn halt(&self) {
        self.halt.halt();
    }

    /// A handle that can halt this session from any thread.
    #[must_use]
    pub fn halt_handle(&self) -> HaltHandle {
        self.halt.clone()
    }

    fn run(&mut self, limit: Option<usize>, until_halt: bool) -> usize {
        let mut completed = 0;
        // Firings since the agenda last ran dry.
        let mut burst = 0;
        let mut last: Option<Arc<str>> = None;

        loop {
            if self.halt.take() {
                debug!(fired = completed, "halted");
                break;
            }
            if limit.is_some_and(|limit| completed >= limit) {
                break;
            }
            if burst >= self.config.max_firings {
                let error = Error::activation_loop(
                    self.config.max_firings,
                    last.as_ref().map(ToString::to_string),
                );
                warn!(%error, "stopping execution loop");
                self.emit(EngineEvent::LoopCeilingReached {
                    limit: self.config.max_firings,
                    rule: last.clone(),
                });
                break;
            }

            let next = self.agenda.pop();
            for group in self.agenda.take_popped() {
                self.emit(EngineEvent::FocusPopped { group });
            }
            let Some(activation) = next else {
                if until_halt {
                    burst = 0;
                    self.halt.wait();
                    continue;
                }
                break;
            };

            burst += 1;
            last = Some(activation.rule_name.clone());
            if self.fire(&activation) {
                completed += 1;
            }
        }
        completed
    }

    fn fire(&mut self, activation: &Activation) -> bool {
        if let Some(group) = &activation.activation_group {
            for cancelled in self.agenda.cancel_activation_group(group) {
                self.emit_cancelled(&cancelled, CancelReason::ActivationGroup);
            }
        }

        debug!(rule = %activation.rule_name, facts = %activation.facts, "fire");
        self.emit(EngineEvent::BeforeMatchFired {
            rule: activation.rule_name.clone(),
            facts: activation.facts.clone(),
        });

        let action = Arc::clone(self.rulebase.rule(activation.rule).action());
        let previous = self
            .firing
            .replace(MatchKey::new(activation.rule, activation.facts.clone()));
        let result = action(&mut RuleContext::new(self, activation));
        self.firing = previous;

        match result {
            Ok(()) => {
                self.emit(EngineEvent::AfterMatchFired {
                    rule: activation.rule_name.clone(),
                    facts: activation.facts.clone(),
                });
                true
            }
            Err(error) => {
                warn!(rule = %activation.rule_name, facts = %activation.facts, %error, "action failed");
                self.emit(EngineEvent::ActionFailed {
                    rule: activation.rule_name.clone(),
                    facts: activation.facts.clone(),
                    error: error.to_string(),
                });
                false
            }
        }
    }

    // =========================================================================
    // Agenda Control
    // =========================================================================

    /// Pushes an agenda group onto the focus stack.
    pub fn set_focus(&mut self, group: impl Into<Arc<str>>) {
        let group = group.into();
        if self.agenda.set_focus(group.clone()) {
            self.emit(EngineEvent::FocusPushed { group });
        }
    }

    /// The focused agenda group.
    #[must_use]
    pub fn focus(&self) -> &str {
        self.agenda.focus()
    }

    /// Cancels every pending activation.
    pub fn clear_agenda(&mut self) {
        for cancelled in self.agenda.clear() {
            self.emit_cancelled(&cancelled, CancelReason::Cleared);
        }
    }

    /// Cancels every pending activation of one agenda group.
    pub fn clear_agenda_group(&mut self, group: &str) {
        for cancelled in self.agenda.clear_group(group) {
            self.emit_cancelled(&cancelled, CancelReason::Cleared);
        }
    }

    /// Number of pending activations across all groups.
    #[must_use]
    pub fn agenda_size(&self) -> usize {
        self.agenda.len()
    }

    /// The agenda, for inspection.
    #[must_use]
    pub fn agenda(&self) -> &Agenda {
        &self.agenda
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Runs a named query with its parameters bound.
    ///
    /// # Errors
    /// Returns [`ErrorKind::UnknownQuery`] for an unknown name,
    /// [`ErrorKind::UnboundVariable`] if a parameter is missing, and
    /// [`ErrorKind::InvalidRule`] if an argument names no parameter.
    pub fn query(&self, name: &str, args: &[(&str, Value)]) -> Result<Vec<QueryRow>> {
        let query = self.rulebase.query(name)?;
        for (arg, _) in args {
            if !query.params.iter().any(|p| p.as_ref() == *arg) {
                return Err(Error::invalid_rule(name, format!("unknown parameter {arg}")));
            }
        }
        let mut initial = Bindings::new();
        for param in &query.params {
            let value = args
                .iter()
                .find(|(arg, _)| *arg == param.as_ref())
                .map(|(_, value)| value.clone())
                .ok_or_else(|| Error::new(ErrorKind::UnboundVariable(param.to_string())))?;
            initial = initial.bind(param.clone(), value);
        }
        Ok(query::evaluate(&self.rulebase, &self.store, &query.conditions, initial))
    }

    /// Evaluates ad hoc conditions against current working memory.
    ///
    /// # Errors
    /// Returns an error if a join reads a variable no earlier condition
    /// binds.
    pub fn evaluate(&self, conditions: &[Condition]) -> Result<Vec<QueryRow>> {
        validate_conditions(&Arc::from("evaluate"), conditions, &[])?;
        Ok(query::evaluate(&self.rulebase, &self.store, conditions, Bindings::new()))
    }

    /// A rule's current complete matches as held by the network, in tuple
    /// order.
    ///
    /// # Errors
    /// Returns [`ErrorKind::UnknownRule`] for an unknown name.
    pub fn matches(&self, rule: &str) -> Result<Vec<(FactTuple, Bindings)>> {
        let id = self.rulebase.rule_id(rule)?;
        Ok(self.network.matches(&self.rulebase.topology, id))
    }

    /// Matching work done so far.
    #[must_use]
    pub fn stats(&self) -> NetworkStats {
        self.network.stats()
    }

    /// Resets the matching work counters.
    pub fn reset_stats(&mut self) {
        self.network.reset_stats();
    }

    // =========================================================================
    // Propagation
    // =========================================================================

    fn propagate_insert(&mut self, handle: FactHandle, fact_type: Arc<str>, kind: InsertionKind) {
        debug!(%handle, %fact_type, ?kind, "insert");
        if self.config.fact_events {
            self.emit(EngineEvent::FactInserted {
                handle,
                fact_type,
                kind,
            });
        }
        let mut out = Propagation::default();
        self.network
            .assert_fact(&self.rulebase.topology, &self.store, handle, &mut out);
        self.apply(out);
    }

    fn retract_internal(&mut self, handle: FactHandle) -> Result<()> {
        let (entry, delta) = self.store.retract(handle)?;
        self.truth.forget_fact(handle);
        debug!(%handle, fact_type = %delta.fact_type, kind = ?entry.kind, "retract");
        if self.config.fact_events {
            self.emit(EngineEvent::FactRetracted {
                handle,
                fact_type: delta.fact_type,
                kind: entry.kind,
            });
        }
        let mut out = Propagation::default();
        self.network.retract_fact(
            &self.rulebase.topology,
            &self.store,
            handle,
            entry.fact.fact_type(),
            &mut out,
        );
        self.apply(out);
        Ok(())
    }

    /// Inserts a fact justified by `support`.
    ///
    /// Returns `None` if `support` no longer matches. An equal stated fact
    /// is returned as is; an equal logical fact gains the justification.
    pub(crate) fn insert_logical(&mut self, support: MatchKey, fact: Fact) -> Option<FactHandle> {
        if !self
            .network
            .has_match(&self.rulebase.topology, support.rule, &support.facts)
        {
            debug!(rule = support.rule.index(), facts = %support.facts, "logical insert from a dead match");
            return None;
        }

        let equal: Vec<FactHandle> = self.store.find_equal(&fact).collect();
        if let Some(&stated) = equal
            .iter()
            .find(|h| self.store.kind(**h) == Some(InsertionKind::Explicit))
        {
            return Some(stated);
        }
        if let Some(&derived) = equal.first() {
            self.truth.justify(derived, support);
            return Some(derived);
        }

        let (handle, delta) = self.store.insert(fact, InsertionKind::Logical);
        self.truth.justify(handle, support);
        self.propagate_insert(handle, delta.fact_type, InsertionKind::Logical);
        Some(handle)
    }

    fn apply(&mut self, propagation: Propagation) {
        for failure in propagation.failures {
            warn!(rules = ?failure.rules, fact = ?failure.fact, error = %failure.error, "constraint failed");
            self.emit(EngineEvent::ConstraintFailed {
                rules: failure.rules,
                fact: failure.fact,
                error: failure.error.to_string(),
            });
        }
        // A tuple that is unmatched and then matched again within one
        // propagation (an update that keeps the match) keeps its support.
        let mut last_matched: HashMap<MatchKey, usize> = HashMap::new();
        for (index, change) in propagation.changes.iter().enumerate() {
            if let TerminalChange::Matched { rule, tuple, .. } = change {
                last_matched.insert(MatchKey::new(*rule, tuple.clone()), index);
            }
        }
        for (index, change) in propagation.changes.into_iter().enumerate() {
            match change {
                TerminalChange::Matched {
                    rule,
                    tuple,
                    bindings,
                } => self.on_match(rule, tuple, bindings),
                TerminalChange::Unmatched { rule, tuple } => {
                    let key = MatchKey::new(rule, tuple);
                    let rematched = last_matched.get(&key).is_some_and(|&at| at > index);
                    self.on_unmatch(key, rematched);
                }
            }
        }
        self.settle();
    }

    fn on_match(&mut self, id: RuleId, tuple: FactTuple, bindings: Bindings) {
        let rulebase = Arc::clone(&self.rulebase);
        let rule = rulebase.rule(id);
        if !rule.enabled {
            return;
        }
        if rule.no_loop && self.firing.as_ref().is_some_and(|m| m.rule == id) {
            trace!(rule = %rule.name, facts = %tuple, "no-loop suppressed activation");
            return;
        }
        if rule.lock_on_active && self.agenda.is_group_active(&rule.agenda_group) {
            trace!(rule = %rule.name, facts = %tuple, "lock-on-active suppressed activation");
            return;
        }

        let (_, created) = self.agenda.add(id, rule, tuple.clone(), bindings);
        if !created {
            return;
        }
        if self.config.agenda_events {
            self.emit(EngineEvent::ActivationCreated {
                rule: rule.name.clone(),
                facts: tuple,
            });
        }
        if rule.auto_focus {
            self.set_focus(rule.agenda_group.clone());
        }
    }

    fn on_unmatch(&mut self, key: MatchKey, rematched: bool) {
        if let Some(cancelled) = self.agenda.cancel_match(key.rule, &key.facts) {
            self.emit_cancelled(&cancelled, CancelReason::Unmatched);
        }
        if rematched {
            return;
        }
        let orphans = self.truth.withdraw_match(&key);
        self.pending.extend(orphans);
    }

    /// Retracts logical facts left without justification, including those
    /// orphaned by the retractions themselves.
    fn settle(&mut self) {
        if self.settling {
            return;
        }
        self.settling = true;
        let mut visited = HashSet::new();
        while let Some(handle) = self.pending.pop_front() {
            if self.store.kind(handle) != Some(InsertionKind::Logical)
                || self.truth.is_justified(handle)
                || !visited.insert(handle)
            {
                continue;
            }
            if let Err(error) = self.retract_internal(handle) {
                warn!(%handle, %error, "failed to retract unsupported logical fact");
            }
        }
        self.settling = false;
    }

    // =========================================================================
    // Events
    // =========================================================================

    fn emit(&mut self, event: EngineEvent) {
        for listener in &mut self.listeners {
            listener.on_event(&event);
        }
    }

    fn emit_cancelled(&mut self, activation: &Activation, reason: CancelReason) {
        if self.config.agenda_events {
            self.emit(EngineEvent::ActivationCancelled {
                rule: activation.rule_name.clone(),
                facts: activation.facts.clone(),
                reason,
            });
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("rulebase", &self.rulebase)
            .field("facts", &self.store.len())
            .field("agenda", &self.agenda.len())
            .field("justifications", &self.truth.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}
