//! The agenda: pending activations and conflict resolution.
//!
//! Activations are queued per agenda group. Only the group on top of the
//! focus stack is eligible to fire; within it, higher salience fires first and
//! ties go to the most recently created activation. When the focused group
//! runs dry it is popped and focus returns to the group beneath it. `MAIN`
//! sits at the bottom of the stack and is never popped.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::rule::{MAIN_GROUP, Rule};
use crate::rulebase::RuleId;
use crate::token::{Bindings, FactTuple};

/// Identity of an activation within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivationId(u64);

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// A complete match of a rule, waiting to fire.
#[derive(Clone, Debug)]
pub struct Activation {
    /// Identity.
    pub id: ActivationId,
    /// The matched rule.
    pub rule: RuleId,
    /// The matched rule's name.
    pub rule_name: Arc<str>,
    /// The matched facts.
    pub facts: FactTuple,
    /// Variable bindings of the match.
    pub bindings: Bindings,
    /// Rule salience at creation.
    pub salience: i32,
    /// Creation order; later activations win salience ties.
    pub sequence: u64,
    /// Agenda group the activation is queued in.
    pub agenda_group: Arc<str>,
    /// Activation group, if any.
    pub activation_group: Option<Arc<str>>,
}

impl Activation {
    fn priority(&self) -> Priority {
        Priority(Reverse(self.salience), Reverse(self.sequence))
    }
}

/// Where an agenda group stands relative to the focus stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupState {
    /// Not on the focus stack.
    Inactive,
    /// On top of the focus stack: its activations may fire.
    Focused,
    /// On the focus stack below the top.
    Suspended,
}

/// Sort key: the smallest priority fires first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Priority(Reverse<i32>, Reverse<u64>);

#[derive(Debug, Default)]
struct AgendaGroup {
    queue: BTreeMap<Priority, ActivationId>,
    /// Set once the group has fired while focused; cleared when it loses
    /// focus.
    active: bool,
}

/// Pending activations of one session.
#[derive(Debug)]
pub struct Agenda {
    groups: HashMap<Arc<str>, AgendaGroup>,
    focus: Vec<Arc<str>>,
    activations: HashMap<ActivationId, Activation>,
    by_match: HashMap<(RuleId, FactTuple), ActivationId>,
    by_activation_group: HashMap<Arc<str>, BTreeSet<ActivationId>>,
    popped: Vec<Arc<str>>,
    next_id: u64,
    next_sequence: u64,
}

impl Default for Agenda {
    fn default() -> Self {
        Self::new()
    }
}

impl Agenda {
    /// Creates an empty agenda focused on `MAIN`.
    #[must_use]
    pub fn new() -> Self {
        let main: Arc<str> = Arc::from(MAIN_GROUP);
        let mut groups = HashMap::new();
        groups.insert(main.clone(), AgendaGroup::default());
        Self {
            groups,
            focus: vec![main],
            activations: HashMap::new(),
            by_match: HashMap::new(),
            by_activation_group: HashMap::new(),
            popped: Vec::new(),
            next_id: 0,
            next_sequence: 0,
        }
    }

    /// Total pending activations across all groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.activations.len()
    }

    /// True if nothing is pending in any group.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.activations.is_empty()
    }

    /// Pending activations in one group.
    #[must_use]
    pub fn group_len(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, |g| g.queue.len())
    }

    /// Looks up an activation.
    #[must_use]
    pub fn get(&self, id: ActivationId) -> Option<&Activation> {
        self.activations.get(&id)
    }

    /// The pending activation for a match, if any.
    #[must_use]
    pub fn activation_for(&self, rule: RuleId, facts: &FactTuple) -> Option<&Activation> {
        self.by_match
            .get(&(rule, facts.clone()))
            .and_then(|id| self.activations.get(id))
    }

    /// A group's activations in firing order.
    #[must_use]
    pub fn activations_in(&self, group: &str) -> Vec<&Activation> {
        self.groups.get(group).map_or_else(Vec::new, |g| {
            g.queue
                .values()
                .filter_map(|id| self.activations.get(id))
                .collect()
        })
    }

    // =========================================================================
    // Focus
    // =========================================================================

    /// The focused group.
    #[must_use]
    pub fn focus(&self) -> &str {
        self.focus.last().map_or(MAIN_GROUP, AsRef::as_ref)
    }

    /// The focus stack, bottom first.
    #[must_use]
    pub fn focus_stack(&self) -> &[Arc<str>] {
        &self.focus
    }

    /// Where a group stands relative to the focus stack.
    #[must_use]
    pub fn group_state(&self, group: &str) -> GroupState {
        if self.focus() == group {
            GroupState::Focused
        } else if self.focus.iter().any(|g| g.as_ref() == group) {
            GroupState::Suspended
        } else {
            GroupState::Inactive
        }
    }

    /// True while `group` is focused and has begun firing.
    #[must_use]
    pub fn is_group_active(&self, group: &str) -> bool {
        self.focus() == group && self.groups.get(group).is_some_and(|g| g.active)
    }

    /// Pushes `group` onto the focus stack unless it is already on top.
    /// Returns true if focus changed.
    pub fn set_focus(&mut self, group: impl Into<Arc<str>>) -> bool {
        let group = group.into();
        if self.focus() == group.as_ref() {
            return false;
        }
        if let Some(current) = self.focus.last() {
            if let Some(g) = self.groups.get_mut(current) {
                g.active = false;
            }
        }
        self.groups.entry(group.clone()).or_default();
        self.focus.push(group);
        true
    }

    /// Groups popped off the focus stack since the last call.
    pub(crate) fn take_popped(&mut self) -> Vec<Arc<str>> {
        std::mem::take(&mut self.popped)
    }

    // =========================================================================
    // Queueing
    // =========================================================================

    /// Queues an activation for a match. Adding a match that already has a
    /// pending activation returns the existing one.
    pub(crate) fn add(
        &mut self,
        id: RuleId,
        rule: &Rule,
        facts: FactTuple,
        bindings: Bindings,
    ) -> (ActivationId, bool) {
        let key = (id, facts);
        if let Some(existing) = self.by_match.get(&key) {
            return (*existing, false);
        }

        let activation_id = ActivationId(self.next_id);
        self.next_id += 1;
        let activation = Activation {
            id: activation_id,
            rule: id,
            rule_name: rule.name.clone(),
            facts: key.1.clone(),
            bindings,
            salience: rule.salience,
            sequence: self.next_sequence,
            agenda_group: rule.agenda_group.clone(),
            activation_group: rule.activation_group.clone(),
        };
        self.next_sequence += 1;

        self.groups
            .entry(activation.agenda_group.clone())
            .or_default()
            .queue
            .insert(activation.priority(), activation_id);
        if let Some(group) = &activation.activation_group {
            self.by_activation_group
                .entry(group.clone())
                .or_default()
                .insert(activation_id);
        }
        self.by_match.insert(key, activation_id);
        self.activations.insert(activation_id, activation);
        (activation_id, true)
    }

    fn detach(&mut self, id: ActivationId) -> Option<Activation> {
        let activation = self.activations.remove(&id)?;
        self.by_match
            .remove(&(activation.rule, activation.facts.clone()));
        if let Some(group) = &activation.activation_group {
            if let Some(members) = self.by_activation_group.get_mut(group) {
                members.remove(&id);
                if members.is_empty() {
                    self.by_activation_group.remove(group);
                }
            }
        }
        Some(activation)
    }

    /// Removes a pending activation.
    pub(crate) fn cancel(&mut self, id: ActivationId) -> Option<Activation> {
        let activation = self.detach(id)?;
        if let Some(group) = self.groups.get_mut(&activation.agenda_group) {
            group.queue.remove(&activation.priority());
        }
        Some(activation)
    }

    /// Removes the pending activation for a match, if any.
    pub(crate) fn cancel_match(&mut self, rule: RuleId, facts: &FactTuple) -> Option<Activation> {
        let id = *self.by_match.get(&(rule, facts.clone()))?;
        self.cancel(id)
    }

    /// Removes every other pending member of an activation group.
    pub(crate) fn cancel_activation_group(&mut self, group: &str) -> Vec<Activation> {
        let members = self.by_activation_group.remove(group).unwrap_or_default();
        members.into_iter().filter_map(|id| self.cancel(id)).collect()
    }

    /// Removes every pending activation, in creation order.
    pub(crate) fn clear(&mut self) -> Vec<Activation> {
        let mut ids: Vec<ActivationId> = self.activations.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(|id| self.cancel(id)).collect()
    }

    /// Removes every pending activation of one group, in firing order.
    pub(crate) fn clear_group(&mut self, group: &str) -> Vec<Activation> {
        let ids: Vec<ActivationId> = self
            .groups
            .get(group)
            .map(|g| g.queue.values().copied().collect())
            .unwrap_or_default();
        ids.into_iter().filter_map(|id| self.cancel(id)).collect()
    }

    /// Takes the next activation to fire, popping exhausted groups off the
    /// focus stack. Returns `None` once `MAIN` is focused and empty.
    pub(crate) fn pop(&mut self) -> Option<Activation> {
        loop {
            let top = self.focus.last()?.clone();
            let group = self.groups.entry(top.clone()).or_default();
            if let Some((_, id)) = group.queue.pop_first() {
                group.active = true;
                return self.detach(id);
            }
            group.active = false;
            if self.focus.len() <= 1 {
                return None;
            }
            self.focus.pop();
            self.popped.push(top);
        }
    }
}
