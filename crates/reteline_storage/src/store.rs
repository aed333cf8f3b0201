//! The fact store: canonical table of live facts and their handles.
//!
//! The store owns fact lifecycles. Every other component refers to facts by
//! [`FactHandle`] only. Each mutation returns a [`Delta`] that the caller is
//! expected to push through the matching network before returning control.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use reteline_foundation::{Error, Fact, FactHandle, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::delta::{Delta, DeltaKind};

/// How a fact entered working memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InsertionKind {
    /// Inserted by the caller or by a rule action; lives until retracted.
    #[default]
    Explicit,
    /// Inserted logically by a rule action; lives while justified.
    Logical,
}

/// A live fact and its metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FactEntry {
    /// The fact value.
    pub fact: Fact,
    /// How it was inserted.
    pub kind: InsertionKind,
}

/// Canonical table of live facts.
#[derive(Clone, Debug, Default)]
pub struct FactStore {
    /// Live facts in handle order.
    facts: im::OrdMap<FactHandle, FactEntry>,
    /// Handles per concrete type name.
    by_type: HashMap<Arc<str>, BTreeSet<FactHandle>>,
    /// Handles per structural value, for logical-insertion equality.
    by_value: HashMap<Fact, BTreeSet<FactHandle>>,
    /// Next handle id to issue.
    next_id: u64,
    /// Set once the counter has passed `u64::MAX`; fresh handles then
    /// reuse the lowest id that is not live.
    exhausted: bool,
}

impl FactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Returns true if no facts are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Inserts a fact under a freshly issued handle.
    pub fn insert(&mut self, fact: Fact, kind: InsertionKind) -> (FactHandle, Delta) {
        let handle = self.issue();
        let delta = self.store(handle, fact, kind);
        (handle, delta)
    }

    fn issue(&mut self) -> FactHandle {
        if self.exhausted {
            return self.lowest_free();
        }
        let handle = FactHandle::new(self.next_id);
        self.advance_past(handle);
        handle
    }

    fn advance_past(&mut self, handle: FactHandle) {
        match handle.id().checked_add(1) {
            Some(next) => self.next_id = self.next_id.max(next),
            None => self.exhausted = true,
        }
    }

    fn lowest_free(&self) -> FactHandle {
        let mut candidate = 0u64;
        for handle in self.facts.keys() {
            if handle.id() > candidate {
                break;
            }
            candidate = handle.id().saturating_add(1);
        }
        FactHandle::new(candidate)
    }

    /// Inserts a fact under a caller-supplied handle.
    ///
    /// Later freshly issued handles never collide with it, including after
    /// a handle at the top of the id space.
    ///
    /// # Errors
    /// Returns [`DuplicateHandle`](reteline_foundation::ErrorKind::DuplicateHandle)
    /// if the handle is already live.
    pub fn insert_with_handle(
        &mut self,
        handle: FactHandle,
        fact: Fact,
        kind: InsertionKind,
    ) -> Result<Delta> {
        if self.facts.contains_key(&handle) {
            return Err(Error::duplicate_handle(handle));
        }
        self.advance_past(handle);
        Ok(self.store(handle, fact, kind))
    }

    fn store(&mut self, handle: FactHandle, fact: Fact, kind: InsertionKind) -> Delta {
        let fact_type = fact.type_name().clone();
        self.by_type
            .entry(fact_type.clone())
            .or_default()
            .insert(handle);
        self.by_value.entry(fact.clone()).or_default().insert(handle);
        self.facts.insert(handle, FactEntry { fact, kind });
        Delta::new(DeltaKind::Inserted, handle, fact_type)
    }

    /// Replaces the value of a live fact, keeping its handle and kind.
    ///
    /// Returns the previous value with the delta.
    ///
    /// # Errors
    /// Returns [`UnknownFact`](reteline_foundation::ErrorKind::UnknownFact)
    /// if the handle is not live.
    pub fn update(&mut self, handle: FactHandle, fact: Fact) -> Result<(Fact, Delta)> {
        let Some(entry) = self.facts.get_mut(&handle) else {
            return Err(Error::unknown_fact(handle));
        };
        let old = std::mem::replace(&mut entry.fact, fact.clone());

        Self::unindex(&mut self.by_value, &old, handle);
        self.by_value.entry(fact.clone()).or_default().insert(handle);

        if old.type_name() != fact.type_name() {
            if let Some(set) = self.by_type.get_mut(old.type_name()) {
                set.remove(&handle);
            }
            self.by_type
                .entry(fact.type_name().clone())
                .or_default()
                .insert(handle);
        }

        let delta = Delta::new(DeltaKind::Updated, handle, fact.type_name().clone());
        Ok((old, delta))
    }

    /// Removes a live fact.
    ///
    /// # Errors
    /// Returns [`UnknownFact`](reteline_foundation::ErrorKind::UnknownFact)
    /// if the handle is not live.
    pub fn retract(&mut self, handle: FactHandle) -> Result<(FactEntry, Delta)> {
        let entry = self
            .facts
            .remove(&handle)
            .ok_or_else(|| Error::unknown_fact(handle))?;

        if let Some(set) = self.by_type.get_mut(entry.fact.type_name()) {
            set.remove(&handle);
        }
        Self::unindex(&mut self.by_value, &entry.fact, handle);

        let delta = Delta::new(
            DeltaKind::Retracted,
            handle,
            entry.fact.type_name().clone(),
        );
        Ok((entry, delta))
    }

    fn unindex(by_value: &mut HashMap<Fact, BTreeSet<FactHandle>>, fact: &Fact, handle: FactHandle) {
        if let Some(set) = by_value.get_mut(fact) {
            set.remove(&handle);
            if set.is_empty() {
                by_value.remove(fact);
            }
        }
    }

    /// Gets a live fact.
    #[must_use]
    pub fn get(&self, handle: FactHandle) -> Option<&Fact> {
        self.facts.get(&handle).map(|e| &e.fact)
    }

    /// Gets a live fact with its metadata.
    #[must_use]
    pub fn entry(&self, handle: FactHandle) -> Option<&FactEntry> {
        self.facts.get(&handle)
    }

    /// Returns how a live fact was inserted.
    #[must_use]
    pub fn kind(&self, handle: FactHandle) -> Option<InsertionKind> {
        self.facts.get(&handle).map(|e| e.kind)
    }

    /// Returns true if the handle is live.
    #[must_use]
    pub fn contains(&self, handle: FactHandle) -> bool {
        self.facts.contains_key(&handle)
    }

    /// Iterates live facts in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (FactHandle, &FactEntry)> {
        self.facts.iter().map(|(h, e)| (*h, e))
    }

    /// Iterates handles of facts whose concrete type is `fact_type`.
    pub fn handles_of_type<'a>(&'a self, fact_type: &str) -> impl Iterator<Item = FactHandle> + 'a {
        self.by_type
            .get(fact_type)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Iterates handles of live facts structurally equal to `fact`.
    pub fn find_equal<'a>(&'a self, fact: &Fact) -> impl Iterator<Item = FactHandle> + 'a {
        self.by_value
            .get(fact)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }
}
