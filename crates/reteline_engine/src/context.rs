//! The view a rule action gets of its match and session.

use std::sync::Arc;

use reteline_foundation::{Error, Fact, FactHandle, Result, Value};

use crate::agenda::Activation;
use crate::session::Session;
use crate::token::{Bindings, FactTuple};
use crate::truth::MatchKey;

/// Passed to a rule's action while it fires.
///
/// Reads go through the activation that fired; writes go to the session and
/// propagate before the call returns, so later reads in the same action see
/// their effects.
pub struct RuleContext<'s> {
    session: &'s mut Session,
    activation: &'s Activation,
}

impl<'s> RuleContext<'s> {
    pub(crate) fn new(session: &'s mut Session, activation: &'s Activation) -> Self {
        Self {
            session,
            activation,
        }
    }

    /// Name of the firing rule.
    #[must_use]
    pub fn rule(&self) -> &str {
        &self.activation.rule_name
    }

    /// The activation being fired.
    #[must_use]
    pub fn activation(&self) -> &Activation {
        self.activation
    }

    /// The matched facts, one per positive condition.
    #[must_use]
    pub fn facts(&self) -> &FactTuple {
        &self.activation.facts
    }

    /// Every variable bound by the match.
    #[must_use]
    pub fn bindings(&self) -> &Bindings {
        &self.activation.bindings
    }

    /// A bound variable, if bound.
    #[must_use]
    pub fn get(&self, var: &str) -> Option<&Value> {
        self.activation.bindings.get(var)
    }

    /// A bound variable.
    ///
    /// # Errors
    /// Returns [`UnboundVariable`](reteline_foundation::ErrorKind::UnboundVariable)
    /// if the match did not bind it.
    pub fn value(&self, var: &str) -> Result<&Value> {
        self.activation.bindings.require(var)
    }

    /// A variable bound to a fact handle.
    ///
    /// # Errors
    /// Returns an error if the variable is unbound or not a handle.
    pub fn handle(&self, var: &str) -> Result<FactHandle> {
        self.activation.bindings.handle(var)
    }

    /// A live fact.
    ///
    /// # Errors
    /// Returns [`UnknownFact`](reteline_foundation::ErrorKind::UnknownFact)
    /// if the handle is not live.
    pub fn fact(&self, handle: FactHandle) -> Result<&Fact> {
        self.session
            .get(handle)
            .ok_or_else(|| Error::unknown_fact(handle))
    }

    /// The live fact a handle variable points to.
    ///
    /// # Errors
    /// Returns an error if the variable is unbound, not a handle, or points
    /// to a fact that has since been retracted.
    pub fn bound_fact(&self, var: &str) -> Result<&Fact> {
        self.fact(self.handle(var)?)
    }

    /// Read access to the whole session.
    #[must_use]
    pub fn session(&self) -> &Session {
        self.session
    }

    /// Inserts a stated fact.
    pub fn insert(&mut self, fact: Fact) -> FactHandle {
        self.session.insert(fact)
    }

    /// Inserts a fact that lives only while this match holds.
    ///
    /// Returns `None` if the match has already stopped holding (for example
    /// because this action retracted one of its facts).
    pub fn insert_logical(&mut self, fact: Fact) -> Option<FactHandle> {
        let support = MatchKey::new(self.activation.rule, self.activation.facts.clone());
        self.session.insert_logical(support, fact)
    }

    /// Replaces a fact's value.
    ///
    /// # Errors
    /// Returns an error if the handle is not live.
    pub fn update(&mut self, handle: FactHandle, fact: Fact) -> Result<()> {
        self.session.update(handle, fact)
    }

    /// Edits a fact in place.
    ///
    /// # Errors
    /// Returns an error if the handle is not live.
    pub fn modify(&mut self, handle: FactHandle, edit: impl FnOnce(&mut Fact)) -> Result<()> {
        self.session.modify(handle, edit)
    }

    /// Retracts a fact.
    ///
    /// # Errors
    /// Returns an error if the handle is not live.
    pub fn retract(&mut self, handle: FactHandle) -> Result<()> {
        self.session.retract(handle)
    }

    /// Pushes an agenda group onto the focus stack.
    pub fn set_focus(&mut self, group: impl Into<Arc<str>>) {
        self.session.set_focus(group);
    }

    /// Stops the execution loop after this action returns.
    pub fn halt(&self) {
        self.session.halt();
    }
}
