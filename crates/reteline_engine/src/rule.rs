//! Rule and query definitions.

use std::fmt;
use std::sync::Arc;

use reteline_foundation::Result;

use crate::condition::Condition;
use crate::context::RuleContext;

/// The default agenda group every rule belongs to unless told otherwise.
pub const MAIN_GROUP: &str = "MAIN";

/// A rule's right-hand side.
pub type Action = Arc<dyn Fn(&mut RuleContext<'_>) -> Result<()> + Send + Sync>;

// =============================================================================
// Rule
// =============================================================================

/// A production rule: conditions, attributes, and an action.
#[derive(Clone)]
pub struct Rule {
    /// Unique name within the rule base.
    pub name: Arc<str>,
    /// Conditions, matched left to right.
    pub conditions: Vec<Condition>,
    /// Priority (higher fires first).
    pub salience: i32,
    /// Suppress activations this rule creates for itself while firing.
    pub no_loop: bool,
    /// Suppress new activations while this rule's agenda group is active.
    pub lock_on_active: bool,
    /// Agenda group the rule's activations are queued in.
    pub agenda_group: Arc<str>,
    /// Mutual-exclusion group: firing one member cancels the others.
    pub activation_group: Option<Arc<str>>,
    /// Give the rule's agenda group focus when it activates.
    pub auto_focus: bool,
    /// Disabled rules are compiled but never activate.
    pub enabled: bool,
    pub(crate) action: Action,
}

impl Rule {
    /// Creates a rule with default attributes and no conditions.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            conditions: Vec::new(),
            salience: 0,
            no_loop: false,
            lock_on_active: false,
            agenda_group: Arc::from(MAIN_GROUP),
            activation_group: None,
            auto_focus: false,
            enabled: true,
            action: Arc::new(|_| Ok(())),
        }
    }

    /// Adds a condition.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Sets the action.
    #[must_use]
    pub fn then<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut RuleContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.action = Arc::new(action);
        self
    }

    /// Sets the salience (priority).
    #[must_use]
    pub fn with_salience(mut self, salience: i32) -> Self {
        self.salience = salience;
        self
    }

    /// Sets the no-loop flag.
    #[must_use]
    pub fn with_no_loop(mut self, no_loop: bool) -> Self {
        self.no_loop = no_loop;
        self
    }

    /// Sets the lock-on-active flag.
    #[must_use]
    pub fn with_lock_on_active(mut self, lock_on_active: bool) -> Self {
        self.lock_on_active = lock_on_active;
        self
    }

    /// Sets the agenda group.
    #[must_use]
    pub fn with_agenda_group(mut self, group: impl Into<Arc<str>>) -> Self {
        self.agenda_group = group.into();
        self
    }

    /// Sets the activation group.
    #[must_use]
    pub fn with_activation_group(mut self, group: impl Into<Arc<str>>) -> Self {
        self.activation_group = Some(group.into());
        self
    }

    /// Sets the auto-focus flag.
    #[must_use]
    pub fn with_auto_focus(mut self, auto_focus: bool) -> Self {
        self.auto_focus = auto_focus;
        self
    }

    /// Enables or disables the rule.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Number of fact slots in a full match.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.conditions
            .iter()
            .filter(|c| c.kind().is_positive())
            .count()
    }

    pub(crate) fn action(&self) -> &Action {
        &self.action
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("salience", &self.salience)
            .field("agenda_group", &self.agenda_group)
            .field("conditions", &self.conditions)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Query
// =============================================================================

/// A named, read-only pattern evaluated on demand.
#[derive(Clone, Debug)]
pub struct Query {
    /// Unique name within the rule base.
    pub name: Arc<str>,
    /// Variables the caller must bind when running the query.
    pub params: Vec<Arc<str>>,
    /// Conditions, matched left to right.
    pub conditions: Vec<Condition>,
}

impl Query {
    /// Creates a query with no parameters or conditions.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Declares a parameter.
    #[must_use]
    pub fn param(mut self, var: impl Into<Arc<str>>) -> Self {
        self.params.push(var.into());
        self
    }

    /// Adds a condition.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}
