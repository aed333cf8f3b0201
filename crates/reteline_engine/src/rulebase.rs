//! Compiled, shareable rule bases.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use reteline_foundation::{Error, ErrorContext, ErrorKind, Result, TypeHierarchy};

use crate::condition::{Condition, ConditionKind};
use crate::config::SessionConfig;
use crate::network::Topology;
use crate::rule::{Query, Rule};
use crate::session::Session;

/// Index of a rule within its rule base.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub(crate) usize);

impl RuleId {
    /// The raw index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Collects type declarations, rules, and queries, then compiles them.
#[derive(Default)]
pub struct RuleBaseBuilder {
    types: TypeHierarchy,
    rules: Vec<Rule>,
    queries: Vec<Query>,
}

impl RuleBaseBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a fact type and its direct supertypes.
    #[must_use]
    pub fn declare_type<I, S>(mut self, name: impl Into<Arc<str>>, supertypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.types.declare(name, supertypes);
        self
    }

    /// Adds a rule.
    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Adds a query.
    #[must_use]
    pub fn query(mut self, query: Query) -> Self {
        self.queries.push(query);
        self
    }

    /// Validates and compiles everything added so far.
    ///
    /// # Errors
    /// Returns an error if a rule or query name repeats, a join reads a
    /// variable no earlier condition binds, a negated or existential
    /// condition tries to bind variables, or the type hierarchy has a cycle.
    pub fn build(self) -> Result<RuleBase> {
        let mut names = HashSet::new();
        for rule in &self.rules {
            if !names.insert(rule.name.clone()) {
                return Err(Error::invalid_rule(rule.name.as_ref(), "duplicate rule name"));
            }
            validate_conditions(&rule.name, &rule.conditions, &[])?;
        }

        let mut queries = HashMap::new();
        for query in self.queries {
            validate_conditions(&query.name, &query.conditions, &query.params)?;
            if queries.contains_key(&query.name) {
                return Err(Error::invalid_rule(query.name.as_ref(), "duplicate query name"));
            }
            queries.insert(query.name.clone(), query);
        }

        let mut known = self.types.type_names();
        for condition in self
            .rules
            .iter()
            .flat_map(|r| &r.conditions)
            .chain(queries.values().flat_map(|q| &q.conditions))
        {
            known.insert(condition.fact_type.clone());
        }
        let ancestors = self.types.closure(&known)?;
        let topology = Topology::build(&self.rules, &ancestors);

        tracing::debug!(
            rules = self.rules.len(),
            queries = queries.len(),
            alpha_nodes = topology.alpha.len(),
            beta_nodes = topology.beta.len(),
            "compiled rule base"
        );

        Ok(RuleBase {
            rules: self.rules,
            queries,
            types: self.types,
            ancestors,
            topology,
        })
    }
}

/// Checks that every join reads an already-bound variable, that only
/// positive and accumulate conditions introduce bindings, and that only
/// accumulate conditions carry a `having`.
pub(crate) fn validate_conditions(owner: &Arc<str>, conditions: &[Condition], params: &[Arc<str>]) -> Result<()> {
    let mut bound: HashSet<&str> = params.iter().map(AsRef::as_ref).collect();
    for (index, condition) in conditions.iter().enumerate() {
        let frame = || format!("condition {index} ({} {})", condition.kind.name(), condition.fact_type);
        if condition.stray_having {
            return Err(Error::invalid_rule(
                owner.as_ref(),
                format!("{} has a having but is not an accumulate", frame()),
            ));
        }
        for join in &condition.joins {
            if !bound.contains(join.variable().as_ref()) {
                return Err(Error::new(ErrorKind::UnboundVariable(join.variable().to_string()))
                    .with_context(ErrorContext::new().with_rule(owner.as_ref()).with_frame(frame())));
            }
        }
        match &condition.kind {
            ConditionKind::Positive => {}
            ConditionKind::Not | ConditionKind::Exists | ConditionKind::Accumulate(_) => {
                if condition.fact_var.is_some() || !condition.captures.is_empty() {
                    return Err(Error::invalid_rule(
                        owner.as_ref(),
                        format!("{} cannot bind variables", frame()),
                    ));
                }
            }
        }
        for var in condition.bound_variables() {
            bound.insert(var.as_ref());
        }
    }
    Ok(())
}

// =============================================================================
// Rule Base
// =============================================================================

/// An immutable, compiled set of rules and queries.
///
/// A rule base is `Send + Sync`; wrap it in an [`Arc`] to share it between
/// sessions on any number of threads.
pub struct RuleBase {
    rules: Vec<Rule>,
    queries: HashMap<Arc<str>, Query>,
    types: TypeHierarchy,
    ancestors: HashMap<Arc<str>, BTreeSet<Arc<str>>>,
    pub(crate) topology: Topology,
}

impl RuleBase {
    /// Starts building a rule base.
    #[must_use]
    pub fn builder() -> RuleBaseBuilder {
        RuleBaseBuilder::new()
    }

    /// Opens a session with default configuration.
    #[must_use]
    pub fn new_session(self: &Arc<Self>) -> Session {
        Session::new(Arc::clone(self))
    }

    /// Opens a session with the given configuration.
    #[must_use]
    pub fn new_session_with(self: &Arc<Self>, config: SessionConfig) -> Session {
        Session::with_config(Arc::clone(self), config)
    }

    /// All rules in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Looks up a rule by id.
    #[must_use]
    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.0]
    }

    /// Finds a rule's id by name.
    ///
    /// # Errors
    /// Returns [`ErrorKind::UnknownRule`] if no rule has that name.
    pub fn rule_id(&self, name: &str) -> Result<RuleId> {
        self.rules
            .iter()
            .position(|r| r.name.as_ref() == name)
            .map(RuleId)
            .ok_or_else(|| Error::new(ErrorKind::UnknownRule(name.to_string())))
    }

    /// Looks up a query by name.
    ///
    /// # Errors
    /// Returns [`ErrorKind::UnknownQuery`] if no query has that name.
    pub fn query(&self, name: &str) -> Result<&Query> {
        self.queries
            .get(name)
            .ok_or_else(|| Error::new(ErrorKind::UnknownQuery(name.to_string())))
    }

    /// The declared type hierarchy.
    #[must_use]
    pub fn types(&self) -> &TypeHierarchy {
        &self.types
    }

    /// True if a fact of type `fact_type` matches conditions on `pattern_type`.
    #[must_use]
    pub fn is_instance(&self, fact_type: &str, pattern_type: &str) -> bool {
        match self.ancestors.get(fact_type) {
            Some(ancestors) => ancestors.contains(pattern_type),
            None => fact_type == pattern_type,
        }
    }

    /// Number of alpha nodes after sharing.
    #[must_use]
    pub fn alpha_node_count(&self) -> usize {
        self.topology.alpha.len()
    }

    /// Number of beta nodes.
    #[must_use]
    pub fn beta_node_count(&self) -> usize {
        self.topology.beta.len()
    }
}

impl fmt::Debug for RuleBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleBase")
            .field("rules", &self.rules.len())
            .field("queries", &self.queries.len())
            .field("alpha_nodes", &self.topology.alpha.len())
            .field("beta_nodes", &self.topology.beta.len())
            .finish()
    }
}
