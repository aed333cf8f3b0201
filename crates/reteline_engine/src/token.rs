//! Partial matches: fact tuples and variable bindings.

use std::fmt;
use std::sync::Arc;

use reteline_foundation::{Error, ErrorKind, FactHandle, LtMap, Result, Value};

/// The ordered facts a (partial) match consists of, one per positive
/// condition.
///
/// Tuples are cheap to clone and totally ordered, so they key the beta and
/// terminal memories and make match iteration deterministic.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FactTuple(Arc<[FactHandle]>);

impl FactTuple {
    /// The empty tuple every rule's first condition extends.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns a new tuple with `handle` appended.
    #[must_use]
    pub fn extend(&self, handle: FactHandle) -> Self {
        let mut handles = Vec::with_capacity(self.0.len() + 1);
        handles.extend_from_slice(&self.0);
        handles.push(handle);
        Self(handles.into())
    }

    /// The handles in condition order.
    #[must_use]
    pub fn handles(&self) -> &[FactHandle] {
        &self.0
    }

    /// Number of facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty tuple.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if the tuple contains `handle`.
    #[must_use]
    pub fn contains(&self, handle: FactHandle) -> bool {
        self.0.contains(&handle)
    }
}

impl From<Vec<FactHandle>> for FactTuple {
    fn from(handles: Vec<FactHandle>) -> Self {
        Self(handles.into())
    }
}

impl fmt::Debug for FactTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for FactTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, h) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{h}")?;
        }
        write!(f, "]")
    }
}

/// Variable bindings accumulated along a match.
///
/// Persistent, so extending a parent token's bindings shares structure with
/// it.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Bindings(LtMap<Arc<str>, Value>);

impl Bindings {
    /// Creates empty bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns bindings extended with `var = value`.
    #[must_use]
    pub fn bind(&self, var: impl Into<Arc<str>>, value: Value) -> Self {
        Self(self.0.insert(var.into(), value))
    }

    /// Looks up a variable.
    #[must_use]
    pub fn get(&self, var: &str) -> Option<&Value> {
        self.0.get(var)
    }

    /// Looks up a variable that must be bound.
    ///
    /// # Errors
    /// Returns [`ErrorKind::UnboundVariable`] if it is not.
    pub fn require(&self, var: &str) -> Result<&Value> {
        self.0
            .get(var)
            .ok_or_else(|| Error::new(ErrorKind::UnboundVariable(var.to_string())))
    }

    /// Looks up a variable bound to a fact handle.
    ///
    /// # Errors
    /// Returns an error if the variable is unbound or not a handle.
    pub fn handle(&self, var: &str) -> Result<FactHandle> {
        let value = self.require(var)?;
        value
            .as_handle()
            .ok_or_else(|| Error::type_mismatch("handle", value.type_name()))
    }

    /// True if `var` is bound.
    #[must_use]
    pub fn contains(&self, var: &str) -> bool {
        self.0.contains_key(var)
    }

    /// Iterates bindings in variable-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &Value)> {
        self.0.iter()
    }

    /// Number of bound variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl<K: Into<Arc<str>>> FromIterator<(K, Value)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
