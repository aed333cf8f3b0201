//! Fact type hierarchy.
//!
//! Types are named; each may declare any number of direct supertypes. A
//! condition written against a supertype matches facts of every subtype.
//! The closure is computed once (when the rule base is built) so that
//! routing a fact is a single table lookup rather than a walk up the chain.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::Error;

/// Declared supertype relationships between fact types.
#[derive(Clone, Debug, Default)]
pub struct TypeHierarchy {
    /// Direct supertypes per declared type.
    parents: HashMap<Arc<str>, Vec<Arc<str>>>,
}

impl TypeHierarchy {
    /// Creates an empty hierarchy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a type with its direct supertypes.
    ///
    /// Redeclaring a type adds to its supertypes.
    pub fn declare<I, S>(&mut self, name: impl Into<Arc<str>>, supertypes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        let entry = self.parents.entry(name.into()).or_default();
        for parent in supertypes {
            let parent = parent.into();
            if !entry.contains(&parent) {
                entry.push(parent);
            }
        }
    }

    /// Returns the direct supertypes of a type.
    #[must_use]
    pub fn parents(&self, name: &str) -> &[Arc<str>] {
        self.parents.get(name).map_or(&[], Vec::as_slice)
    }

    /// Returns every declared type name, including types that only appear
    /// as supertypes.
    #[must_use]
    pub fn type_names(&self) -> BTreeSet<Arc<str>> {
        let mut names = BTreeSet::new();
        for (name, parents) in &self.parents {
            names.insert(name.clone());
            names.extend(parents.iter().cloned());
        }
        names
    }

    /// Returns `name` together with all of its transitive supertypes.
    ///
    /// # Errors
    /// Returns an error if the declarations contain a cycle through `name`.
    pub fn ancestors(&self, name: &str) -> crate::Result<BTreeSet<Arc<str>>> {
        let mut seen = BTreeSet::new();
        let mut path = Vec::new();
        self.collect_ancestors(name, &mut seen, &mut path)?;
        Ok(seen)
    }

    fn collect_ancestors(
        &self,
        name: &str,
        seen: &mut BTreeSet<Arc<str>>,
        path: &mut Vec<Arc<str>>,
    ) -> crate::Result<()> {
        if path.iter().any(|p| p.as_ref() == name) {
            let cycle: Vec<&str> = path.iter().map(AsRef::as_ref).collect();
            return Err(Error::invalid_hierarchy(format!(
                "type cycle: {} -> {name}",
                cycle.join(" -> ")
            )));
        }
        let key: Arc<str> = self
            .parents
            .get_key_value(name)
            .map_or_else(|| Arc::from(name), |(k, _)| k.clone());
        if !seen.insert(key.clone()) {
            return Ok(());
        }
        path.push(key);
        for parent in self.parents(name) {
            self.collect_ancestors(parent, seen, path)?;
        }
        path.pop();
        Ok(())
    }

    /// Returns true if `sub` is `sup` or one of its subtypes.
    #[must_use]
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        self.ancestors(sub)
            .is_ok_and(|ancestors| ancestors.iter().any(|a| a.as_ref() == sup))
    }

    /// Computes the ancestor closure of every given type name.
    ///
    /// # Errors
    /// Returns an error if any declaration cycle is found.
    pub fn closure<'a, I>(&self, names: I) -> crate::Result<HashMap<Arc<str>, BTreeSet<Arc<str>>>>
    where
        I: IntoIterator<Item = &'a Arc<str>>,
    {
        names
            .into_iter()
            .map(|name| Ok((name.clone(), self.ancestors(name)?)))
            .collect()
    }
}
