//! Facts: typed records held in working memory.

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::collections::LtMap;
use crate::error::Error;
use crate::value::Value;

/// A typed record of named field values.
///
/// The type name drives alpha-network routing (together with the declared
/// type hierarchy); fields are read by the extractors bound into rule
/// conditions. Equality and hashing are structural, which is what logical
/// insertion uses to recognise "the same" derived fact.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Fact {
    fact_type: Arc<str>,
    fields: LtMap<Arc<str>, Value>,
}

impl Fact {
    /// Creates a fact of the given type with no fields.
    #[must_use]
    pub fn new(fact_type: impl Into<Arc<str>>) -> Self {
        Self {
            fact_type: fact_type.into(),
            fields: LtMap::new(),
        }
    }

    /// Builder: returns the fact with a field set.
    #[must_use]
    pub fn with(mut self, field: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        self.fields.insert_mut(field.into(), value.into());
        self
    }

    /// Sets a field in place.
    pub fn set(&mut self, field: impl Into<Arc<str>>, value: impl Into<Value>) {
        self.fields.insert_mut(field.into(), value.into());
    }

    /// Returns the fact's type name.
    #[must_use]
    pub fn fact_type(&self) -> &str {
        &self.fact_type
    }

    /// Returns the shared type name.
    #[must_use]
    pub fn type_name(&self) -> &Arc<str> {
        &self.fact_type
    }

    /// Gets a field value, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Gets a field value, failing with [`ErrorKind::MissingField`] if absent.
    ///
    /// [`ErrorKind::MissingField`]: crate::ErrorKind::MissingField
    ///
    /// # Errors
    /// Returns an error if the field is not set on this fact.
    pub fn field(&self, field: &str) -> crate::Result<&Value> {
        self.fields
            .get(field)
            .ok_or_else(|| Error::missing_field(&self.fact_type, field))
    }

    /// Iterates fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&Arc<str>, &Value)> {
        self.fields.iter()
    }
}

impl fmt::Debug for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.fact_type, self.fields)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.fact_type)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, ")")
    }
}
