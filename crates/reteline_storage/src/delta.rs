//! Change records emitted by every fact store mutation.

use std::fmt;
use std::sync::Arc;

use reteline_foundation::FactHandle;

/// What happened to a fact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeltaKind {
    /// The fact was added.
    Inserted,
    /// The fact's value was replaced under the same handle.
    Updated,
    /// The fact was removed.
    Retracted,
}

impl fmt::Display for DeltaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inserted => write!(f, "inserted"),
            Self::Updated => write!(f, "updated"),
            Self::Retracted => write!(f, "retracted"),
        }
    }
}

/// A single fact mutation, consumed by the matching network before the
/// mutating call returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delta {
    /// What happened.
    pub kind: DeltaKind,
    /// The affected fact.
    pub handle: FactHandle,
    /// The fact's type name.
    pub fact_type: Arc<str>,
}

impl Delta {
    /// Creates a delta.
    #[must_use]
    pub fn new(kind: DeltaKind, handle: FactHandle, fact_type: Arc<str>) -> Self {
        Self {
            kind,
            handle,
            fact_type,
        }
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.kind, self.fact_type, self.handle)
    }
}
