//! Error types for the Reteline system.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

use crate::handle::FactHandle;

/// The main error type for Reteline operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates an unknown fact error.
    #[must_use]
    pub fn unknown_fact(handle: FactHandle) -> Self {
        Self::new(ErrorKind::UnknownFact(handle))
    }

    /// Creates a duplicate handle error.
    #[must_use]
    pub fn duplicate_handle(handle: FactHandle) -> Self {
        Self::new(ErrorKind::DuplicateHandle(handle))
    }

    /// Creates a missing field error.
    #[must_use]
    pub fn missing_field(fact_type: &str, field: &str) -> Self {
        Self::new(ErrorKind::MissingField {
            fact_type: fact_type.to_string(),
            field: field.to_string(),
        })
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: &'static str, actual: &'static str) -> Self {
        Self::new(ErrorKind::TypeMismatch { expected, actual })
    }

    /// Creates a constraint evaluation error.
    #[must_use]
    pub fn constraint(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConstraintEvaluation {
            rule: rule.into(),
            message: message.into(),
        })
    }

    /// Creates an infinite activation loop error.
    #[must_use]
    pub fn activation_loop(limit: usize, rule: Option<String>) -> Self {
        Self::new(ErrorKind::InfiniteActivationLoop { limit, rule })
    }

    /// Creates an invalid rule error.
    #[must_use]
    pub fn invalid_rule(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRule {
            rule: rule.into(),
            message: message.into(),
        })
    }

    /// Creates an invalid type hierarchy error.
    #[must_use]
    pub fn invalid_hierarchy(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidHierarchy(message.into()))
    }

    /// Creates an action failure error.
    #[must_use]
    pub fn action(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ActionFailed(message.into()))
    }

    /// Returns true if this error is fatal to the call that produced it only,
    /// leaving the session usable.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.kind, ErrorKind::DuplicateHandle(_) | ErrorKind::Internal(_))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Retract or update of a handle that is not in the fact store.
    #[error("unknown fact: {0}")]
    UnknownFact(FactHandle),

    /// Insertion under a handle that is already live.
    #[error("duplicate fact handle: {0}")]
    DuplicateHandle(FactHandle),

    /// A field read by a constraint is missing on the fact.
    #[error("field not found: {field} on {fact_type}")]
    MissingField {
        /// The fact type that was read.
        fact_type: String,
        /// The field that was missing.
        field: String,
    },

    /// A value had the wrong type for the operation.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected type name.
        expected: &'static str,
        /// The actual type name.
        actual: &'static str,
    },

    /// A condition's predicate failed while reading a fact.
    #[error("constraint evaluation failed in rule {rule}: {message}")]
    ConstraintEvaluation {
        /// The rule (or node description) whose constraint failed.
        rule: String,
        /// What went wrong.
        message: String,
    },

    /// The firing-count ceiling was reached within one execution loop.
    #[error("activation loop ceiling ({limit}) reached{}", .rule.as_ref().map(|r| format!(" while firing {r}")).unwrap_or_default())]
    InfiniteActivationLoop {
        /// The configured ceiling.
        limit: usize,
        /// The rule that fired last before the ceiling was hit.
        rule: Option<String>,
    },

    /// A rule name was not found in the rule base.
    #[error("unknown rule: {0}")]
    UnknownRule(String),

    /// A query name was not found in the rule base.
    #[error("unknown query: {0}")]
    UnknownQuery(String),

    /// A variable was referenced before any condition bound it.
    #[error("unbound variable: {0}")]
    UnboundVariable(String),

    /// A rule definition is malformed.
    #[error("invalid rule {rule}: {message}")]
    InvalidRule {
        /// The offending rule.
        rule: String,
        /// What is wrong with it.
        message: String,
    },

    /// The declared type hierarchy is malformed.
    #[error("invalid type hierarchy: {0}")]
    InvalidHierarchy(String),

    /// A rule action reported failure.
    #[error("action failed: {0}")]
    ActionFailed(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Rule that was executing, if any.
    pub rule: Option<String>,
    /// Facts involved.
    pub facts: Vec<FactHandle>,
    /// Stack of operations leading to the error.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rule name.
    #[must_use]
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Records the facts involved.
    #[must_use]
    pub fn with_facts(mut self, facts: impl IntoIterator<Item = FactHandle>) -> Self {
        self.facts.extend(facts);
        self
    }

    /// Adds a stack frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(rule) = &self.rule {
            write!(f, "in rule {rule}")?;
        }
        if !self.facts.is_empty() {
            write!(f, " [")?;
            for (i, h) in self.facts.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{h}")?;
            }
            write!(f, "]")?;
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  in {frame}")?;
            }
        }
        Ok(())
    }
}
