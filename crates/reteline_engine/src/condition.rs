//! Rule conditions: the patterns a rule's left-hand side is built from.
//!
//! A [`Condition`] names a fact type and carries three kinds of test:
//!
//! - **Alpha constraints** depend on the candidate fact alone and are shared
//!   between every rule that states the same type and constraint set.
//! - **Join constraints** compare the fact against variables bound by earlier
//!   conditions. Equality joins become hash keys in the beta memories.
//! - **Captures** bind fields of a matched fact to variables for later
//!   conditions and for the action.
//!
//! The [`ConditionKind`] decides how the pattern combines with what came
//! before it: a positive join, a negation, an existence test, or an
//! accumulation.

use std::fmt;
use std::sync::Arc;

use reteline_foundation::{Error, Fact, Result, Value};

use crate::token::Bindings;

/// Signature of a field accessor.
pub type ExtractFn = dyn Fn(&Fact) -> Result<Value> + Send + Sync;

/// Signature of an alpha predicate.
pub type PredicateFn = dyn Fn(&Fact) -> Result<bool> + Send + Sync;

// =============================================================================
// Extractors
// =============================================================================

/// Reads a value out of a fact.
///
/// Extractors are identified by name: two extractors with the same name are
/// assumed to read the same value, which is what lets alpha nodes be shared.
#[derive(Clone)]
pub struct Extractor {
    name: Arc<str>,
    read: Arc<ExtractFn>,
}

impl Extractor {
    /// Creates an extractor reading a named field. A missing field is an
    /// evaluation error.
    #[must_use]
    pub fn field(name: impl Into<Arc<str>>) -> Self {
        let name: Arc<str> = name.into();
        let field = name.clone();
        Self {
            name,
            read: Arc::new(move |fact: &Fact| fact.field(&field).cloned()),
        }
    }

    /// Creates an extractor computing a value with a custom accessor.
    #[must_use]
    pub fn computed<F>(name: impl Into<Arc<str>>, read: F) -> Self
    where
        F: Fn(&Fact) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            read: Arc::new(read),
        }
    }

    /// Returns the extractor's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads the value from a fact.
    ///
    /// # Errors
    /// Propagates the accessor's error (for fields: [`MissingField`]).
    ///
    /// [`MissingField`]: reteline_foundation::ErrorKind::MissingField
    pub fn extract(&self, fact: &Fact) -> Result<Value> {
        (self.read)(fact)
    }

    fn literal(self, op: Op, value: impl Into<Value>) -> AlphaConstraint {
        AlphaConstraint::Compare {
            extractor: self,
            op,
            value: value.into(),
        }
    }

    fn variable(self, op: Op, var: impl Into<Arc<str>>) -> JoinConstraint {
        JoinConstraint {
            extractor: self,
            op,
            variable: var.into(),
        }
    }

    /// `field == value`
    #[must_use]
    pub fn eq(self, value: impl Into<Value>) -> AlphaConstraint {
        self.literal(Op::Eq, value)
    }

    /// `field != value`
    #[must_use]
    pub fn ne(self, value: impl Into<Value>) -> AlphaConstraint {
        self.literal(Op::Ne, value)
    }

    /// `field < value`
    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> AlphaConstraint {
        self.literal(Op::Lt, value)
    }

    /// `field <= value`
    #[must_use]
    pub fn le(self, value: impl Into<Value>) -> AlphaConstraint {
        self.literal(Op::Le, value)
    }

    /// `field > value`
    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> AlphaConstraint {
        self.literal(Op::Gt, value)
    }

    /// `field >= value`
    #[must_use]
    pub fn ge(self, value: impl Into<Value>) -> AlphaConstraint {
        self.literal(Op::Ge, value)
    }

    /// `field == $var`
    #[must_use]
    pub fn eq_var(self, var: impl Into<Arc<str>>) -> JoinConstraint {
        self.variable(Op::Eq, var)
    }

    /// `field != $var`
    #[must_use]
    pub fn ne_var(self, var: impl Into<Arc<str>>) -> JoinConstraint {
        self.variable(Op::Ne, var)
    }

    /// `field < $var`
    #[must_use]
    pub fn lt_var(self, var: impl Into<Arc<str>>) -> JoinConstraint {
        self.variable(Op::Lt, var)
    }

    /// `field <= $var`
    #[must_use]
    pub fn le_var(self, var: impl Into<Arc<str>>) -> JoinConstraint {
        self.variable(Op::Le, var)
    }

    /// `field > $var`
    #[must_use]
    pub fn gt_var(self, var: impl Into<Arc<str>>) -> JoinConstraint {
        self.variable(Op::Gt, var)
    }

    /// `field >= $var`
    #[must_use]
    pub fn ge_var(self, var: impl Into<Arc<str>>) -> JoinConstraint {
        self.variable(Op::Ge, var)
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Extractor({})", self.name)
    }
}

/// Shorthand for [`Extractor::field`].
#[must_use]
pub fn field(name: impl Into<Arc<str>>) -> Extractor {
    Extractor::field(name)
}

// =============================================================================
// Operators
// =============================================================================

/// Comparison operator used by constraints.
///
/// All operators treat `Int` and `Float` as one numeric type: `Int(1) ==
/// Float(1.0)` holds, as do `<=` and `>=` between them. See
/// [`Value::equals`] and [`Value::compare`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
    /// Equality, numeric across `Int` and `Float`.
    Eq,
    /// Inequality, numeric across `Int` and `Float`.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl Op {
    /// Applies the operator. Ordering operators on incomparable values
    /// yield `false`.
    #[must_use]
    pub fn test(self, left: &Value, right: &Value) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};

        match self {
            Self::Eq => left.equals(right),
            Self::Ne => !left.equals(right),
            Self::Lt => matches!(left.compare(right), Some(Less)),
            Self::Le => matches!(left.compare(right), Some(Less | Equal)),
            Self::Gt => matches!(left.compare(right), Some(Greater)),
            Self::Ge => matches!(left.compare(right), Some(Greater | Equal)),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Constraints
// =============================================================================

/// A test on a single fact.
#[derive(Clone)]
pub enum AlphaConstraint {
    /// `extractor op literal`
    Compare {
        /// What to read.
        extractor: Extractor,
        /// How to compare.
        op: Op,
        /// What to compare against.
        value: Value,
    },
    /// A named custom test.
    Predicate {
        /// Sharing identity of the test.
        name: Arc<str>,
        /// The test itself.
        test: Arc<PredicateFn>,
    },
}

impl AlphaConstraint {
    /// Creates a named predicate constraint.
    #[must_use]
    pub fn predicate<F>(name: impl Into<Arc<str>>, test: F) -> Self
    where
        F: Fn(&Fact) -> Result<bool> + Send + Sync + 'static,
    {
        Self::Predicate {
            name: name.into(),
            test: Arc::new(test),
        }
    }

    /// Evaluates the constraint against a fact.
    ///
    /// # Errors
    /// Returns the extractor's or predicate's error.
    pub fn evaluate(&self, fact: &Fact) -> Result<bool> {
        match self {
            Self::Compare {
                extractor,
                op,
                value,
            } => Ok(op.test(&extractor.extract(fact)?, value)),
            Self::Predicate { test, .. } => test(fact),
        }
    }

    /// Identity used to share alpha nodes.
    pub(crate) fn key(&self) -> AlphaKey {
        match self {
            Self::Compare {
                extractor,
                op,
                value,
            } => AlphaKey::Compare(extractor.name.clone(), *op, value.clone()),
            Self::Predicate { name, .. } => AlphaKey::Predicate(name.clone()),
        }
    }
}

impl fmt::Debug for AlphaConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare {
                extractor,
                op,
                value,
            } => write!(f, "{} {op} {value:?}", extractor.name),
            Self::Predicate { name, .. } => write!(f, "{name}?"),
        }
    }
}

/// Sharing identity of an alpha constraint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum AlphaKey {
    Compare(Arc<str>, Op, Value),
    Predicate(Arc<str>),
}

/// A test comparing a fact against a bound variable.
#[derive(Clone)]
pub struct JoinConstraint {
    extractor: Extractor,
    op: Op,
    variable: Arc<str>,
}

impl JoinConstraint {
    /// The variable this constraint reads.
    #[must_use]
    pub fn variable(&self) -> &Arc<str> {
        &self.variable
    }

    /// The operator.
    #[must_use]
    pub fn op(&self) -> Op {
        self.op
    }

    /// The accessor applied to the candidate fact.
    #[must_use]
    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// Evaluates the constraint.
    ///
    /// # Errors
    /// Returns the extractor's error, or [`UnboundVariable`] if the variable
    /// has no binding.
    ///
    /// [`UnboundVariable`]: reteline_foundation::ErrorKind::UnboundVariable
    pub fn evaluate(&self, fact: &Fact, bindings: &Bindings) -> Result<bool> {
        let bound = bindings.require(&self.variable)?;
        Ok(self.op.test(&self.extractor.extract(fact)?, bound))
    }
}

impl fmt::Debug for JoinConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ${}", self.extractor.name, self.op, self.variable)
    }
}

// =============================================================================
// Accumulation
// =============================================================================

/// Aggregate computed over every fact matching an accumulate condition.
#[derive(Clone, Debug)]
pub enum AccumulateFunction {
    /// Number of matching facts, as an `Int`.
    Count,
    /// Numeric sum, as a `Float`.
    Sum(Extractor),
    /// Numeric mean, as a `Float`; `Nil` when nothing matches.
    Average(Extractor),
    /// Smallest value; `Nil` when nothing matches.
    Min(Extractor),
    /// Largest value; `Nil` when nothing matches.
    Max(Extractor),
    /// Every value, ordered by fact handle.
    Collect(Extractor),
}

impl AccumulateFunction {
    /// Returns the function's name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum(_) => "sum",
            Self::Average(_) => "average",
            Self::Min(_) => "min",
            Self::Max(_) => "max",
            Self::Collect(_) => "collect",
        }
    }

    /// Reads the value a fact contributes.
    ///
    /// # Errors
    /// Returns the extractor's error, or a type mismatch if `sum`/`average`
    /// reads a non-number.
    pub fn contribution(&self, fact: &Fact) -> Result<Value> {
        match self {
            Self::Count => Ok(Value::Nil),
            Self::Sum(e) | Self::Average(e) => {
                let value = e.extract(fact)?;
                if value.as_number().is_none() {
                    return Err(Error::type_mismatch("number", value.type_name()));
                }
                Ok(value)
            }
            Self::Min(e) | Self::Max(e) | Self::Collect(e) => e.extract(fact),
        }
    }
}

/// Shorthand for [`AccumulateFunction::Count`].
#[must_use]
pub fn count() -> AccumulateFunction {
    AccumulateFunction::Count
}

/// Shorthand for [`AccumulateFunction::Sum`].
#[must_use]
pub fn sum(of: Extractor) -> AccumulateFunction {
    AccumulateFunction::Sum(of)
}

/// Shorthand for [`AccumulateFunction::Average`].
#[must_use]
pub fn average(of: Extractor) -> AccumulateFunction {
    AccumulateFunction::Average(of)
}

/// Shorthand for [`AccumulateFunction::Min`].
#[must_use]
pub fn min(of: Extractor) -> AccumulateFunction {
    AccumulateFunction::Min(of)
}

/// Shorthand for [`AccumulateFunction::Max`].
#[must_use]
pub fn max(of: Extractor) -> AccumulateFunction {
    AccumulateFunction::Max(of)
}

/// Shorthand for [`AccumulateFunction::Collect`].
#[must_use]
pub fn collect(of: Extractor) -> AccumulateFunction {
    AccumulateFunction::Collect(of)
}

/// Accumulate settings of a condition.
#[derive(Clone, Debug)]
pub struct Accumulate {
    /// The aggregate.
    pub function: AccumulateFunction,
    /// Variable the result is bound to.
    pub result: Arc<str>,
    /// Optional test the result must pass for the condition to hold.
    pub having: Option<(Op, Value)>,
}

// =============================================================================
// Conditions
// =============================================================================

/// How a condition combines with the conditions before it.
#[derive(Clone, Debug)]
pub enum ConditionKind {
    /// A matching fact is joined into the token.
    Positive,
    /// Holds while no fact matches.
    Not,
    /// Holds while at least one fact matches; contributes no fact.
    Exists,
    /// Binds an aggregate over all matching facts.
    Accumulate(Accumulate),
}

impl ConditionKind {
    /// Returns true if matches of this condition extend the fact tuple.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Positive)
    }

    /// Short name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Positive => "join",
            Self::Not => "not",
            Self::Exists => "exists",
            Self::Accumulate(_) => "accumulate",
        }
    }
}

/// One pattern of a rule or query.
#[derive(Clone, Debug)]
pub struct Condition {
    pub(crate) fact_type: Arc<str>,
    pub(crate) kind: ConditionKind,
    pub(crate) fact_var: Option<Arc<str>>,
    pub(crate) alpha: Vec<AlphaConstraint>,
    pub(crate) joins: Vec<JoinConstraint>,
    pub(crate) captures: Vec<(Arc<str>, Extractor)>,
    /// A `having` given to a non-accumulate condition; rejected on build.
    pub(crate) stray_having: bool,
}

impl Condition {
    fn with_kind(fact_type: impl Into<Arc<str>>, kind: ConditionKind) -> Self {
        Self {
            fact_type: fact_type.into(),
            kind,
            fact_var: None,
            alpha: Vec::new(),
            joins: Vec::new(),
            captures: Vec::new(),
            stray_having: false,
        }
    }

    /// A positive pattern over facts of `fact_type` (or any subtype).
    #[must_use]
    pub fn new(fact_type: impl Into<Arc<str>>) -> Self {
        Self::with_kind(fact_type, ConditionKind::Positive)
    }

    /// Holds while no fact of `fact_type` satisfies the constraints.
    #[must_use]
    pub fn not(fact_type: impl Into<Arc<str>>) -> Self {
        Self::with_kind(fact_type, ConditionKind::Not)
    }

    /// Holds while some fact of `fact_type` satisfies the constraints.
    #[must_use]
    pub fn exists(fact_type: impl Into<Arc<str>>) -> Self {
        Self::with_kind(fact_type, ConditionKind::Exists)
    }

    /// Aggregates every fact of `fact_type` satisfying the constraints and
    /// binds the result to `result`.
    #[must_use]
    pub fn accumulate(
        fact_type: impl Into<Arc<str>>,
        function: AccumulateFunction,
        result: impl Into<Arc<str>>,
    ) -> Self {
        Self::with_kind(
            fact_type,
            ConditionKind::Accumulate(Accumulate {
                function,
                result: result.into(),
                having: None,
            }),
        )
    }

    /// Requires an accumulate result to satisfy `result op value`.
    ///
    /// Only accumulate conditions take a `having`; on any other kind the
    /// rule or query fails to build with `InvalidRule`.
    #[must_use]
    pub fn having(mut self, op: Op, value: impl Into<Value>) -> Self {
        match &mut self.kind {
            ConditionKind::Accumulate(acc) => acc.having = Some((op, value.into())),
            _ => self.stray_having = true,
        }
        self
    }

    /// Binds the matched fact's handle to `var`.
    #[must_use]
    pub fn bind(mut self, var: impl Into<Arc<str>>) -> Self {
        self.fact_var = Some(var.into());
        self
    }

    /// Adds a test on the fact alone.
    #[must_use]
    pub fn filter(mut self, constraint: AlphaConstraint) -> Self {
        self.alpha.push(constraint);
        self
    }

    /// Adds a test against an earlier binding.
    #[must_use]
    pub fn join(mut self, constraint: JoinConstraint) -> Self {
        self.joins.push(constraint);
        self
    }

    /// Binds `extractor`'s value to `var`.
    #[must_use]
    pub fn capture(mut self, var: impl Into<Arc<str>>, extractor: Extractor) -> Self {
        self.captures.push((var.into(), extractor));
        self
    }

    /// The fact type this condition matches.
    #[must_use]
    pub fn fact_type(&self) -> &Arc<str> {
        &self.fact_type
    }

    /// The condition kind.
    #[must_use]
    pub fn kind(&self) -> &ConditionKind {
        &self.kind
    }

    /// Variables this condition makes visible to later conditions.
    pub fn bound_variables(&self) -> impl Iterator<Item = &Arc<str>> {
        let accumulated = match &self.kind {
            ConditionKind::Accumulate(acc) => Some(&acc.result),
            _ => None,
        };
        self.fact_var
            .iter()
            .chain(self.captures.iter().map(|(var, _)| var))
            .chain(accumulated)
    }

    /// Evaluates every alpha constraint in order.
    pub(crate) fn passes_alpha(&self, fact: &Fact) -> Result<bool> {
        for constraint in &self.alpha {
            if !constraint.evaluate(fact)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Evaluates every join constraint against a token's bindings.
    pub(crate) fn passes_joins(&self, fact: &Fact, bindings: &Bindings) -> Result<bool> {
        for constraint in &self.joins {
            if !constraint.evaluate(fact, bindings)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Extends `bindings` with this condition's captures for a matched fact.
    pub(crate) fn bind_fact(
        &self,
        handle: reteline_foundation::FactHandle,
        fact: &Fact,
        bindings: &Bindings,
    ) -> Result<Bindings> {
        let mut out = bindings.clone();
        if let Some(var) = &self.fact_var {
            out = out.bind(var.clone(), Value::Handle(handle));
        }
        for (var, extractor) in &self.captures {
            out = out.bind(var.clone(), extractor.extract(fact)?);
        }
        Ok(out)
    }
}
