//! Incremental aggregate state for accumulate nodes.

use std::collections::BTreeMap;

use reteline_foundation::{FactHandle, LtVec, Value};

use crate::condition::AccumulateFunction;

/// Running aggregate over the facts currently matching one left token.
///
/// Sums are exact: integer contributions add into an `i128` and float
/// contributions into an [`ExactSum`], so adding then removing a value
/// leaves the same result a fresh evaluation would give. `min`/`max` keep
/// the current extremum and only rescan when the extremum itself leaves.
#[derive(Clone, Debug, Default)]
pub(crate) struct AccumulatorState {
    contributions: BTreeMap<FactHandle, Value>,
    int_sum: i128,
    float_sum: ExactSum,
    extremum: Option<Value>,
}

impl AccumulatorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fact's contribution.
    pub fn add(&mut self, function: &AccumulateFunction, handle: FactHandle, value: Value) {
        match function {
            AccumulateFunction::Sum(_) | AccumulateFunction::Average(_) => match &value {
                Value::Int(n) => self.int_sum += i128::from(*n),
                other => self.float_sum.add(other.as_number().unwrap_or(0.0)),
            },
            AccumulateFunction::Min(_) => {
                if self.extremum.as_ref().is_none_or(|m| value < *m) {
                    self.extremum = Some(value.clone());
                }
            }
            AccumulateFunction::Max(_) => {
                if self.extremum.as_ref().is_none_or(|m| value > *m) {
                    self.extremum = Some(value.clone());
                }
            }
            AccumulateFunction::Count | AccumulateFunction::Collect(_) => {}
        }
        self.contributions.insert(handle, value);
    }

    /// Removes a fact's contribution. Returns true if the contributors had to
    /// be rescanned.
    pub fn remove(&mut self, function: &AccumulateFunction, handle: FactHandle) -> bool {
        let Some(value) = self.contributions.remove(&handle) else {
            return false;
        };
        match function {
            AccumulateFunction::Sum(_) | AccumulateFunction::Average(_) => {
                if self.contributions.is_empty() {
                    self.int_sum = 0;
                    self.float_sum = ExactSum::default();
                    return false;
                }
                match &value {
                    Value::Int(n) => {
                        self.int_sum -= i128::from(*n);
                        false
                    }
                    other => {
                        self.float_sum.add(-other.as_number().unwrap_or(0.0));
                        if self.float_sum.is_finite() {
                            return false;
                        }
                        // Once out of range the partials are lost; rebuild
                        // from what is left.
                        self.float_sum = ExactSum::default();
                        for value in self.contributions.values() {
                            if !matches!(value, Value::Int(_)) {
                                self.float_sum.add(value.as_number().unwrap_or(0.0));
                            }
                        }
                        true
                    }
                }
            }
            AccumulateFunction::Min(_) | AccumulateFunction::Max(_) => {
                if self.extremum.as_ref() != Some(&value) {
                    return false;
                }
                let values = self.contributions.values();
                self.extremum = if matches!(function, AccumulateFunction::Min(_)) {
                    values.min().cloned()
                } else {
                    values.max().cloned()
                };
                true
            }
            AccumulateFunction::Count | AccumulateFunction::Collect(_) => false,
        }
    }

    /// The aggregate's current value.
    #[allow(clippy::cast_precision_loss)]
    pub fn result(&self, function: &AccumulateFunction) -> Value {
        let n = self.contributions.len();
        match function {
            AccumulateFunction::Count => Value::Int(i64::try_from(n).unwrap_or(i64::MAX)),
            AccumulateFunction::Sum(_) => Value::Float(self.total()),
            AccumulateFunction::Average(_) => {
                if n == 0 {
                    Value::Nil
                } else {
                    Value::Float(self.total() / n as f64)
                }
            }
            AccumulateFunction::Min(_) | AccumulateFunction::Max(_) => {
                self.extremum.clone().unwrap_or(Value::Nil)
            }
            AccumulateFunction::Collect(_) => Value::List(
                self.contributions
                    .values()
                    .cloned()
                    .collect::<LtVec<Value>>(),
            ),
        }
    }

    /// The integer and float sums, rounded once.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn total(&self) -> f64 {
        if self.int_sum == 0 {
            return self.float_sum.value();
        }
        let high = self.int_sum as f64;
        let low = (self.int_sum - high as i128) as f64;
        let mut sum = self.float_sum.clone();
        sum.add(high);
        sum.add(low);
        sum.value()
    }
}

/// An exact sum of floats, held as non-overlapping partials in increasing
/// magnitude (Shewchuk's algorithm). Its value is the correctly rounded
/// exact sum, whatever order values were added and removed in.
#[derive(Clone, Debug, Default)]
struct ExactSum {
    partials: Vec<f64>,
    /// Set once an intermediate sum leaves the finite range.
    overflow: Option<f64>,
}

impl ExactSum {
    #[allow(clippy::float_cmp)]
    fn add(&mut self, value: f64) {
        if let Some(total) = &mut self.overflow {
            *total += value;
            return;
        }
        let mut x = value;
        let mut kept = 0;
        for j in 0..self.partials.len() {
            let mut y = self.partials[j];
            if x.abs() < y.abs() {
                std::mem::swap(&mut x, &mut y);
            }
            let high = x + y;
            if !high.is_finite() {
                self.overflow = Some(high);
                self.partials.clear();
                return;
            }
            let low = y - (high - x);
            if low != 0.0 {
                self.partials[kept] = low;
                kept += 1;
            }
            x = high;
        }
        self.partials.truncate(kept);
        if x.is_finite() {
            self.partials.push(x);
        } else {
            self.overflow = Some(x);
            self.partials.clear();
        }
    }

    fn is_finite(&self) -> bool {
        self.overflow.is_none()
    }

    #[allow(clippy::float_cmp)]
    fn value(&self) -> f64 {
        if let Some(total) = self.overflow {
            return total;
        }
        let Some((&last, rest)) = self.partials.split_last() else {
            return 0.0;
        };
        let mut high = last;
        let mut low = 0.0;
        let mut n = rest.len();
        while n > 0 {
            let x = high;
            n -= 1;
            let y = rest[n];
            high = x + y;
            low = y - (high - x);
            if low != 0.0 {
                break;
            }
        }
        // Round half-even across the remaining partials.
        if n > 0 && ((low < 0.0 && rest[n - 1] < 0.0) || (low > 0.0 && rest[n - 1] > 0.0)) {
            let y = low * 2.0;
            let x = high + y;
            if y == x - high {
                high = x;
            }
        }
        high
    }
}
