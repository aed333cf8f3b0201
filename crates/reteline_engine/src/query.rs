//! From-scratch evaluation of conditions against working memory.
//!
//! Queries do not use the network memories; they walk the fact store with a
//! nested loop, so their answers are an independent check on what the
//! network holds. Candidates are visited in handle order and a constraint
//! that fails to evaluate rejects the candidate, as it does in the network.

use std::fmt;

use reteline_foundation::FactHandle;
use reteline_storage::FactStore;

use crate::condition::{Condition, ConditionKind};
use crate::network::AccumulatorState;
use crate::rulebase::RuleBase;
use crate::token::{Bindings, FactTuple};

/// One answer to a query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRow {
    /// The matched facts, one per positive condition.
    pub facts: FactTuple,
    /// Every variable bound by the match.
    pub bindings: Bindings,
}

impl fmt::Display for QueryRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.facts, self.bindings)
    }
}

/// Every way `conditions` hold in `store`, starting from `initial`.
pub(crate) fn evaluate(
    rulebase: &RuleBase,
    store: &FactStore,
    conditions: &[Condition],
    initial: Bindings,
) -> Vec<QueryRow> {
    let mut rows = Vec::new();
    descend(rulebase, store, conditions, FactTuple::empty(), initial, &mut rows);
    rows
}

fn descend(
    rulebase: &RuleBase,
    store: &FactStore,
    conditions: &[Condition],
    tuple: FactTuple,
    bindings: Bindings,
    rows: &mut Vec<QueryRow>,
) {
    let Some((condition, rest)) = conditions.split_first() else {
        rows.push(QueryRow {
            facts: tuple,
            bindings,
        });
        return;
    };

    let candidates = store.iter().filter_map(|(handle, entry)| {
        let fact = &entry.fact;
        let holds = rulebase.is_instance(fact.fact_type(), condition.fact_type())
            && condition.passes_alpha(fact).unwrap_or(false)
            && condition.passes_joins(fact, &bindings).unwrap_or(false);
        holds.then_some((handle, fact))
    });

    match &condition.kind {
        ConditionKind::Positive => {
            let matched: Vec<(FactHandle, Bindings)> = candidates
                .filter_map(|(handle, fact)| {
                    condition
                        .bind_fact(handle, fact, &bindings)
                        .ok()
                        .map(|extended| (handle, extended))
                })
                .collect();
            for (handle, extended) in matched {
                descend(rulebase, store, rest, tuple.extend(handle), extended, rows);
            }
        }
        ConditionKind::Not => {
            if candidates.count() == 0 {
                descend(rulebase, store, rest, tuple, bindings, rows);
            }
        }
        ConditionKind::Exists => {
            if candidates.count() > 0 {
                descend(rulebase, store, rest, tuple, bindings, rows);
            }
        }
        ConditionKind::Accumulate(acc) => {
            let mut state = AccumulatorState::new();
            for (handle, fact) in candidates {
                if let Ok(value) = acc.function.contribution(fact) {
                    state.add(&acc.function, handle, value);
                }
            }
            let result = state.result(&acc.function);
            let holds = acc
                .having
                .as_ref()
                .is_none_or(|(op, value)| op.test(&result, value));
            if holds {
                let extended = bindings.bind(acc.result.clone(), result);
                descend(rulebase, store, rest, tuple, extended, rows);
            }
        }
    }
}
