//! Property tests for incremental matching
//!
//! Whatever sequence of inserts, updates, and retracts a session has seen,
//! the matches its network holds must equal a from-scratch evaluation of
//! each rule's conditions over the final working memory. Until something
//! fires, the agenda must hold exactly those matches as well.

use std::sync::Arc;

use proptest::prelude::*;
use reteline_engine::{
    Bindings, Condition, FactTuple, MAIN_GROUP, Rule, RuleBase, Session, average, field, sum,
};
use reteline_foundation::{Fact, FactHandle, Value};

// =============================================================================
// Fixtures
// =============================================================================

fn rulebase() -> Arc<RuleBase> {
    let rulebase = RuleBase::builder()
        .declare_type("AutoClaim", ["Claim"])
        .rule(
            Rule::new("covered")
                .when(Condition::new("Claim").bind("c").capture("p", field("policy")))
                .when(
                    Condition::new("Policy")
                        .bind("pol")
                        .join(field("number").eq_var("p")),
                ),
        )
        .rule(
            Rule::new("uncovered")
                .when(Condition::new("Claim").bind("c").capture("p", field("policy")))
                .when(Condition::not("Policy").join(field("number").eq_var("p"))),
        )
        .rule(
            Rule::new("insured-large")
                .when(
                    Condition::new("Claim")
                        .filter(field("amount").ge(2))
                        .capture("p", field("policy")),
                )
                .when(Condition::exists("Policy").join(field("number").eq_var("p"))),
        )
        .rule(
            Rule::new("same-amount")
                .when(Condition::new("Claim").bind("a").capture("x", field("amount")))
                .when(Condition::new("AutoClaim").bind("b").join(field("amount").eq_var("x"))),
        )
        .rule(
            Rule::new("exposure")
                .when(Condition::new("Policy").capture("n", field("number")))
                .when(
                    Condition::accumulate("Claim", sum(field("amount")), "total")
                        .join(field("policy").eq_var("n")),
                ),
        )
        .rule(
            Rule::new("mean")
                .when(Condition::new("Policy").capture("n", field("number")))
                .when(
                    Condition::accumulate("Claim", average(field("amount")), "mean")
                        .join(field("policy").eq_var("n")),
                ),
        )
        .build()
        .unwrap();
    Arc::new(rulebase)
}

#[derive(Clone, Debug)]
enum Step {
    InsertClaim { auto: bool, policy: u8, amount: Value },
    InsertPolicy { number: u8 },
    Retract(usize),
    Update { index: usize, amount: Value },
    Fire,
}

/// Small ints, and floats whose sums round.
fn amount() -> impl Strategy<Value = Value> {
    prop_oneof![
        (0i64..4).prop_map(Value::Int),
        prop::sample::select(vec![0.1, 0.2, 0.3, 0.7, 1.5, 2.0]).prop_map(Value::Float),
    ]
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (any::<bool>(), 0u8..3, amount())
            .prop_map(|(auto, policy, amount)| Step::InsertClaim { auto, policy, amount }),
        2 => (0u8..3).prop_map(|number| Step::InsertPolicy { number }),
        2 => any::<usize>().prop_map(Step::Retract),
        2 => (any::<usize>(), amount()).prop_map(|(index, amount)| Step::Update { index, amount }),
        1 => Just(Step::Fire),
    ]
}

fn apply(session: &mut Session, live: &mut Vec<FactHandle>, step: &Step) {
    match step {
        Step::InsertClaim {
            auto,
            policy,
            amount,
        } => {
            let fact_type = if *auto { "AutoClaim" } else { "Claim" };
            let fact = Fact::new(fact_type)
                .with("policy", format!("P{policy}"))
                .with("amount", amount.clone());
            live.push(session.insert(fact));
        }
        Step::InsertPolicy { number } => {
            live.push(session.insert(Fact::new("Policy").with("number", format!("P{number}"))));
        }
        Step::Retract(index) => {
            if !live.is_empty() {
                let handle = live.remove(index % live.len());
                session.retract(handle).unwrap();
            }
        }
        Step::Update { index, amount } => {
            if !live.is_empty() {
                let handle = live[index % live.len()];
                session.modify(handle, |f| f.set("amount", amount.clone())).unwrap();
            }
        }
        Step::Fire => {
            session.fire_all_rules();
        }
    }
}

fn sorted(mut rows: Vec<(FactTuple, Bindings)>) -> Vec<(FactTuple, Bindings)> {
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows
}

fn scratch(session: &Session, rule: &Rule) -> Vec<(FactTuple, Bindings)> {
    sorted(
        session
            .evaluate(&rule.conditions)
            .unwrap()
            .into_iter()
            .map(|row| (row.facts, row.bindings))
            .collect(),
    )
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn network_matches_equal_scratch_evaluation(steps in prop::collection::vec(step(), 0..40)) {
        let rulebase = rulebase();
        let mut session = rulebase.new_session();
        let mut live = Vec::new();
        for step in &steps {
            apply(&mut session, &mut live, step);
        }

        for rule in rulebase.rules() {
            let network = sorted(session.matches(&rule.name).unwrap());
            prop_assert_eq!(network, scratch(&session, rule), "rule {}", rule.name);
        }
    }

    #[test]
    fn unfired_agenda_equals_scratch_evaluation(steps in prop::collection::vec(step(), 0..40)) {
        let rulebase = rulebase();
        let mut session = rulebase.new_session();
        let mut live = Vec::new();
        for step in steps.iter().filter(|s| !matches!(s, Step::Fire)) {
            apply(&mut session, &mut live, step);
        }

        let pending = session.agenda().activations_in(MAIN_GROUP);
        for rule in rulebase.rules() {
            let activations = sorted(
                pending
                    .iter()
                    .filter(|a| a.rule_name == rule.name)
                    .map(|a| (a.facts.clone(), a.bindings.clone()))
                    .collect(),
            );
            prop_assert_eq!(activations, scratch(&session, rule), "rule {}", rule.name);
        }
    }

    #[test]
    fn insertion_order_does_not_change_matches(
        facts in prop::collection::vec((any::<bool>(), 0u8..3, 0i64..3), 1..12),
        seed in any::<u64>(),
    ) {
        let rulebase = rulebase();
        let numbered: Vec<(FactHandle, Fact)> = facts
            .iter()
            .enumerate()
            .map(|(i, &(is_policy, key, amount))| {
                let fact = if is_policy {
                    Fact::new("Policy").with("number", format!("P{key}"))
                } else {
                    Fact::new("Claim")
                        .with("policy", format!("P{key}"))
                        .with("amount", amount)
                };
                (FactHandle::new(i as u64), fact)
            })
            .collect();

        let mut forward = rulebase.new_session();
        for (handle, fact) in &numbered {
            forward.insert_with_handle(*handle, fact.clone()).unwrap();
        }

        // Rotate, then reverse, for a second order.
        let mut reordered = numbered.clone();
        let shift = usize::try_from(seed % numbered.len() as u64).unwrap();
        reordered.rotate_left(shift);
        reordered.reverse();
        let mut backward = rulebase.new_session();
        for (handle, fact) in reordered {
            backward.insert_with_handle(handle, fact).unwrap();
        }

        for rule in rulebase.rules() {
            prop_assert_eq!(
                sorted(forward.matches(&rule.name).unwrap()),
                sorted(backward.matches(&rule.name).unwrap()),
                "rule {}",
                rule.name
            );
        }
    }

    #[test]
    fn retracting_everything_leaves_no_activations(steps in prop::collection::vec(step(), 0..30)) {
        let rulebase = rulebase();
        let mut session = rulebase.new_session();
        let mut live = Vec::new();
        for step in &steps {
            apply(&mut session, &mut live, step);
        }
        for handle in live {
            session.retract(handle).unwrap();
        }

        prop_assert_eq!(session.fact_count(), 0);
        // Only the accumulate rules could hold without claims, and they need a Policy.
        prop_assert_eq!(session.agenda_size(), 0);
    }
}
