//! Integration tests for pattern matching
//!
//! Tests joins, negation, existence, accumulation, and type routing as seen
//! through a session's complete matches.

use std::sync::Arc;

use reteline_engine::{Condition, Op, Rule, RuleBase, Session, count, field, sum};
use reteline_foundation::{Fact, FactHandle, Value};

fn session(builder: reteline_engine::RuleBaseBuilder) -> Session {
    Arc::new(builder.build().unwrap()).new_session()
}

fn claim(policy: &str, amount: i64) -> Fact {
    Fact::new("Claim")
        .with("policy", policy)
        .with("amount", amount)
        .with("status", "PENDING")
}

fn policy(number: &str) -> Fact {
    Fact::new("Policy")
        .with("number", number)
        .with("status", "ACTIVE")
}

fn covered() -> Rule {
    Rule::new("covered")
        .when(
            Condition::new("Claim")
                .bind("c")
                .capture("p", field("policy")),
        )
        .when(
            Condition::new("Policy")
                .bind("pol")
                .filter(field("status").eq("ACTIVE"))
                .join(field("number").eq_var("p")),
        )
}

// =============================================================================
// Joins
// =============================================================================

#[test]
fn join_pairs_matching_facts() {
    let mut s = session(RuleBase::builder().rule(covered()));
    let p1 = s.insert(policy("P1"));
    let p2 = s.insert(policy("P2"));
    let c1 = s.insert(claim("P1", 10));
    let c2 = s.insert(claim("P2", 20));
    s.insert(claim("P3", 30));

    let matches = s.matches("covered").unwrap();
    let tuples: Vec<Vec<FactHandle>> = matches.iter().map(|(t, _)| t.handles().to_vec()).collect();
    assert_eq!(tuples, vec![vec![c1, p1], vec![c2, p2]]);

    let (_, bindings) = &matches[0];
    assert_eq!(bindings.get("p"), Some(&Value::from("P1")));
    assert_eq!(bindings.handle("pol").unwrap(), p1);
}

#[test]
fn join_follows_updates_on_either_side() {
    let mut s = session(RuleBase::builder().rule(covered()));
    let p = s.insert(policy("P1"));
    let c = s.insert(claim("P2", 10));
    assert!(s.matches("covered").unwrap().is_empty());

    s.modify(c, |f| f.set("policy", "P1")).unwrap();
    assert_eq!(s.matches("covered").unwrap().len(), 1);

    s.modify(p, |f| f.set("status", "LAPSED")).unwrap();
    assert!(s.matches("covered").unwrap().is_empty());
    assert_eq!(s.agenda_size(), 0);
}

#[test]
fn relational_joins() {
    let rule = Rule::new("larger")
        .when(Condition::new("Claim").bind("a").capture("x", field("amount")))
        .when(Condition::new("Claim").bind("b").join(field("amount").gt_var("x")));
    let mut s = session(RuleBase::builder().rule(rule));
    s.insert(claim("P1", 10));
    s.insert(claim("P1", 20));
    s.insert(claim("P1", 30));

    // (10,20) (10,30) (20,30)
    assert_eq!(s.matches("larger").unwrap().len(), 3);
}

// =============================================================================
// Negation and Existence
// =============================================================================

#[test]
fn equality_joins_treat_whole_floats_as_ints() {
    let conditions = || {
        vec![
            Condition::new("Claim").capture("code", field("code")),
            Condition::new("Code").join(field("value").eq_var("code")),
        ]
    };
    let rule = conditions().into_iter().fold(Rule::new("coded"), Rule::when);
    let mut s = session(RuleBase::builder().rule(rule));

    s.insert(Fact::new("Claim").with("code", 7i64));
    s.insert(Fact::new("Code").with("value", 7.0));
    s.insert(Fact::new("Code").with("value", 7.5));

    assert_eq!(s.matches("coded").unwrap().len(), 1);
    assert_eq!(s.evaluate(&conditions()).unwrap().len(), 1);

    let literal = s
        .evaluate(&[Condition::new("Code").filter(field("value").eq(7i64))])
        .unwrap();
    assert_eq!(literal.len(), 1);
}

#[test]
fn not_holds_until_a_blocker_appears() {
    let rule = Rule::new("unreviewed")
        .when(Condition::new("Claim").bind("c"))
        .when(Condition::not("Review").join(field("claim").eq_var("c")));
    let mut s = session(RuleBase::builder().rule(rule));
    let c = s.insert(claim("P1", 10));
    assert_eq!(s.agenda_size(), 1);

    let review = s.insert(Fact::new("Review").with("claim", c));
    assert!(s.matches("unreviewed").unwrap().is_empty());
    assert_eq!(s.agenda_size(), 0);

    s.retract(review).unwrap();
    assert_eq!(s.matches("unreviewed").unwrap().len(), 1);
}

#[test]
fn exists_matches_once_regardless_of_witnesses() {
    let rule = Rule::new("insured")
        .when(Condition::new("Claim").capture("p", field("policy")))
        .when(Condition::exists("Policy").join(field("number").eq_var("p")));
    let mut s = session(RuleBase::builder().rule(rule));
    s.insert(claim("P1", 10));

    let first = s.insert(policy("P1"));
    let second = s.insert(policy("P1"));
    let matches = s.matches("insured").unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].0.len(), 1);

    s.retract(first).unwrap();
    assert_eq!(s.matches("insured").unwrap().len(), 1);
    s.retract(second).unwrap();
    assert!(s.matches("insured").unwrap().is_empty());
}

// =============================================================================
// Accumulation
// =============================================================================

#[test]
fn sum_follows_retraction_without_rescanning() {
    let rule = Rule::new("exposure")
        .when(Condition::accumulate("Claim", sum(field("amount")), "total").having(Op::Gt, 0));
    let mut s = session(RuleBase::builder().rule(rule));
    s.insert(claim("P1", 100));
    let middle = s.insert(claim("P1", 200));
    s.insert(claim("P1", 300));

    let total = |s: &Session| {
        s.matches("exposure").unwrap()[0]
            .1
            .get("total")
            .cloned()
    };
    assert_eq!(total(&s), Some(Value::Float(600.0)));

    s.reset_stats();
    s.retract(middle).unwrap();
    assert_eq!(total(&s), Some(Value::Float(400.0)));
    assert_eq!(s.stats().accumulate_rescans, 0);
}

fn float_exposure() -> Condition {
    Condition::accumulate("Claim", sum(field("amount")), "total").having(Op::Gt, 0.5)
}

fn float_claim(amount: f64) -> Fact {
    Fact::new("Claim").with("policy", "P1").with("amount", amount)
}

#[test]
fn float_sums_agree_with_a_fresh_evaluation_after_retraction() {
    let rule = Rule::new("exposure").when(float_exposure());
    let mut s = session(RuleBase::builder().rule(rule));
    let first = s.insert(float_claim(0.1));
    s.insert(float_claim(0.2));
    s.insert(float_claim(0.3));
    assert_eq!(s.matches("exposure").unwrap().len(), 1);

    // 0.2 + 0.3 is exactly 0.5, which does not exceed the threshold.
    s.retract(first).unwrap();
    assert!(s.evaluate(&[float_exposure()]).unwrap().is_empty());
    assert!(s.matches("exposure").unwrap().is_empty());
}

#[test]
fn overflowing_sums_recover_when_a_contribution_leaves() {
    let rule = Rule::new("exposure").when(float_exposure());
    let mut s = session(RuleBase::builder().rule(rule));
    s.insert(float_claim(f64::MAX));
    let second = s.insert(float_claim(f64::MAX));
    s.insert(float_claim(1.0));

    let total = |s: &Session| s.matches("exposure").unwrap()[0].1.get("total").cloned();
    assert_eq!(total(&s), Some(Value::Float(f64::INFINITY)));

    s.reset_stats();
    s.retract(second).unwrap();
    let fresh = s.evaluate(&[float_exposure()]).unwrap();
    assert_eq!(total(&s), Some(Value::Float(f64::MAX)));
    assert_eq!(fresh[0].bindings.get("total"), Some(&Value::Float(f64::MAX)));
    assert_eq!(s.stats().accumulate_rescans, 1);
}

#[test]
fn having_gates_the_match() {
    let rule = Rule::new("busy-policy")
        .when(Condition::new("Policy").capture("n", field("number")))
        .when(
            Condition::accumulate("Claim", count(), "claims")
                .join(field("policy").eq_var("n"))
                .having(Op::Ge, 2),
        );
    let mut s = session(RuleBase::builder().rule(rule));
    s.insert(policy("P1"));
    s.insert(claim("P1", 1));
    assert!(s.matches("busy-policy").unwrap().is_empty());

    let second = s.insert(claim("P1", 2));
    let matches = s.matches("busy-policy").unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].1.get("claims"), Some(&Value::Int(2)));

    s.retract(second).unwrap();
    assert!(s.matches("busy-policy").unwrap().is_empty());
}

// =============================================================================
// Type Routing
// =============================================================================

#[test]
fn supertype_conditions_match_subtype_facts() {
    let rule = Rule::new("any-claim").when(Condition::new("Claim").bind("c"));
    let mut s = session(
        RuleBase::builder()
            .declare_type("AutoClaim", ["Claim"])
            .rule(rule),
    );
    let auto = s.insert(Fact::new("AutoClaim").with("amount", 5));
    s.insert(Fact::new("Invoice"));

    let matches = s.matches("any-claim").unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].0.handles(), &[auto]);
}

#[test]
fn alpha_nodes_are_shared() {
    let a = Rule::new("a").when(Condition::new("Claim").filter(field("amount").gt(10)));
    let b = Rule::new("b")
        .when(Condition::new("Claim").filter(field("amount").gt(10)))
        .when(Condition::new("Policy"));
    let rulebase = RuleBase::builder().rule(a).rule(b).build().unwrap();
    // Claim[amount > 10] and Policy.
    assert_eq!(rulebase.alpha_node_count(), 2);
}

// =============================================================================
// Incremental Work
// =============================================================================

#[test]
fn single_insert_work_does_not_grow_with_memory() {
    let work = |claims: usize| {
        let mut s = session(RuleBase::builder().rule(covered()));
        for i in 0..10 {
            s.insert(policy(&format!("P{i}")));
        }
        for i in 0..claims {
            s.insert(claim(&format!("P{}", i % 10), 1));
        }
        s.reset_stats();
        s.insert(claim("P3", 1));
        s.stats()
    };

    let small = work(10);
    let large = work(1_000);
    assert_eq!(small.join_evaluations, large.join_evaluations);
    assert_eq!(small.alpha_evaluations, large.alpha_evaluations);
    assert_eq!(small.tokens_created, large.tokens_created);
}

#[test]
fn constraint_errors_drop_the_candidate() {
    let rule = Rule::new("big").when(Condition::new("Claim").filter(field("amount").gt(10)));
    let mut s = session(RuleBase::builder().rule(rule));
    s.insert(Fact::new("Claim"));
    s.insert(claim("P1", 50));
    assert_eq!(s.matches("big").unwrap().len(), 1);
}
