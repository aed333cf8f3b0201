//! Integration tests for queries and stateless execution

use std::sync::Arc;
use std::thread;

use reteline_engine::{
    Condition, Query, Rule, RuleBase, Session, StatelessSession, field, sum,
};
use reteline_foundation::{ErrorKind, Fact, FactHandle, Value};

fn rulebase() -> Arc<RuleBase> {
    let rulebase = RuleBase::builder()
        .declare_type("AutoClaim", ["Claim"])
        .rule(
            Rule::new("covered")
                .when(Condition::new("Policy").capture("n", field("number")))
                .when(Condition::new("Claim").join(field("policy").eq_var("n"))),
        )
        .query(
            Query::new("claims-for")
                .param("p")
                .when(Condition::new("Claim").bind("c").join(field("policy").eq_var("p"))),
        )
        .query(
            Query::new("uncovered")
                .when(Condition::new("Claim").capture("n", field("policy")))
                .when(Condition::not("Policy").join(field("number").eq_var("n"))),
        )
        .query(
            Query::new("exposure")
                .when(Condition::new("Policy").capture("n", field("number")))
                .when(
                    Condition::accumulate("Claim", sum(field("amount")), "total")
                        .join(field("policy").eq_var("n")),
                ),
        )
        .build();
    Arc::new(rulebase.unwrap())
}

fn claim(ty: &str, policy: &str, amount: i64) -> Fact {
    Fact::new(ty).with("policy", policy).with("amount", amount)
}

/// #0 Claim P1 100, #1 Claim P2 200, #2 AutoClaim P1 300, #3 Policy P1
fn populated() -> Session {
    let mut session = rulebase().new_session();
    session.insert(claim("Claim", "P1", 100));
    session.insert(claim("Claim", "P2", 200));
    session.insert(claim("AutoClaim", "P1", 300));
    session.insert(Fact::new("Policy").with("number", "P1"));
    session
}

fn tuples(rows: &[reteline_engine::QueryRow]) -> Vec<Vec<FactHandle>> {
    rows.iter().map(|r| r.facts.handles().to_vec()).collect()
}

// =============================================================================
// Named Queries
// =============================================================================

#[test]
fn parameters_seed_the_bindings() {
    let session = populated();
    let rows = session
        .query("claims-for", &[("p", Value::from("P1"))])
        .unwrap();

    assert_eq!(
        tuples(&rows),
        vec![vec![FactHandle::new(0)], vec![FactHandle::new(2)]]
    );
    assert_eq!(rows[1].bindings.handle("c").unwrap(), FactHandle::new(2));
    assert_eq!(rows[1].bindings.get("p"), Some(&Value::from("P1")));

    let none = session
        .query("claims-for", &[("p", Value::from("P9"))])
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn queries_see_memory_without_firing() {
    let mut session = populated();
    assert_eq!(session.query("uncovered", &[]).unwrap().len(), 1);

    session.insert(Fact::new("Policy").with("number", "P2"));
    assert!(session.query("uncovered", &[]).unwrap().is_empty());
    assert_eq!(session.agenda_size(), 3);
}

#[test]
fn accumulate_queries_bind_the_result() {
    let mut session = populated();
    let rows = session.query("exposure", &[]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].bindings.get("total"), Some(&Value::from(400.0)));
    assert_eq!(rows[0].facts.handles(), &[FactHandle::new(3)]);

    session.retract(FactHandle::new(0)).unwrap();
    let rows = session.query("exposure", &[]).unwrap();
    assert_eq!(rows[0].bindings.get("total"), Some(&Value::from(300.0)));
}

#[test]
fn query_argument_errors() {
    let session = populated();

    let unknown = session.query("nope", &[]).unwrap_err();
    assert!(matches!(unknown.kind, ErrorKind::UnknownQuery(ref name) if name == "nope"));

    let missing = session.query("claims-for", &[]).unwrap_err();
    assert!(matches!(missing.kind, ErrorKind::UnboundVariable(ref var) if var == "p"));

    let extra = session
        .query(
            "claims-for",
            &[("p", Value::from("P1")), ("x", Value::from(1))],
        )
        .unwrap_err();
    assert!(matches!(extra.kind, ErrorKind::InvalidRule { .. }));
    assert!(extra.to_string().contains("unknown parameter x"));
}

#[test]
fn queries_reading_unbound_variables_are_rejected() {
    let result = RuleBase::builder()
        .query(Query::new("broken").when(Condition::new("Claim").join(field("policy").eq_var("p"))))
        .build();
    assert!(matches!(
        result.unwrap_err().kind,
        ErrorKind::UnboundVariable(ref var) if var == "p"
    ));

    let duplicate = RuleBase::builder()
        .query(Query::new("q").when(Condition::new("Claim")))
        .query(Query::new("q").when(Condition::new("Claim")))
        .build();
    assert!(matches!(duplicate.unwrap_err().kind, ErrorKind::InvalidRule { .. }));
}

// =============================================================================
// Ad Hoc Evaluation
// =============================================================================

#[test]
fn evaluation_agrees_with_the_network() {
    let mut session = populated();
    session.insert(Fact::new("Policy").with("number", "P2"));

    let mut evaluated = tuples(
        &session
            .evaluate(&[
                Condition::new("Policy").capture("n", field("number")),
                Condition::new("Claim").join(field("policy").eq_var("n")),
            ])
            .unwrap(),
    );
    let mut held: Vec<Vec<FactHandle>> = session
        .matches("covered")
        .unwrap()
        .into_iter()
        .map(|(facts, _)| facts.handles().to_vec())
        .collect();
    evaluated.sort();
    held.sort();

    assert_eq!(evaluated.len(), 3);
    assert_eq!(evaluated, held);
}

#[test]
fn evaluation_checks_variables() {
    let session = populated();
    let error = session
        .evaluate(&[Condition::new("Claim").join(field("policy").eq_var("n"))])
        .unwrap_err();
    assert!(matches!(error.kind, ErrorKind::UnboundVariable(_)));

    assert!(matches!(
        session.matches("nope").unwrap_err().kind,
        ErrorKind::UnknownRule(_)
    ));
}

// =============================================================================
// Stateless Execution
// =============================================================================

fn approvals() -> StatelessSession {
    let rulebase = RuleBase::builder()
        .rule(
            Rule::new("approve")
                .when(
                    Condition::new("Claim")
                        .bind("c")
                        .filter(field("amount").lt(1000)),
                )
                .then(|ctx| {
                    let c = ctx.handle("c")?;
                    ctx.insert_logical(Fact::new("Approval").with("claim", c));
                    Ok(())
                }),
        )
        .rule(
            Rule::new("audit")
                .when(Condition::new("Approval"))
                .then(|ctx| {
                    ctx.insert(Fact::new("AuditEntry"));
                    Ok(())
                }),
        )
        .build()
        .unwrap();
    StatelessSession::new(Arc::new(rulebase))
}

#[test]
fn stateless_execution_reports_final_memory() {
    let stateless = approvals();
    let results = stateless.execute([
        Fact::new("Claim").with("amount", 500),
        Fact::new("Claim").with("amount", 5000),
    ]);

    assert_eq!(results.fired, 2);
    assert_eq!(results.facts.len(), 4);
    assert_eq!(results.facts_of_type("Approval").count(), 1);
    assert_eq!(results.facts_of_type("AuditEntry").count(), 1);
    assert_eq!(results.logical_facts().count(), 1);
}

#[test]
fn stateless_executions_are_independent() {
    let stateless = approvals();
    let first = stateless.execute([Fact::new("Claim").with("amount", 1)]);

    let results: Vec<_> = thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let stateless = stateless.clone();
                scope.spawn(move || stateless.execute([Fact::new("Claim").with("amount", 1)]))
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    for result in results {
        assert_eq!(result.fired, first.fired);
        assert_eq!(result.facts, first.facts);
    }
}
