//! Listeners, tracing, and reported failures

use std::sync::Arc;

use reteline::debug::{Tracer, TracerConfig};
use reteline::engine::{Condition, EngineEvent, EventLog, Rule, RuleBase, field};
use reteline::foundation::{Error, Fact};

#[test]
fn tracer_groups_events_by_firing() {
    let rulebase = RuleBase::builder()
        .rule(
            Rule::new("approve")
                .with_no_loop(true)
                .when(Condition::new("Claim").bind("c"))
                .then(|ctx| {
                    let c = ctx.handle("c")?;
                    ctx.modify(c, |f| f.set("status", "APPROVED"))
                }),
        )
        .build()
        .unwrap();
    let tracer = Tracer::new(TracerConfig::new().enabled());
    let mut s = Arc::new(rulebase).new_session();
    s.add_listener(tracer.clone());

    s.insert(Fact::new("Claim"));
    s.fire_all_rules();

    assert_eq!(tracer.current_cycle(), 1);
    let setup: Vec<_> = tracer.with_buffer(|b| {
        b.records_for_cycle(0)
            .iter()
            .map(|r| r.event_type())
            .collect()
    });
    assert_eq!(setup, vec!["fact-inserted", "activation-created"]);

    let firing: Vec<_> = tracer.with_buffer(|b| {
        b.records_for_cycle(1)
            .iter()
            .map(|r| r.event_type())
            .collect()
    });
    assert_eq!(firing.first(), Some(&"before-fire"));
    assert_eq!(firing.last(), Some(&"after-fire"));
    assert!(firing.contains(&"fact-updated"));
    assert!(tracer.format_recent(1).contains("COMPLETE approve"));
}

#[test]
fn action_errors_reach_listeners() {
    let rulebase = RuleBase::builder()
        .rule(
            Rule::new("reject")
                .when(Condition::new("Claim"))
                .then(|_| Err(Error::action("no adjuster available"))),
        )
        .build()
        .unwrap();
    let log = EventLog::new();
    let mut s = Arc::new(rulebase).new_session();
    s.add_listener(log.clone());
    let claim = s.insert(Fact::new("Claim"));

    assert_eq!(s.fire_all_rules(), 0);
    let failure = log.events().into_iter().find_map(|e| match e {
        EngineEvent::ActionFailed { rule, facts, error } => Some((rule, facts, error)),
        _ => None,
    });
    let (rule, facts, error) = failure.unwrap();
    assert_eq!(rule.as_ref(), "reject");
    assert_eq!(facts.handles(), &[claim]);
    assert_eq!(error, "action failed: no adjuster available");
}

#[test]
fn constraint_errors_reach_listeners() {
    let rulebase = RuleBase::builder()
        .rule(Rule::new("large").when(Condition::new("Claim").filter(field("amount").gt(1000))))
        .build()
        .unwrap();
    let failures = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&failures);
    let mut s = Arc::new(rulebase).new_session();
    s.add_listener(move |event: &EngineEvent| {
        if let EngineEvent::ConstraintFailed { rules, fact, error } = event {
            sink.lock().unwrap().push((rules.clone(), *fact, error.clone()));
        }
    });

    let claim = s.insert(Fact::new("Claim"));
    s.insert(Fact::new("Claim").with("amount", 5000));

    let failures = failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    let (rules, fact, error) = &failures[0];
    assert_eq!(rules, &vec![Arc::<str>::from("large")]);
    assert_eq!(*fact, Some(claim));
    assert_eq!(error, "field not found: amount on Claim");
    assert_eq!(s.agenda_size(), 1);
}

#[test]
fn quiet_sessions_still_report_firings() {
    let rulebase = RuleBase::builder()
        .rule(Rule::new("work").when(Condition::new("Claim")))
        .build()
        .unwrap();
    let log = EventLog::new();
    let mut s = Arc::new(rulebase)
        .new_session_with(reteline::engine::SessionConfig::quiet());
    s.add_listener(log.clone());
    s.insert(Fact::new("Claim"));
    s.fire_all_rules();

    assert_eq!(log.len(), 2);
    assert_eq!(log.fired(), vec![Arc::<str>::from("work")]);
}
