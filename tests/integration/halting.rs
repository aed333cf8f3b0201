//! Stopping execution loops

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use reteline::engine::{Condition, Rule, RuleBase};
use reteline::foundation::Fact;

#[test]
fn fire_until_halt_stops_when_another_thread_asks() {
    let (fired_tx, fired_rx) = mpsc::channel();
    let rulebase = RuleBase::builder()
        .rule(Rule::new("count").when(Condition::new("Claim")).then(move |_| {
            let _ = fired_tx.send(());
            Ok(())
        }))
        .build()
        .unwrap();
    let mut s = Arc::new(rulebase).new_session();
    for _ in 0..3 {
        s.insert(Fact::new("Claim"));
    }

    let halt = s.halt_handle();
    let halter = thread::spawn(move || {
        for _ in 0..3 {
            fired_rx.recv().unwrap();
        }
        halt.halt();
    });

    // Blocks on the empty agenda until the halt arrives.
    assert_eq!(s.fire_until_halt(), 3);
    halter.join().unwrap();
    assert!(!s.halt_handle().is_halted());
}

#[test]
fn actions_can_halt_the_loop() {
    let rulebase = RuleBase::builder()
        .rule(
            Rule::new("stop")
                .with_salience(10)
                .when(Condition::new("Stop"))
                .then(|ctx| {
                    ctx.halt();
                    Ok(())
                }),
        )
        .rule(Rule::new("work").when(Condition::new("Claim")))
        .build()
        .unwrap();
    let mut s = Arc::new(rulebase).new_session();
    s.insert(Fact::new("Claim"));
    s.insert(Fact::new("Claim"));
    s.insert(Fact::new("Stop"));

    assert_eq!(s.fire_all_rules(), 1);
    assert_eq!(s.agenda_size(), 2);
    assert_eq!(s.fire_all_rules(), 2);
}

#[test]
fn a_pending_halt_stops_the_next_loop() {
    let rulebase = RuleBase::builder()
        .rule(Rule::new("work").when(Condition::new("Claim")))
        .build()
        .unwrap();
    let mut s = Arc::new(rulebase).new_session();
    s.insert(Fact::new("Claim"));

    s.halt();
    assert_eq!(s.fire_all_rules(), 0);
    assert_eq!(s.fire_all_rules(), 1);
}

#[test]
fn fire_limit_counts_only_completed_actions() {
    let rulebase = RuleBase::builder()
        .rule(Rule::new("work").when(Condition::new("Claim")))
        .build()
        .unwrap();
    let mut s = Arc::new(rulebase).new_session();
    for _ in 0..5 {
        s.insert(Fact::new("Claim"));
    }

    assert_eq!(s.fire_all_rules_limit(2), 2);
    assert_eq!(s.agenda_size(), 3);
    assert_eq!(s.fire_all_rules(), 3);
}
