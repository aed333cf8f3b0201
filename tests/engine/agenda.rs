//! Integration tests for the agenda
//!
//! Tests conflict resolution, agenda groups and focus, activation groups,
//! and the loop controls (no-loop, lock-on-active, the firing ceiling).

use std::sync::Arc;

use reteline_engine::{
    CancelReason, Condition, EngineEvent, EventLog, GroupState, Rule, RuleBase, Session,
    SessionConfig, field,
};
use reteline_foundation::{Fact, FactHandle, Value};

fn session_with(rules: Vec<Rule>, config: SessionConfig) -> (Session, EventLog) {
    let mut builder = RuleBase::builder();
    for rule in rules {
        builder = builder.rule(rule);
    }
    let mut session = Arc::new(builder.build().unwrap()).new_session_with(config);
    let log = EventLog::new();
    session.add_listener(log.clone());
    (session, log)
}

fn session(rules: Vec<Rule>) -> (Session, EventLog) {
    session_with(rules, SessionConfig::default())
}

fn counter(value: i64) -> Fact {
    Fact::new("Counter").with("value", value)
}

fn bump(ctx: &mut reteline_engine::RuleContext<'_>) -> reteline_foundation::Result<()> {
    let c = ctx.handle("c")?;
    let next = ctx.bound_fact("c")?.field("value")?.as_int().unwrap_or_default() + 1;
    ctx.modify(c, |f| f.set("value", next))
}

fn fired_tuples(log: &EventLog) -> Vec<Vec<FactHandle>> {
    log.events()
        .iter()
        .filter_map(|e| match e {
            EngineEvent::BeforeMatchFired { facts, .. } => Some(facts.handles().to_vec()),
            _ => None,
        })
        .collect()
}

fn names(log: &EventLog) -> Vec<String> {
    log.fired().iter().map(ToString::to_string).collect()
}

// =============================================================================
// Conflict Resolution
// =============================================================================

#[test]
fn salience_orders_firing() {
    let (mut s, log) = session(vec![
        Rule::new("low").with_salience(-10).when(Condition::new("Claim")),
        Rule::new("high").with_salience(100).when(Condition::new("Claim")),
        Rule::new("mid").when(Condition::new("Claim")),
    ]);
    s.insert(Fact::new("Claim"));
    assert_eq!(s.fire_all_rules(), 3);
    assert_eq!(names(&log), vec!["high", "mid", "low"]);
}

#[test]
fn equal_salience_fires_most_recent_first() {
    let (mut s, log) = session(vec![Rule::new("r").when(Condition::new("Claim").bind("c"))]);
    let first = s.insert(Fact::new("Claim").with("n", 1));
    let second = s.insert(Fact::new("Claim").with("n", 2));
    let third = s.insert(Fact::new("Claim").with("n", 3));

    s.fire_all_rules();
    assert_eq!(fired_tuples(&log), vec![vec![third], vec![second], vec![first]]);
}

#[test]
fn fire_limit_leaves_the_rest_pending() {
    let (mut s, _) = session(vec![Rule::new("r").when(Condition::new("Claim"))]);
    for n in 0..5 {
        s.insert(Fact::new("Claim").with("n", n));
    }
    assert_eq!(s.fire_all_rules_limit(2), 2);
    assert_eq!(s.agenda_size(), 3);
    assert_eq!(s.fire_all_rules(), 3);
}

// =============================================================================
// Activation Groups
// =============================================================================

#[test]
fn activation_group_fires_only_the_best_member() {
    let rule = |name: &str, salience: i32| {
        Rule::new(name)
            .with_salience(salience)
            .with_activation_group("pricing")
            .when(Condition::new("Claim"))
    };
    let (mut s, log) = session(vec![rule("p10", 10), rule("p100", 100), rule("p50", 50)]);
    s.insert(Fact::new("Claim"));

    assert_eq!(s.fire_all_rules(), 1);
    assert_eq!(names(&log), vec!["p100"]);
    let cancelled = log.count(|e| {
        matches!(
            e,
            EngineEvent::ActivationCancelled {
                reason: CancelReason::ActivationGroup,
                ..
            }
        )
    });
    assert_eq!(cancelled, 2);
    assert_eq!(s.agenda_size(), 0);
}

#[test]
fn activation_group_spans_agenda_groups() {
    let (mut s, log) = session(vec![
        Rule::new("main-member")
            .with_activation_group("one")
            .when(Condition::new("Claim")),
        Rule::new("review-member")
            .with_activation_group("one")
            .with_agenda_group("review")
            .when(Condition::new("Claim")),
    ]);
    s.insert(Fact::new("Claim"));
    s.set_focus("review");

    s.fire_all_rules();
    assert_eq!(names(&log), vec!["review-member"]);
}

// =============================================================================
// Agenda Groups and Focus
// =============================================================================

#[test]
fn focus_stack_is_lifo() {
    let (mut s, log) = session(vec![
        Rule::new("in-main").when(Condition::new("Claim")),
        Rule::new("in-a")
            .with_agenda_group("a")
            .when(Condition::new("Claim")),
        Rule::new("in-b")
            .with_agenda_group("b")
            .when(Condition::new("Claim")),
    ]);
    s.insert(Fact::new("Claim"));
    s.set_focus("a");
    s.set_focus("b");
    assert_eq!(s.focus(), "b");
    assert_eq!(s.agenda().group_state("a"), GroupState::Suspended);

    s.fire_all_rules();
    assert_eq!(names(&log), vec!["in-b", "in-a", "in-main"]);
    assert_eq!(s.focus(), "MAIN");

    let popped: Vec<String> = log
        .events()
        .iter()
        .filter_map(|e| match e {
            EngineEvent::FocusPopped { group } => Some(group.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(popped, vec!["b", "a"]);
}

#[test]
fn unfocused_groups_do_not_fire() {
    let (mut s, _) = session(vec![
        Rule::new("later")
            .with_agenda_group("later")
            .when(Condition::new("Claim")),
    ]);
    s.insert(Fact::new("Claim"));
    assert_eq!(s.fire_all_rules(), 0);
    assert_eq!(s.agenda().group_len("later"), 1);

    s.set_focus("later");
    assert_eq!(s.fire_all_rules(), 1);
}

#[test]
fn auto_focus_pulls_focus_on_activation() {
    let (mut s, log) = session(vec![
        Rule::new("routine")
            .with_salience(100)
            .when(Condition::new("Claim")),
        Rule::new("fraud")
            .with_agenda_group("urgent")
            .with_auto_focus(true)
            .when(Condition::new("Claim").filter(field("flagged").eq(true))),
    ]);
    s.insert(Fact::new("Claim").with("flagged", true));
    assert_eq!(s.focus(), "urgent");

    s.fire_all_rules();
    assert_eq!(names(&log), vec!["fraud", "routine"]);
}

#[test]
fn actions_can_shift_focus() {
    let (mut s, log) = session(vec![
        Rule::new("triage")
            .with_salience(10)
            .when(Condition::new("Claim"))
            .then(|ctx| {
                ctx.set_focus("review");
                Ok(())
            }),
        Rule::new("other").when(Condition::new("Claim")),
        Rule::new("review")
            .with_agenda_group("review")
            .when(Condition::new("Claim")),
    ]);
    s.insert(Fact::new("Claim"));
    s.fire_all_rules();
    assert_eq!(names(&log), vec!["triage", "review", "other"]);
}

#[test]
fn clearing_a_group_cancels_its_activations() {
    let (mut s, log) = session(vec![
        Rule::new("a").with_agenda_group("g").when(Condition::new("Claim")),
        Rule::new("b").when(Condition::new("Claim")),
    ]);
    s.insert(Fact::new("Claim"));
    s.clear_agenda_group("g");
    assert_eq!(s.agenda_size(), 1);
    s.clear_agenda();
    assert_eq!(s.agenda_size(), 0);
    assert_eq!(
        log.count(|e| matches!(
            e,
            EngineEvent::ActivationCancelled {
                reason: CancelReason::Cleared,
                ..
            }
        )),
        2
    );
}

// =============================================================================
// Loop Controls
// =============================================================================

#[test]
fn no_loop_stops_self_reactivation() {
    let (mut s, _) = session(vec![
        Rule::new("bump")
            .with_no_loop(true)
            .when(Condition::new("Counter").bind("c"))
            .then(bump),
    ]);
    let c = s.insert(counter(0));
    assert_eq!(s.fire_all_rules(), 1);
    assert_eq!(s.get(c).unwrap().get("value"), Some(&Value::Int(1)));
    assert_eq!(s.agenda_size(), 0);
}

#[test]
fn no_loop_does_not_block_other_rules() {
    let (mut s, log) = session(vec![
        Rule::new("bump")
            .with_no_loop(true)
            .when(Condition::new("Counter").bind("c"))
            .then(bump),
        Rule::new("watch").when(Condition::new("Counter").filter(field("value").eq(1))),
    ]);
    s.insert(counter(0));
    s.fire_all_rules();
    assert_eq!(names(&log), vec!["bump", "watch"]);
}

#[test]
fn runaway_rules_stop_at_the_ceiling() {
    let (mut s, log) = session_with(
        vec![
            Rule::new("bump")
                .when(Condition::new("Counter").bind("c"))
                .then(bump),
        ],
        SessionConfig::quiet().with_max_firings(50),
    );
    let c = s.insert(counter(0));

    assert_eq!(s.fire_all_rules(), 50);
    assert_eq!(s.get(c).unwrap().get("value"), Some(&Value::Int(50)));
    assert_eq!(s.agenda_size(), 1);

    let ceiling: Vec<EngineEvent> = log
        .events()
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::LoopCeilingReached { .. }))
        .collect();
    assert_eq!(
        ceiling,
        vec![EngineEvent::LoopCeilingReached {
            limit: 50,
            rule: Some(Arc::from("bump")),
        }]
    );

    // The next loop starts a fresh count.
    assert_eq!(s.fire_all_rules(), 50);
}

#[test]
fn lock_on_active_suppresses_reactivation_while_the_group_runs() {
    let (mut s, log) = session(vec![
        Rule::new("bump")
            .with_lock_on_active(true)
            .when(Condition::new("Counter").bind("c").filter(field("value").lt(5)))
            .then(bump),
    ]);
    let c = s.insert(counter(0));
    assert_eq!(s.fire_all_rules(), 1);
    assert_eq!(s.get(c).unwrap().get("value"), Some(&Value::Int(1)));

    // Outside a firing group, changes activate the rule again.
    s.modify(c, |f| f.set("value", 3)).unwrap();
    assert_eq!(s.fire_all_rules(), 1);
    assert_eq!(names(&log), vec!["bump", "bump"]);
}

#[test]
fn lock_on_active_blocks_other_rules_changes_too() {
    let (mut s, log) = session(vec![
        Rule::new("watch")
            .with_lock_on_active(true)
            .when(Condition::new("Counter").filter(field("value").eq(1))),
        Rule::new("bump")
            .with_salience(10)
            .with_no_loop(true)
            .when(Condition::new("Counter").bind("c").filter(field("value").eq(0)))
            .then(bump),
    ]);
    s.insert(counter(0));
    s.fire_all_rules();
    assert_eq!(names(&log), vec!["bump"]);
}

#[test]
fn action_errors_are_reported_and_firing_continues() {
    let (mut s, log) = session(vec![
        Rule::new("broken")
            .with_salience(10)
            .when(Condition::new("Claim"))
            .then(|ctx| ctx.value("missing").map(|_| ())),
        Rule::new("fine").when(Condition::new("Claim")),
    ]);
    s.insert(Fact::new("Claim"));

    assert_eq!(s.fire_all_rules(), 1);
    assert_eq!(names(&log), vec!["fine"]);
    let failure = log.events().into_iter().find_map(|e| match e {
        EngineEvent::ActionFailed { rule, error, .. } => Some((rule, error)),
        _ => None,
    });
    let (rule, error) = failure.unwrap();
    assert_eq!(rule.as_ref(), "broken");
    assert!(error.contains("missing"));
}
