//! Integration tests for Value
//!
//! Tests comparison semantics, ordering, display, and conversions.

use std::cmp::Ordering;
use std::collections::HashSet;

use reteline_foundation::{FactHandle, Value};

// =============================================================================
// Comparison
// =============================================================================

#[test]
fn numbers_compare_across_int_and_float() {
    assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
    assert_eq!(Value::Float(3.0).compare(&Value::Int(3)), Some(Ordering::Equal));
    assert_eq!(Value::Int(10).compare(&Value::Int(9)), Some(Ordering::Greater));
}

#[test]
fn mixed_types_are_incomparable() {
    assert_eq!(Value::from("10").compare(&Value::Int(10)), None);
    assert_eq!(Value::Bool(true).compare(&Value::Nil), None);
}

#[test]
fn equality_is_structural_and_type_strict() {
    assert_eq!(Value::from("a"), Value::from(String::from("a")));
    assert_ne!(Value::Int(1), Value::Float(1.0));
    assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn total_order_sorts_by_kind_then_value() {
    let mut values = vec![
        Value::from("b"),
        Value::Int(3),
        Value::Nil,
        Value::Float(1.5),
        Value::Bool(false),
        Value::from("a"),
    ];
    values.sort();
    assert_eq!(
        values,
        vec![
            Value::Nil,
            Value::Bool(false),
            Value::Float(1.5),
            Value::Int(3),
            Value::from("a"),
            Value::from("b"),
        ]
    );
}

#[test]
fn equal_numbers_order_int_first() {
    assert_eq!(Value::Int(1).cmp(&Value::Float(1.0)), Ordering::Less);
    assert_eq!(Value::Float(1.0).cmp(&Value::Int(1)), Ordering::Greater);
}

// =============================================================================
// Hashing and Display
// =============================================================================

#[test]
fn values_deduplicate_in_hash_sets() {
    let set: HashSet<Value> = [Value::Int(1), Value::Int(1), Value::from("x"), Value::from("x")]
        .into_iter()
        .collect();
    assert_eq!(set.len(), 2);
}

#[test]
fn display_renders_plain_values() {
    assert_eq!(Value::from("PENDING").to_string(), "PENDING");
    assert_eq!(Value::Handle(FactHandle::new(7)).to_string(), "#7");
    assert_eq!(Value::from(vec![1i64, 2, 3]).to_string(), "[1 2 3]");
}

#[test]
fn conversions() {
    assert_eq!(Value::from(5i32), Value::Int(5));
    assert_eq!(Value::from(true).as_bool(), Some(true));
    assert_eq!(Value::from(FactHandle::new(3)).as_handle(), Some(FactHandle::new(3)));
    assert_eq!(Value::from(vec!["a", "b"]).as_list().map(|l| l.len()), Some(2));
    assert!(Value::Nil.is_nil());
    assert!(!Value::Bool(false).is_truthy());
    assert!(Value::Int(0).is_truthy());
}
