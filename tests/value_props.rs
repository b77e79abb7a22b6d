//! Property-based checks over the value ordering and equality laws that
//! the sort and filter machinery depend on.

use proptest::prelude::*;
use std::cmp::Ordering;
use tql::Value;

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        (-1.0e12..1.0e12f64).prop_map(Value::Number),
        "[a-zA-Z0-9 _.-]{0,16}".prop_map(Value::String),
        any::<bool>().prop_map(Value::Bool),
        (0i64..4_102_444_800_000i64).prop_map(|ms| {
            Value::Date(chrono::DateTime::from_timestamp_millis(ms).unwrap())
        }),
    ]
}

fn any_value() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(2, 8, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(Value::Array)
    })
}

proptest! {
    #[test]
    fn compare_is_reflexive(v in any_value()) {
        prop_assert_eq!(v.compare(&v), Ordering::Equal);
    }

    #[test]
    fn compare_is_antisymmetric(a in any_value(), b in any_value()) {
        prop_assert_eq!(a.compare(&b), b.compare(&a).reverse());
    }

    #[test]
    fn null_sorts_after_everything(v in any_value()) {
        if !v.is_null() {
            prop_assert_eq!(Value::Null.compare(&v), Ordering::Greater);
            prop_assert_eq!(v.compare(&Value::Null), Ordering::Less);
        }
    }

    #[test]
    fn equals_is_symmetric(a in any_value(), b in any_value()) {
        prop_assert_eq!(a.equals(&b), b.equals(&a));
    }

    #[test]
    fn equal_scalars_compare_equal(a in scalar(), b in scalar()) {
        if a.equals(&b) {
            prop_assert_eq!(a.compare(&b), Ordering::Equal);
        }
    }

    #[test]
    fn serde_round_trip_preserves_value(v in any_value()) {
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(&back, &v);
        prop_assert_eq!(back.is_truthy(), v.is_truthy());
    }

    #[test]
    fn null_is_never_equal_to_non_null(v in any_value()) {
        if !v.is_null() {
            prop_assert!(!Value::Null.equals(&v));
            prop_assert!(!v.equals(&Value::Null));
        }
    }
}
