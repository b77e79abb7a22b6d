//! Operator semantics: arithmetic, comparison, membership, range.
//!
//! Everything here routes through `Value::compare` / `Value::equals` /
//! `Value::is_truthy` — operators never invent their own coercions.

use std::cmp::Ordering;

use chrono::Duration;
use tracing::trace;

use crate::env::EvalContext;
use crate::model::{Span, Value};

use super::{ArithOp, CmpOp};

// ============================================================================
// Arithmetic
// ============================================================================

/// `+` / `-`.
///
/// Numbers use numeric arithmetic. `Date ± Number` treats the number as
/// milliseconds and yields a Date. `String + any` concatenates. Any other
/// pairing is a reported type error yielding null.
pub fn eval_arith(
    op: ArithOp,
    lhs: Value,
    rhs: Value,
    ctx: &EvalContext<'_>,
    span: Span,
) -> Value {
    match (op, &lhs, &rhs) {
        (_, Value::Number(a), Value::Number(b)) => match op {
            ArithOp::Add => Value::Number(a + b),
            ArithOp::Sub => Value::Number(a - b),
        },

        (_, Value::Date(d), Value::Number(ms)) => {
            let signed = match op {
                ArithOp::Add => *ms,
                ArithOp::Sub => -*ms,
            };
            Value::Date(*d + Duration::milliseconds(signed as i64))
        }

        (ArithOp::Add, Value::String(_), _) | (ArithOp::Add, _, Value::String(_)) => {
            Value::String(format!("{}{}", plain(&lhs), plain(&rhs)))
        }

        _ => {
            trace!(op = ?op, lhs = lhs.type_name(), rhs = rhs.type_name(), "arithmetic type error");
            ctx.env.add_error(
                format!(
                    "Cannot apply '{}' to {} and {}",
                    match op {
                        ArithOp::Add => "+",
                        ArithOp::Sub => "-",
                    },
                    lhs.type_name(),
                    rhs.type_name()
                ),
                Some(span),
            );
            Value::Null
        }
    }
}

/// String form used by concatenation — no quotes around strings.
fn plain(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// Comparison
// ============================================================================

/// `<  >  <=  >=  =  !=  =?  !=?`.
///
/// Ordering comparisons propagate null. `=`/`!=` special-case null
/// identity on either side. `=?`/`!=?` never produce null: a null left
/// side makes `=?` false and `!=?` true unconditionally.
pub fn eval_cmp(op: CmpOp, lhs: Value, rhs: Value) -> Value {
    match op {
        CmpOp::Lt | CmpOp::Gt | CmpOp::Le | CmpOp::Ge => {
            if lhs.is_null() || rhs.is_null() {
                return Value::Null;
            }
            let ord = lhs.compare(&rhs);
            Value::Bool(match op {
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Gt => ord == Ordering::Greater,
                CmpOp::Le => ord != Ordering::Greater,
                CmpOp::Ge => ord != Ordering::Less,
                _ => unreachable!(),
            })
        }
        CmpOp::Eq => Value::Bool(lhs.equals(&rhs)),
        CmpOp::Ne => Value::Bool(!lhs.equals(&rhs)),
        CmpOp::EqCoalesce => {
            if lhs.is_null() {
                Value::Bool(false)
            } else {
                Value::Bool(lhs.equals(&rhs))
            }
        }
        CmpOp::NeCoalesce => {
            if lhs.is_null() {
                Value::Bool(true)
            } else {
                Value::Bool(!lhs.equals(&rhs))
            }
        }
    }
}

// ============================================================================
// Membership
// ============================================================================

/// `x in y`. Null right side is false. Array right side is an existential
/// equals test. String/string is a substring test. Anything else is false.
pub fn eval_in(needle: Value, haystack: Value) -> Value {
    let found = match (&needle, &haystack) {
        (_, Value::Null) => false,
        (_, Value::Array(items)) => items.iter().any(|item| needle.equals(item)),
        (Value::String(n), Value::String(h)) => h.contains(n.as_str()),
        _ => false,
    };
    Value::Bool(found)
}

// ============================================================================
// Range
// ============================================================================

/// `v in lo..hi` — inclusive on both bounds; null propagates from any
/// operand.
pub fn eval_range(value: Value, lo: Value, hi: Value) -> Value {
    if value.is_null() || lo.is_null() || hi.is_null() {
        return Value::Null;
    }
    Value::Bool(
        value.compare(&lo) != Ordering::Less && value.compare(&hi) != Ordering::Greater,
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{MemoryGraph, QueryEnv};
    use chrono::{TimeZone, Utc};

    fn env_fixture() -> MemoryGraph {
        let mut g = MemoryGraph::new();
        g.add_note("n.md", Default::default());
        g
    }

    #[test]
    fn test_numeric_and_string_add() {
        let g = env_fixture();
        let env = QueryEnv::new(&g, "n.md");
        let ctx = EvalContext::active_file(&env);

        assert_eq!(
            eval_arith(ArithOp::Add, Value::Number(2.0), Value::Number(3.0), &ctx, Span::default()),
            Value::Number(5.0)
        );
        assert_eq!(
            eval_arith(ArithOp::Add, Value::String("v".into()), Value::Number(2.0), &ctx, Span::default()),
            Value::String("v2".into())
        );
        assert!(env.diagnostics.errors().is_empty());
    }

    #[test]
    fn test_date_plus_milliseconds() {
        let g = env_fixture();
        let env = QueryEnv::new(&g, "n.md");
        let ctx = EvalContext::active_file(&env);

        let d = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let day_ms = 86_400_000.0;
        let result = eval_arith(ArithOp::Add, Value::Date(d), Value::Number(day_ms), &ctx, Span::default());
        assert_eq!(result, Value::Date(Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_bad_arithmetic_reports_and_yields_null() {
        let g = env_fixture();
        let env = QueryEnv::new(&g, "n.md");
        let ctx = EvalContext::active_file(&env);

        let result = eval_arith(
            ArithOp::Sub,
            Value::Bool(true),
            Value::Number(1.0),
            &ctx,
            Span::new(4, 12),
        );
        assert_eq!(result, Value::Null);
        let errors = env.diagnostics.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].span, Some(Span::new(4, 12)));
    }

    #[test]
    fn test_ordering_propagates_null() {
        assert_eq!(eval_cmp(CmpOp::Lt, Value::Null, Value::Number(1.0)), Value::Null);
        assert_eq!(eval_cmp(CmpOp::Ge, Value::Number(1.0), Value::Null), Value::Null);
    }

    #[test]
    fn test_eq_null_identity() {
        assert_eq!(eval_cmp(CmpOp::Eq, Value::Null, Value::Null), Value::Bool(true));
        assert_eq!(eval_cmp(CmpOp::Eq, Value::Null, Value::Number(0.0)), Value::Bool(false));
        assert_eq!(eval_cmp(CmpOp::Ne, Value::Null, Value::Number(0.0)), Value::Bool(true));
    }

    #[test]
    fn test_coalescing_comparisons_never_null() {
        assert_eq!(eval_cmp(CmpOp::EqCoalesce, Value::Null, Value::Null), Value::Bool(false));
        assert_eq!(eval_cmp(CmpOp::NeCoalesce, Value::Null, Value::Null), Value::Bool(true));
        assert_eq!(
            eval_cmp(CmpOp::EqCoalesce, Value::Number(1.0), Value::Number(1.0)),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_membership() {
        let list = Value::from(vec![1i64, 2, 3]);
        assert_eq!(eval_in(Value::Number(2.0), list.clone()), Value::Bool(true));
        assert_eq!(eval_in(Value::Number(9.0), list), Value::Bool(false));
        assert_eq!(
            eval_in(Value::String("ra".into()), Value::String("graph".into())),
            Value::Bool(true)
        );
        assert_eq!(eval_in(Value::Number(1.0), Value::Null), Value::Bool(false));
        assert_eq!(eval_in(Value::Number(1.0), Value::Number(1.0)), Value::Bool(false));
    }

    #[test]
    fn test_range_inclusive_and_null() {
        assert_eq!(
            eval_range(Value::Number(5.0), Value::Number(5.0), Value::Number(10.0)),
            Value::Bool(true)
        );
        assert_eq!(
            eval_range(Value::Number(11.0), Value::Number(5.0), Value::Number(10.0)),
            Value::Bool(false)
        );
        assert_eq!(
            eval_range(Value::Null, Value::Number(5.0), Value::Number(10.0)),
            Value::Null
        );
    }
}
