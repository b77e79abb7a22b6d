//! Universal value type for TQL expressions and properties.
//!
//! `compare`, `equals` and `is_truthy` defined here are the single source of
//! truth for every operator, filter and sort comparator in the engine.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// TQL value.
///
/// Covers the full TQL type system:
/// - Scalars: Null, Number, String, Bool
/// - Temporal: Date
/// - Container: Array (nests arbitrarily)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Number(f64),
    String(String),
    Bool(bool),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
}

// ============================================================================
// Type checking
// ============================================================================

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Number(_) => "NUMBER",
            Value::String(_) => "STRING",
            Value::Bool(_) => "BOOL",
            Value::Date(_) => "DATE",
            Value::Array(_) => "ARRAY",
        }
    }

    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }
    pub fn is_numeric(&self) -> bool { matches!(self, Value::Number(_)) }

    /// Attempt to extract as f64.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempt to extract as &str.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Attempt to extract as a date.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }
}

// ============================================================================
// Truthiness
// ============================================================================

impl Value {
    /// TQL truthiness: false for null, `false`, `0`, `""` and the empty
    /// array; true for everything else (including `"0"` and any date).
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Date(_) => true,
        }
    }
}

// ============================================================================
// Comparison
// ============================================================================

impl Value {
    /// Total sort order over values.
    ///
    /// Null sorts after every non-null value. Numbers, strings and dates
    /// compare by natural order within matching types. Any other pairing
    /// falls back to comparing the values' string forms.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Greater,
            (_, Value::Null) => Ordering::Less,
            (Value::Number(a), Value::Number(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (a, b) => a.sort_string().cmp(&b.sort_string()),
        }
    }

    /// Equality as used by `=`, `!=`, membership and array comparison.
    ///
    /// Identical values are equal (the only way null compares equal to
    /// anything). Dates compare by timestamp. Arrays compare element-wise
    /// with equal length required; a missing element counts as null.
    pub fn equals(&self, other: &Value) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Date(a), Value::Date(b)) => a.timestamp_millis() == b.timestamp_millis(),
            (Value::Array(a), Value::Array(b)) => {
                if a.len() != b.len() {
                    return false;
                }
                let null = Value::Null;
                (0..a.len()).all(|i| {
                    let x = a.get(i).unwrap_or(&null);
                    let y = b.get(i).unwrap_or(&null);
                    x.equals(y)
                })
            }
            _ => false,
        }
    }

    /// String form used by the cross-type comparison fallback. Unlike
    /// `Display`, strings are not quoted.
    fn sort_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::Number(v as f64) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Number(v as f64) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Number(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::String(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::String(v.to_owned()) } }
impl From<DateTime<Utc>> for Value { fn from(v: DateTime<Utc>) -> Self { Value::Date(v) } }
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self { Value::Array(v.into_iter().map(Into::into).collect()) }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Value::Null) }
}

/// Frontmatter properties arrive as JSON. Objects have no Value counterpart
/// and are handled by the property layer (flattened to dotted keys), so an
/// object converts to null here.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                Value::Number(n.as_f64().unwrap_or(f64::NAN))
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => {
                Value::Array(a.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(_) => Value::Null,
        }
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%dT%H:%M:%S%.3fZ")),
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
