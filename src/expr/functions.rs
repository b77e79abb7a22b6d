//! Scalar function registry.
//!
//! The table is built explicitly by [`FunctionRegistry::standard`] — there
//! is no self-registration and no import-order dependence. Every function
//! has a fixed arity, checked during validation; at evaluation time the
//! arguments are already evaluated (eagerly, left to right) before
//! dispatch, and each implementation is pure.

use std::sync::OnceLock;

use hashbrown::HashMap;

use crate::env::EvalContext;
use crate::model::{Span, Value};

type FunctionImpl = fn(&[Value]) -> Value;

struct FunctionDef {
    arity: usize,
    func: FunctionImpl,
}

/// Lookup table for scalar functions.
pub struct FunctionRegistry {
    table: HashMap<&'static str, FunctionDef>,
}

impl FunctionRegistry {
    /// The standard function set.
    pub fn standard() -> Self {
        let mut table = HashMap::new();
        let mut def = |name: &'static str, arity: usize, func: FunctionImpl| {
            table.insert(name, FunctionDef { arity, func });
        };

        def("lower", 1, fn_lower);
        def("upper", 1, fn_upper);
        def("length", 1, fn_length);
        def("contains", 2, fn_contains);
        def("startsWith", 2, fn_starts_with);
        def("endsWith", 2, fn_ends_with);
        def("abs", 1, fn_abs);
        def("round", 1, fn_round);
        def("default", 2, fn_default);

        Self { table }
    }

    /// Process-wide registry, built on first use.
    pub fn global() -> &'static FunctionRegistry {
        static REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();
        REGISTRY.get_or_init(FunctionRegistry::standard)
    }

    /// Declared arity, or None for an unknown function.
    pub fn arity(&self, name: &str) -> Option<usize> {
        self.table.get(name).map(|def| def.arity)
    }

    /// Dispatch an already-evaluated argument list. An unknown name or an
    /// arity mismatch here means validation was skipped — reported as a
    /// runtime error yielding null.
    pub fn dispatch(
        &self,
        name: &str,
        args: &[Value],
        ctx: &EvalContext<'_>,
        span: Span,
    ) -> Value {
        match self.table.get(name) {
            Some(def) if def.arity == args.len() => (def.func)(args),
            Some(def) => {
                ctx.env.add_error(
                    format!(
                        "Function '{name}' expects {} argument(s), got {}",
                        def.arity,
                        args.len()
                    ),
                    Some(span),
                );
                Value::Null
            }
            None => {
                ctx.env.add_error(format!("Unknown function '{name}'"), Some(span));
                Value::Null
            }
        }
    }
}

// ============================================================================
// Implementations
// ============================================================================

fn fn_lower(args: &[Value]) -> Value {
    match &args[0] {
        Value::String(s) => Value::String(s.to_lowercase()),
        _ => Value::Null,
    }
}

fn fn_upper(args: &[Value]) -> Value {
    match &args[0] {
        Value::String(s) => Value::String(s.to_uppercase()),
        _ => Value::Null,
    }
}

fn fn_length(args: &[Value]) -> Value {
    match &args[0] {
        Value::String(s) => Value::Number(s.chars().count() as f64),
        Value::Array(a) => Value::Number(a.len() as f64),
        _ => Value::Null,
    }
}

fn fn_contains(args: &[Value]) -> Value {
    let found = match (&args[0], &args[1]) {
        (Value::String(s), Value::String(sub)) => s.contains(sub.as_str()),
        (Value::Array(items), needle) => items.iter().any(|item| needle.equals(item)),
        _ => false,
    };
    Value::Bool(found)
}

fn fn_starts_with(args: &[Value]) -> Value {
    match (&args[0], &args[1]) {
        (Value::String(s), Value::String(prefix)) => Value::Bool(s.starts_with(prefix.as_str())),
        _ => Value::Bool(false),
    }
}

fn fn_ends_with(args: &[Value]) -> Value {
    match (&args[0], &args[1]) {
        (Value::String(s), Value::String(suffix)) => Value::Bool(s.ends_with(suffix.as_str())),
        _ => Value::Bool(false),
    }
}

fn fn_abs(args: &[Value]) -> Value {
    match &args[0] {
        Value::Number(n) => Value::Number(n.abs()),
        _ => Value::Null,
    }
}

fn fn_round(args: &[Value]) -> Value {
    match &args[0] {
        Value::Number(n) => Value::Number(n.round()),
        _ => Value::Null,
    }
}

fn fn_default(args: &[Value]) -> Value {
    if args[0].is_null() {
        args[1].clone()
    } else {
        args[0].clone()
    }
}

// ============================================================================
// Tests
// ============================================================================
