//! TQL expression AST and evaluation.
//!
//! The AST is a closed sum type — one variant per expression kind, with
//! exhaustive match-based dispatch. These nodes are produced by the
//! (external) parser and are pure data.
//!
//! `evaluate` is pure and infallible: ordinary domain errors (bad
//! arithmetic, unknown function at runtime) are registered on the shared
//! environment and yield null, and the rest of the tree keeps evaluating
//! with that null. `validate` finds structural problems (unknown
//! function, arity mismatch, ambiguous aggregate source) without
//! evaluating anything.

pub mod ops;
pub mod date;
pub mod functions;

use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateExpr;
use crate::env::{EvalContext, QueryEnv};
use crate::model::{Span, Value};

pub use date::{DateBase, DateExpr, DateOffset, DurationUnit, RelativeDate};
pub use functions::FunctionRegistry;
pub use crate::aggregate::{AggFunc, AggSource};

// ============================================================================
// AST
// ============================================================================

/// A TQL expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Literal value
    Literal(Value),
    /// Property access by dotted segments: `priority`, `project.status`
    Property { segments: Vec<String> },
    /// Fixed file metadata: `$file.name`
    FileMeta(FileField),
    /// Traversal-position metadata: `$traversal.depth`
    TraversalMeta(TraversalField),
    /// Arithmetic: `a + b`, `a - b`
    Arith { op: ArithOp, lhs: Box<Expr>, rhs: Box<Expr>, span: Span },
    /// Comparison: `a < b`, `a =? b`, ...
    Cmp { op: CmpOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// Short-circuit conjunction
    And(Box<Expr>, Box<Expr>),
    /// Short-circuit disjunction
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// Membership: `x in list`, `sub in string`
    In { needle: Box<Expr>, haystack: Box<Expr> },
    /// Inclusive range test: `v in lo..hi`
    Range { value: Box<Expr>, lo: Box<Expr>, hi: Box<Expr> },
    /// Date expression with optional signed duration offset
    Date(DateExpr),
    /// Function call, fixed arity: `contains(title, "draft")`
    Call { name: String, args: Vec<Expr>, span: Span },
    /// Aggregate over a group / relation / inline subquery
    Aggregate(AggregateExpr),
}

/// `$file.*` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileField {
    Name,
    Path,
    Folder,
    Created,
    Modified,
    Size,
    Tags,
    Links,
    Backlinks,
}

/// `$traversal.*` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraversalField {
    Depth,
    Relation,
    Implied,
    ImpliedFrom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Lt,
    Gt,
    Le,
    Ge,
    /// `=` — null equals only null
    Eq,
    /// `!=`
    Ne,
    /// `=?` — never null: a null left side is unconditionally false
    EqCoalesce,
    /// `!=?` — never null: a null left side is unconditionally true
    NeCoalesce,
}

// ============================================================================
// Construction helpers (used heavily by tests and embedders)
// ============================================================================

impl Expr {
    pub fn literal(v: impl Into<Value>) -> Expr {
        Expr::Literal(v.into())
    }

    pub fn property(path: &str) -> Expr {
        Expr::Property { segments: path.split('.').map(str::to_string).collect() }
    }

    pub fn cmp(op: CmpOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Cmp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::Call { name: name.to_string(), args, span: Span::default() }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

impl Expr {
    /// Evaluate against one node context. Pure; never fails — domain
    /// errors are recorded on the environment and yield null.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),

            Expr::Property { segments } => ctx.property(segments),

            Expr::FileMeta(field) => eval_file_meta(*field, ctx),

            Expr::TraversalMeta(field) => eval_traversal_meta(*field, ctx),

            Expr::Arith { op, lhs, rhs, span } => {
                let a = lhs.evaluate(ctx);
                let b = rhs.evaluate(ctx);
                ops::eval_arith(*op, a, b, ctx, *span)
            }

            Expr::Cmp { op, lhs, rhs } => {
                ops::eval_cmp(*op, lhs.evaluate(ctx), rhs.evaluate(ctx))
            }

            Expr::And(lhs, rhs) => {
                if !lhs.evaluate(ctx).is_truthy() {
                    return Value::Bool(false);
                }
                Value::Bool(rhs.evaluate(ctx).is_truthy())
            }

            Expr::Or(lhs, rhs) => {
                if lhs.evaluate(ctx).is_truthy() {
                    return Value::Bool(true);
                }
                Value::Bool(rhs.evaluate(ctx).is_truthy())
            }

            Expr::Not(inner) => Value::Bool(!inner.evaluate(ctx).is_truthy()),

            Expr::In { needle, haystack } => {
                ops::eval_in(needle.evaluate(ctx), haystack.evaluate(ctx))
            }

            Expr::Range { value, lo, hi } => {
                ops::eval_range(value.evaluate(ctx), lo.evaluate(ctx), hi.evaluate(ctx))
            }

            Expr::Date(date) => date.evaluate(ctx),

            Expr::Call { name, args, span } => {
                let values: Vec<Value> = args.iter().map(|a| a.evaluate(ctx)).collect();
                FunctionRegistry::global().dispatch(name, &values, ctx, *span)
            }

            Expr::Aggregate(agg) => agg.evaluate(ctx),
        }
    }

    /// Evaluate as a boolean test (WHERE / PRUNE / WHEN).
    pub fn test(&self, ctx: &EvalContext<'_>) -> bool {
        self.evaluate(ctx).is_truthy()
    }
}

fn eval_file_meta(field: FileField, ctx: &EvalContext<'_>) -> Value {
    let Some(meta) = ctx.file_metadata() else {
        return Value::Null;
    };
    match field {
        FileField::Name => Value::String(meta.name),
        FileField::Path => Value::String(meta.path),
        FileField::Folder => Value::String(meta.folder),
        FileField::Created => meta.created.map(Value::Date).unwrap_or(Value::Null),
        FileField::Modified => meta.modified.map(Value::Date).unwrap_or(Value::Null),
        FileField::Size => Value::Number(meta.size as f64),
        FileField::Tags => Value::from(meta.tags),
        FileField::Links => Value::from(meta.links),
        FileField::Backlinks => Value::from(meta.backlinks),
    }
}

fn eval_traversal_meta(field: TraversalField, ctx: &EvalContext<'_>) -> Value {
    let Some(t) = ctx.traversal else {
        return Value::Null;
    };
    match field {
        TraversalField::Depth => Value::Number(t.depth as f64),
        TraversalField::Relation => Value::String(t.relation.clone()),
        TraversalField::Implied => Value::Bool(t.implied),
        TraversalField::ImpliedFrom => {
            t.implied_from.clone().map(Value::String).unwrap_or(Value::Null)
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Shared state of one validation pass. Errors do not halt validation of
/// sibling clauses; they accumulate on the environment.
pub struct ValidationCtx<'a> {
    pub env: &'a QueryEnv<'a>,
    pub functions: &'a FunctionRegistry,
}

impl<'a> ValidationCtx<'a> {
    pub fn new(env: &'a QueryEnv<'a>) -> Self {
        Self { env, functions: FunctionRegistry::global() }
    }

    pub fn error(&self, message: impl Into<String>, span: Option<Span>) {
        self.env.add_error(message, span);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.env.add_warning(message);
    }
}

impl Expr {
    /// Structural validation. Collects problems, never stops early.
    pub fn validate(&self, vctx: &ValidationCtx<'_>) {
        match self {
            Expr::Literal(_) | Expr::Property { .. } => {}
            Expr::FileMeta(_) | Expr::TraversalMeta(_) => {}

            Expr::Arith { lhs, rhs, .. } | Expr::Cmp { lhs, rhs, .. } => {
                lhs.validate(vctx);
                rhs.validate(vctx);
            }

            Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
                lhs.validate(vctx);
                rhs.validate(vctx);
            }

            Expr::Not(inner) => inner.validate(vctx),

            Expr::In { needle, haystack } => {
                needle.validate(vctx);
                haystack.validate(vctx);
            }

            Expr::Range { value, lo, hi } => {
                value.validate(vctx);
                lo.validate(vctx);
                hi.validate(vctx);
            }

            Expr::Date(date) => date.validate(vctx),

            Expr::Call { name, args, span } => {
                match vctx.functions.arity(name) {
                    None => {
                        vctx.error(format!("Unknown function '{name}'"), Some(*span));
                    }
                    Some(arity) if arity != args.len() => {
                        vctx.error(
                            format!(
                                "Function '{name}' expects {arity} argument(s), got {}",
                                args.len()
                            ),
                            Some(*span),
                        );
                    }
                    Some(_) => {}
                }
                for arg in args {
                    arg.validate(vctx);
                }
            }

            Expr::Aggregate(agg) => agg.validate(vctx),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
