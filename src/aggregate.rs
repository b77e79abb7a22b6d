//! Aggregate evaluation: `count/sum/avg/min/max/any/all`.
//!
//! An aggregate re-enters the traversal machinery from the node it is
//! evaluated on. The source is either a named identifier — a group if
//! one exists under that name, otherwise a relation traversed with
//! unlimited depth — or an inline subquery run through its full
//! pipeline. A name that is both a group and a relation is a validation
//! error, never resolved silently at evaluation time.
//!
//! Whatever the source produced is flattened (every descendant included)
//! before aggregating.

use serde::{Deserialize, Serialize};

use crate::env::{EvalContext, QueryEnv, TraversalFacts};
use crate::expr::{Expr, ValidationCtx};
use crate::filter::KeepAll;
use crate::model::{QueryResultNode, Span, Value};
use crate::pipeline::Query;
use crate::traversal::{traverse, FlattenMode, OutputConfig, TraversalConfig};

// ============================================================================
// Shape
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Any,
    All,
}

impl AggFunc {
    pub fn name(self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Avg => "avg",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Any => "any",
            AggFunc::All => "all",
        }
    }

    fn needs_arg(self) -> bool {
        !matches!(self, AggFunc::Count)
    }
}

/// What the aggregate runs over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggSource {
    /// Group if one exists under this name, else a relation with
    /// unlimited depth.
    Named(String),
    /// Inline query, run through its full pipeline.
    Subquery(Box<Query>),
}

/// One aggregate call. `arg` is the per-node expression: the summed /
/// compared value for `sum/avg/min/max`, the boolean condition for
/// `any/all`; `count` takes none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateExpr {
    pub func: AggFunc,
    pub source: AggSource,
    pub arg: Option<Box<Expr>>,
    pub span: Span,
}

impl AggregateExpr {
    pub fn new(func: AggFunc, source: AggSource) -> Self {
        Self { func, source, arg: None, span: Span::default() }
    }

    pub fn with_arg(mut self, arg: Expr) -> Self {
        self.arg = Some(Box::new(arg));
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

// ============================================================================
// Evaluation
// ============================================================================

impl AggregateExpr {
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Value {
        let nodes = match self.collect(ctx) {
            Some(nodes) => nodes,
            None => return Value::Null,
        };
        let flat = flatten(nodes);

        match self.func {
            AggFunc::Count => Value::Number(flat.len() as f64),
            AggFunc::Sum | AggFunc::Avg => self.fold_numeric(ctx, &flat),
            AggFunc::Min | AggFunc::Max => self.fold_extreme(ctx, &flat),
            AggFunc::Any | AggFunc::All => self.fold_boolean(ctx, &flat),
        }
    }

    /// Resolve the source into result nodes. `None` means the source
    /// itself was unusable (ambiguous or unknown name); an error has
    /// already been recorded.
    fn collect(&self, ctx: &EvalContext<'_>) -> Option<Vec<QueryResultNode>> {
        let env = ctx.env;
        match &self.source {
            AggSource::Subquery(query) => Some(query.execute_nested(env, ctx.path, None)),
            AggSource::Named(name) => {
                let group = env.source().resolve_group_query(name);
                let relation = env.source().resolve_relation_id(name);
                match (group, relation) {
                    (Some(_), Some(_)) => {
                        env.add_error(
                            format!("Ambiguous aggregate source '{name}': both a group and a relation exist"),
                            Some(self.span),
                        );
                        None
                    }
                    (Some(query), None) => Some(run_group_unfiltered(env, &query, ctx.path)),
                    (None, Some(id)) => {
                        let config = TraversalConfig {
                            start_path: ctx.path.to_string(),
                            relation: id,
                            label: None,
                            max_depth: None,
                            output: OutputConfig { flatten_from: FlattenMode::None },
                        };
                        Some(traverse(env, &config, &KeepAll, None, None))
                    }
                    (None, None) => {
                        env.add_error(
                            format!("Unknown aggregate source '{name}'"),
                            Some(self.span),
                        );
                        None
                    }
                }
            }
        }
    }

    fn arg_value(&self, env: &QueryEnv<'_>, node: &QueryResultNode) -> Value {
        let Some(arg) = &self.arg else {
            return Value::Null;
        };
        let facts = TraversalFacts {
            depth: node.depth,
            relation: node.relation.clone(),
            implied: node.implied,
            implied_from: node.implied_from.clone(),
        };
        let ctx = EvalContext::for_node(env, &node.path, &node.properties, Some(&facts));
        arg.evaluate(&ctx)
    }

    /// `sum` / `avg`: non-numeric values are skipped silently. An empty
    /// qualifying set sums to 0; its average is null.
    fn fold_numeric(&self, ctx: &EvalContext<'_>, nodes: &[QueryResultNode]) -> Value {
        let mut total = 0.0;
        let mut qualifying = 0usize;
        for node in nodes {
            if let Value::Number(n) = self.arg_value(ctx.env, node) {
                total += n;
                qualifying += 1;
            }
        }
        match self.func {
            AggFunc::Sum => Value::Number(total),
            _ if qualifying == 0 => Value::Null,
            _ => Value::Number(total / qualifying as f64),
        }
    }

    /// `min` / `max` via `compare`, skipping nulls. Null when nothing
    /// qualifies.
    fn fold_extreme(&self, ctx: &EvalContext<'_>, nodes: &[QueryResultNode]) -> Value {
        let mut best: Option<Value> = None;
        for node in nodes {
            let value = self.arg_value(ctx.env, node);
            if value.is_null() {
                continue;
            }
            best = Some(match best.take() {
                None => value,
                Some(current) => {
                    let replace = match self.func {
                        AggFunc::Min => value.compare(&current) == std::cmp::Ordering::Less,
                        _ => value.compare(&current) == std::cmp::Ordering::Greater,
                    };
                    if replace {
                        value
                    } else {
                        current
                    }
                }
            });
        }
        best.unwrap_or(Value::Null)
    }

    /// `any` / `all`, short-circuiting. `all` is vacuously true over an
    /// empty set, `any` false.
    fn fold_boolean(&self, ctx: &EvalContext<'_>, nodes: &[QueryResultNode]) -> Value {
        for node in nodes {
            let truthy = self.arg_value(ctx.env, node).is_truthy();
            match self.func {
                AggFunc::Any if truthy => return Value::Bool(true),
                AggFunc::All if !truthy => return Value::Bool(false),
                _ => {}
            }
        }
        Value::Bool(self.func == AggFunc::All)
    }

    pub fn validate(&self, vctx: &ValidationCtx<'_>) {
        match &self.source {
            AggSource::Named(name) => {
                let group = vctx.env.source().resolve_group_query(name).is_some();
                let relation = vctx.env.source().resolve_relation_id(name).is_some();
                if group && relation {
                    vctx.error(
                        format!("Ambiguous aggregate source '{name}': both a group and a relation exist"),
                        Some(self.span),
                    );
                } else if !group && !relation {
                    vctx.error(format!("Unknown aggregate source '{name}'"), Some(self.span));
                }
            }
            AggSource::Subquery(query) => query.validate(vctx.env),
        }

        match &self.arg {
            Some(arg) => arg.validate(vctx),
            None if self.func.needs_arg() => {
                vctx.error(
                    format!("Aggregate '{}' requires an argument expression", self.func.name()),
                    Some(self.span),
                );
            }
            None => {}
        }
    }
}

/// A group source is traversed unfiltered: its chains and depth apply,
/// its guard and transforms do not.
fn run_group_unfiltered(
    env: &QueryEnv<'_>,
    group: &Query,
    start_path: &str,
) -> Vec<QueryResultNode> {
    let stripped = Query {
        guard: None,
        source: crate::pipeline::FromClause {
            chains: group.source.chains.clone(),
            depth: group.source.depth,
            flatten: group.source.flatten,
            extend: false,
            prune: None,
        },
        transforms: Vec::new(),
    };
    stripped.execute_nested(env, start_path, None)
}

/// Tree to linear list, every descendant included.
fn flatten(nodes: Vec<QueryResultNode>) -> Vec<QueryResultNode> {
    let mut flat = Vec::new();
    for mut node in nodes {
        let children = std::mem::take(&mut node.children);
        flat.push(node);
        flat.extend(flatten(children));
    }
    flat
}

// ============================================================================
// Tests
// ============================================================================
