//! # tql — Traversal Query Language engine
//!
//! A declarative query engine for navigating a directed graph of notes
//! connected by typed relations ("up", "down", "next", ...). A query
//! traverses the graph from a start note, optionally prunes, filters and
//! sorts the result, and attaches display values.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `GraphSource` is the contract between the engine and
//!    note storage — the engine never touches storage directly
//! 2. **Clean DTOs**: `Value`, `RelationEdge`, `QueryResultNode` cross all
//!    boundaries
//! 3. **Immutable evaluation**: one fresh `EvalContext` per visited node,
//!    never a shared mutable context
//! 4. **Errors are data**: user/data errors accumulate as diagnostics on the
//!    per-query environment; `Err` is reserved for broken engine input
//!
//! ## Quick Start
//!
//! ```rust
//! use tql::{MemoryGraph, QueryEnv, Query, FromClause, ChainSpec, RelationSpec};
//!
//! let mut graph = MemoryGraph::new();
//! let down = graph.add_relation("down", None);
//! graph.add_note("root.md", Default::default());
//! graph.add_note("child.md", Default::default());
//! graph.add_edge("root.md", "child.md", down);
//!
//! let query = Query::from_source(FromClause::single(ChainSpec::new(
//!     RelationSpec::named("down"),
//! )));
//!
//! let env = QueryEnv::new(&graph, "root.md");
//! let output = query.execute(&env, "root.md");
//! assert_eq!(output.results.len(), 1);
//! assert_eq!(output.results[0].path, "child.md");
//! ```
//!
//! ## Pipeline
//!
//! | Stage | Clause | Behavior |
//! |-------|--------|----------|
//! | Guard | WHEN | evaluated against the active file; rejection hides the query |
//! | Source | FROM | chain traversal (tree / flatten / partial flatten) |
//! | Transform | WHERE | post-traversal filter with child promotion |
//! | Transform | SORT | multi-key sort, chain-adjacency aware |
//! | Transform | DISPLAY | attaches ordered display key/value pairs |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod env;
pub mod expr;
pub mod filter;
pub mod traversal;
pub mod chain;
pub mod pipeline;
pub mod sort;
pub mod aggregate;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Value, PropertyMap, RelationEdge, RelationId, VisualDirection,
    QueryResultNode, QueryOutput, Diagnostic, Span, FileMetadata,
};

// ============================================================================
// Re-exports: Environment
// ============================================================================

pub use env::{GraphSource, QueryEnv, EvalContext, Diagnostics, MemoryGraph};

// ============================================================================
// Re-exports: Expressions
// ============================================================================

pub use expr::{
    Expr, ArithOp, CmpOp, DateBase, RelativeDate, DurationUnit,
    FunctionRegistry, AggFunc, AggSource,
};

// ============================================================================
// Re-exports: Engine
// ============================================================================

pub use filter::{FilterDecision, NodeFilter, PruneFilter, WhereFilter, CombinedFilter};
pub use traversal::{TraversalConfig, OutputConfig, FlattenMode, NodeContext, LeafContinuation};
pub use chain::{ChainSpec, ChainTarget, RelationSpec};
pub use pipeline::{Query, FromClause, Transform, DisplaySpec, DisplayItem};
pub use sort::{SortKey, ChainStructure};

// ============================================================================
// Error Types
// ============================================================================

/// Fatal engine errors.
///
/// User and data errors (unknown properties, type mismatches, unresolved
/// groups) never surface here — they accumulate as [`Diagnostic`]s on the
/// query environment. `Error` is reserved for input the engine cannot
/// meaningfully run: a malformed clause tree handed over by the parser, or
/// an environment that violates its own contract.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid query structure: {0}")]
    InvalidQuery(String),

    #[error("Environment contract violation: {0}")]
    Environment(String),
}

pub type Result<T> = std::result::Result<T, Error>;
