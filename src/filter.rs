//! Composable traversal-time node filtering.
//!
//! A filter sees every visited node and decides two things independently:
//! whether the node appears in the output (`include`) and whether the walk
//! descends into its children (`traverse`). PRUNE maps to `{false, false}`
//! — drop the node and its whole subtree.
//!
//! WHERE is deliberately *not* a traversal-time filter: excluding a node
//! during descent would also stop visiting wanted descendants, so WHERE
//! runs as a post-traversal transform with child promotion instead (see
//! `pipeline`). `WhereFilter` below implements the traversal-time variant
//! anyway (`include=false, traverse=true`) but nothing wires it in.

use crate::env::EvalContext;
use crate::expr::Expr;

/// Per-node filter outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterDecision {
    pub include: bool,
    pub traverse: bool,
}

impl FilterDecision {
    pub const KEEP: FilterDecision = FilterDecision { include: true, traverse: true };
    pub const DROP: FilterDecision = FilterDecision { include: false, traverse: false };

    /// Both fields are true only if both sides agree.
    pub fn and(self, other: FilterDecision) -> FilterDecision {
        FilterDecision {
            include: self.include && other.include,
            traverse: self.traverse && other.traverse,
        }
    }
}

/// A traversal-time node filter.
pub trait NodeFilter {
    fn decide(&self, ctx: &EvalContext<'_>) -> FilterDecision;
}

/// The identity filter — keeps and descends everywhere.
pub struct KeepAll;

impl NodeFilter for KeepAll {
    fn decide(&self, _ctx: &EvalContext<'_>) -> FilterDecision {
        FilterDecision::KEEP
    }
}

/// PRUNE: a truthy condition drops the node and its subtree.
pub struct PruneFilter {
    condition: Expr,
}

impl PruneFilter {
    pub fn new(condition: Expr) -> Self {
        Self { condition }
    }
}

impl NodeFilter for PruneFilter {
    fn decide(&self, ctx: &EvalContext<'_>) -> FilterDecision {
        if self.condition.test(ctx) {
            FilterDecision::DROP
        } else {
            FilterDecision::KEEP
        }
    }
}

/// Traversal-time WHERE: a failing node is excluded from output but its
/// subtree is still walked. Exists for completeness; the pipeline applies
/// WHERE post-traversal so excluded ancestors can promote their children.
pub struct WhereFilter {
    condition: Expr,
}

impl WhereFilter {
    pub fn new(condition: Expr) -> Self {
        Self { condition }
    }
}

impl NodeFilter for WhereFilter {
    fn decide(&self, ctx: &EvalContext<'_>) -> FilterDecision {
        FilterDecision {
            include: self.condition.test(ctx),
            traverse: true,
        }
    }
}

/// AND-combination of any number of filters. Zero filters is the
/// identity; evaluation short-circuits once both fields have gone false.
pub struct CombinedFilter {
    filters: Vec<Box<dyn NodeFilter>>,
}

impl CombinedFilter {
    pub fn new(filters: Vec<Box<dyn NodeFilter>>) -> Self {
        Self { filters }
    }
}

impl NodeFilter for CombinedFilter {
    fn decide(&self, ctx: &EvalContext<'_>) -> FilterDecision {
        let mut decision = FilterDecision::KEEP;
        for filter in &self.filters {
            decision = decision.and(filter.decide(ctx));
            if decision == FilterDecision::DROP {
                break;
            }
        }
        decision
    }
}

// ============================================================================
// Tests
// ============================================================================
