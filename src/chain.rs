//! Relation chains (`a >> b >> c`).
//!
//! A chain is a head relation plus an ordered list of continuation
//! targets. The head is traversed normally; every leaf of that traversal
//! then continues into the next target via the [`LeafContinuation`] hook,
//! and so on until the chain is exhausted. Ancestor sets are forwarded
//! across segment boundaries so a later segment cannot walk back into an
//! earlier one.
//!
//! Targets resolve in three ways: a named relation (a fresh traversal), a
//! named group (the group's stored query, executed from the leaf), or an
//! inline subquery. Targets after a group or subquery continue from the
//! leaves of its result forest, so any target kind can appear anywhere in
//! the chain. An unresolvable target yields a warning and zero continuation
//! nodes; the traversal up to that point stands.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::env::QueryEnv;
use crate::filter::NodeFilter;
use crate::model::QueryResultNode;
use crate::pipeline::Query;
use crate::traversal::{
    traverse, LeafContinuation, NodeContext, OutputConfig, TraversalConfig,
};

// ============================================================================
// Specs
// ============================================================================

/// One relation reference in a chain, with an optional edge-label
/// restriction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationSpec {
    pub name: String,
    pub label: Option<String>,
}

impl RelationSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), label: None }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A continuation target after `>>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChainTarget {
    Relation(RelationSpec),
    /// Named reusable query, resolved through the environment.
    Group(String),
    /// Inline query executed from each leaf.
    Subquery(Box<Query>),
}

/// A full chain: head relation plus continuation targets in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub first: RelationSpec,
    pub rest: Vec<ChainTarget>,
}

impl ChainSpec {
    pub fn new(first: RelationSpec) -> Self {
        Self { first, rest: Vec::new() }
    }

    pub fn then(mut self, target: ChainTarget) -> Self {
        self.rest.push(target);
        self
    }

    pub fn then_relation(self, name: impl Into<String>) -> Self {
        self.then(ChainTarget::Relation(RelationSpec::named(name)))
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Run one chain from `start_path`. The head segment and every chained
/// relation segment share the same depth bound, output shape and filter.
pub fn run_chain(
    env: &QueryEnv<'_>,
    chain: &ChainSpec,
    start_path: &str,
    max_depth: Option<u32>,
    output: OutputConfig,
    filter: &dyn NodeFilter,
    initial_ancestors: Option<&HashSet<String>>,
) -> Vec<QueryResultNode> {
    let Some(relation) = env.source().resolve_relation_id(&chain.first.name) else {
        env.add_warning(format!("Unknown relation '{}'", chain.first.name));
        return Vec::new();
    };

    debug!(head = %chain.first.name, targets = chain.rest.len(), "chain run");

    let config = TraversalConfig {
        start_path: start_path.to_string(),
        relation,
        label: chain.first.label.clone(),
        max_depth,
        output,
    };

    if chain.rest.is_empty() {
        return traverse(env, &config, filter, None, initial_ancestors);
    }

    let continuation = ChainContinuation {
        targets: &chain.rest,
        max_depth,
        output,
        filter,
    };
    traverse(env, &config, filter, Some(&continuation), initial_ancestors)
}

/// Leaf continuation that carries the remaining chain targets. All state
/// arrives through the hook's arguments; the struct itself is immutable.
struct ChainContinuation<'a> {
    targets: &'a [ChainTarget],
    max_depth: Option<u32>,
    output: OutputConfig,
    filter: &'a dyn NodeFilter,
}

impl LeafContinuation for ChainContinuation<'_> {
    fn on_leaf(
        &self,
        env: &QueryEnv<'_>,
        node: &NodeContext,
        ancestors: &HashSet<String>,
    ) -> Vec<QueryResultNode> {
        self.continue_from(env, &node.path, ancestors)
    }
}

impl<'a> ChainContinuation<'a> {
    fn with_targets(&self, targets: &'a [ChainTarget]) -> ChainContinuation<'a> {
        ChainContinuation {
            targets,
            max_depth: self.max_depth,
            output: self.output,
            filter: self.filter,
        }
    }

    /// Resolve the first pending target from `path`, then hand the rest of
    /// the chain to the leaves of whatever that target produced.
    fn continue_from(
        &self,
        env: &QueryEnv<'_>,
        path: &str,
        ancestors: &HashSet<String>,
    ) -> Vec<QueryResultNode> {
        let (target, remaining) = match self.targets.split_first() {
            Some(split) => split,
            None => return Vec::new(),
        };

        match target {
            ChainTarget::Relation(spec) => {
                let Some(relation) = env.source().resolve_relation_id(&spec.name) else {
                    env.add_warning(format!("Unknown relation '{}'", spec.name));
                    return Vec::new();
                };
                let config = TraversalConfig {
                    start_path: path.to_string(),
                    relation,
                    label: spec.label.clone(),
                    max_depth: self.max_depth,
                    output: self.output,
                };
                if remaining.is_empty() {
                    traverse(env, &config, self.filter, None, Some(ancestors))
                } else {
                    let next = self.with_targets(remaining);
                    traverse(env, &config, self.filter, Some(&next), Some(ancestors))
                }
            }

            ChainTarget::Group(name) => {
                let Some(query) = env.source().resolve_group_query(name) else {
                    env.add_warning(format!("Unresolved group '{name}'"));
                    return Vec::new();
                };
                let mut nodes = query.execute_nested(env, path, Some(ancestors));
                if !remaining.is_empty() {
                    self.with_targets(remaining)
                        .attach_at_leaves(env, &mut nodes, ancestors);
                }
                nodes
            }

            ChainTarget::Subquery(query) => {
                let mut nodes = query.execute_nested(env, path, Some(ancestors));
                if !remaining.is_empty() {
                    self.with_targets(remaining)
                        .attach_at_leaves(env, &mut nodes, ancestors);
                }
                nodes
            }
        }
    }

    /// Continue the chain from every leaf of an already-materialized result
    /// forest. Paths walked on the way down join the ancestor set so the
    /// continuation cannot re-enter this segment.
    fn attach_at_leaves(
        &self,
        env: &QueryEnv<'_>,
        nodes: &mut [QueryResultNode],
        ancestors: &HashSet<String>,
    ) {
        for node in nodes {
            let mut inherited = ancestors.clone();
            inherited.insert(node.path.clone());
            if node.children.is_empty() {
                node.children = self.continue_from(env, &node.path, &inherited);
            } else {
                self.attach_at_leaves(env, &mut node.children, &inherited);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{GraphSource, MemoryGraph};
    use crate::filter::KeepAll;
    use crate::model::PropertyMap;
    use crate::traversal::FlattenMode;

    /// root -down-> a -down-> a1; a1 -next-> n1 -next-> n2.
    fn chained_graph() -> MemoryGraph {
        let mut g = MemoryGraph::new();
        let down = g.add_relation("down", None);
        let next = g.add_relation("next", None);
        for path in ["root.md", "a.md", "a1.md", "n1.md", "n2.md"] {
            g.add_note(path, PropertyMap::new());
        }
        g.add_edge("root.md", "a.md", down);
        g.add_edge("a.md", "a1.md", down);
        g.add_edge("a1.md", "n1.md", next);
        g.add_edge("n1.md", "n2.md", next);
        g
    }

    fn output() -> OutputConfig {
        OutputConfig { flatten_from: FlattenMode::None }
    }

    #[test]
    fn test_chain_switches_relation_at_leaves() {
        let g = chained_graph();
        let env = QueryEnv::new(&g, "root.md");

        let chain = ChainSpec::new(RelationSpec::named("down")).then_relation("next");
        let nodes = run_chain(&env, &chain, "root.md", None, output(), &KeepAll, None);

        // down: root -> a -> a1; then next from leaf a1: n1 -> n2.
        let a = &nodes[0];
        assert_eq!(a.path, "a.md");
        let a1 = &a.children[0];
        assert_eq!(a1.path, "a1.md");
        let n1 = &a1.children[0];
        assert_eq!(n1.path, "n1.md");
        assert_eq!(n1.relation, "next");
        // Depth restarts per segment.
        assert_eq!(n1.depth, 1);
        assert_eq!(n1.children[0].path, "n2.md");
    }

    #[test]
    fn test_chain_ancestors_cross_boundary() {
        let mut g = chained_graph();
        let next = g.resolve_relation_id("next").unwrap();
        // Cycle from the second segment back into the first.
        g.add_edge("n1.md", "a.md", next);
        let env = QueryEnv::new(&g, "root.md");

        let chain = ChainSpec::new(RelationSpec::named("down")).then_relation("next");
        let nodes = run_chain(&env, &chain, "root.md", None, output(), &KeepAll, None);

        let n1 = &nodes[0].children[0].children[0];
        assert_eq!(n1.path, "n1.md");
        let child_paths: Vec<_> = n1.children.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(child_paths, vec!["n2.md"]);
    }

    #[test]
    fn test_unknown_relation_warns_and_yields_nothing() {
        let g = chained_graph();
        let env = QueryEnv::new(&g, "root.md");

        let chain = ChainSpec::new(RelationSpec::named("sideways"));
        let nodes = run_chain(&env, &chain, "root.md", None, output(), &KeepAll, None);

        assert!(nodes.is_empty());
        let warnings = env.diagnostics.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("sideways"));
    }

    #[test]
    fn test_unresolved_group_warns_and_keeps_head_results() {
        let g = chained_graph();
        let env = QueryEnv::new(&g, "root.md");

        let chain = ChainSpec::new(RelationSpec::named("down"))
            .then(ChainTarget::Group("projects".into()));
        let nodes = run_chain(&env, &chain, "root.md", None, output(), &KeepAll, None);

        // Head traversal stands; the leaf just gains no continuation.
        assert_eq!(nodes[0].path, "a.md");
        assert_eq!(nodes[0].children[0].path, "a1.md");
        assert!(nodes[0].children[0].children.is_empty());
        assert!(env
            .diagnostics
            .warnings()
            .iter()
            .any(|w| w.message.contains("Unresolved group 'projects'")));
    }

    #[test]
    fn test_chain_continues_past_a_group_target() {
        use crate::pipeline::FromClause;

        let mut g = MemoryGraph::new();
        let down = g.add_relation("down", None);
        let next = g.add_relation("next", None);
        let up = g.add_relation("up", None);
        for path in ["root.md", "a.md", "n1.md", "top.md"] {
            g.add_note(path, PropertyMap::new());
        }
        g.add_edge("root.md", "a.md", down);
        g.add_edge("a.md", "n1.md", next);
        g.add_edge("n1.md", "top.md", up);
        g.add_group(
            "followups",
            Query::from_source(FromClause::single(ChainSpec::new(
                RelationSpec::named("next"),
            ))),
        );
        let env = QueryEnv::new(&g, "root.md");

        let chain = ChainSpec::new(RelationSpec::named("down"))
            .then(ChainTarget::Group("followups".into()))
            .then_relation("up");
        let nodes = run_chain(&env, &chain, "root.md", None, output(), &KeepAll, None);

        // down: a; group from a: n1; up from the group's leaf: top.
        let a = &nodes[0];
        assert_eq!(a.path, "a.md");
        let n1 = &a.children[0];
        assert_eq!(n1.path, "n1.md");
        assert_eq!(n1.children[0].path, "top.md");
        assert_eq!(n1.children[0].relation, "up");
    }

    #[test]
    fn test_chain_continues_past_a_subquery_target() {
        use crate::pipeline::FromClause;

        let mut g = chained_graph();
        let up = g.add_relation("up", None);
        g.add_note("top.md", PropertyMap::new());
        g.add_edge("n2.md", "top.md", up);
        let env = QueryEnv::new(&g, "root.md");

        let subquery = Query::from_source(FromClause::single(ChainSpec::new(
            RelationSpec::named("next"),
        )));
        let chain = ChainSpec::new(RelationSpec::named("down"))
            .then(ChainTarget::Subquery(Box::new(subquery)))
            .then_relation("up");
        let nodes = run_chain(&env, &chain, "root.md", None, output(), &KeepAll, None);

        // The `up` segment starts at n2, the subquery forest's deepest leaf.
        let a1 = &nodes[0].children[0];
        assert_eq!(a1.path, "a1.md");
        let n2 = &a1.children[0].children[0];
        assert_eq!(n2.path, "n2.md");
        assert_eq!(n2.children[0].path, "top.md");
        assert_eq!(n2.children[0].relation, "up");
    }

    #[test]
    fn test_three_segment_chain() {
        let mut g = chained_graph();
        let up = g.add_relation("up", None);
        g.add_note("top.md", PropertyMap::new());
        g.add_edge("n2.md", "top.md", up);
        let env = QueryEnv::new(&g, "root.md");

        let chain = ChainSpec::new(RelationSpec::named("down"))
            .then_relation("next")
            .then_relation("up");
        let nodes = run_chain(&env, &chain, "root.md", None, output(), &KeepAll, None);

        let n2 = &nodes[0].children[0].children[0].children[0];
        assert_eq!(n2.path, "n2.md");
        assert_eq!(n2.children[0].path, "top.md");
        assert_eq!(n2.children[0].relation, "up");
    }
}
