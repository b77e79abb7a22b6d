//! Query pipeline: WHEN guard, FROM source, ordered transforms.
//!
//! A compiled query is `{guard?, source, transforms[]}`. Execution is
//! strictly staged: the guard is evaluated against the *active* file (not
//! the traversal start) and hides the whole query on rejection; the
//! source runs the chain traversals; then WHERE, SORT and DISPLAY run in
//! declaration order over the result forest.
//!
//! WHERE runs here rather than inside traversal on purpose: a node that
//! fails the test is dropped but its already-filtered children take its
//! position, flagged `has_filtered_ancestor`. A traversal-time WHERE
//! would stop descending before those children are ever seen.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chain::{run_chain, ChainSpec, ChainTarget};
use crate::env::{EvalContext, QueryEnv, TraversalFacts};
use crate::expr::{Expr, ValidationCtx};
use crate::filter::{KeepAll, NodeFilter, PruneFilter};
use crate::model::{QueryOutput, QueryResultNode, Value};
use crate::sort::{sort_forest, SortKey};
use crate::traversal::{FlattenMode, OutputConfig};

/// Property namespace reserved for engine bookkeeping; hidden from
/// DISPLAY's "all properties" expansion.
pub const INTERNAL_NAMESPACE: &str = "tql";

// ============================================================================
// FROM
// ============================================================================

/// The FROM clause: one or more chains traversed from the start path,
/// with shared depth and output-shape settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FromClause {
    pub chains: Vec<ChainSpec>,
    pub depth: Option<u32>,
    pub flatten: FlattenMode,
    /// Collapse everything below the deepest explicit chain into flat
    /// children. Ignored (with a warning) when `flatten` is set.
    pub extend: bool,
    /// PRUNE condition, applied during traversal: a truthy result drops
    /// the node and its whole subtree.
    pub prune: Option<Expr>,
}

impl FromClause {
    pub fn single(chain: ChainSpec) -> Self {
        Self {
            chains: vec![chain],
            depth: None,
            flatten: FlattenMode::None,
            extend: false,
            prune: None,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_flatten(mut self, flatten: FlattenMode) -> Self {
        self.flatten = flatten;
        self
    }

    pub fn with_extend(mut self) -> Self {
        self.extend = true;
        self
    }

    pub fn with_prune(mut self, condition: Expr) -> Self {
        self.prune = Some(condition);
        self
    }

    /// Longest chain measured in relation segments (head included).
    fn deepest_chain(&self) -> u32 {
        self.chains
            .iter()
            .map(|c| {
                1 + c
                    .rest
                    .iter()
                    .filter(|t| matches!(t, ChainTarget::Relation(_)))
                    .count() as u32
            })
            .max()
            .unwrap_or(1)
    }

    /// Effective output shape, resolving `extend` against `flatten`.
    fn output(&self, env: &QueryEnv<'_>) -> OutputConfig {
        if self.extend && self.flatten != FlattenMode::None {
            env.add_warning("extend ignored because flatten is set");
            return OutputConfig { flatten_from: self.flatten };
        }
        let flatten_from = if self.extend {
            FlattenMode::FromDepth(self.deepest_chain() + 1)
        } else {
            self.flatten
        };
        OutputConfig { flatten_from }
    }
}

// ============================================================================
// Transforms
// ============================================================================

/// One pipeline transform, applied in declaration order after the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transform {
    Where(Expr),
    Sort(Vec<SortKey>),
    Display(DisplaySpec),
}

/// One DISPLAY item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DisplayItem {
    /// Every frontmatter property, internal namespaces excluded.
    All,
    /// One expression under an explicit display key.
    Expr { key: String, expr: Expr },
}

impl DisplayItem {
    pub fn property(path: &str) -> Self {
        DisplayItem::Expr { key: path.to_string(), expr: Expr::property(path) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySpec {
    pub items: Vec<DisplayItem>,
}

impl DisplaySpec {
    pub fn all() -> Self {
        Self { items: vec![DisplayItem::All] }
    }

    pub fn of(items: Vec<DisplayItem>) -> Self {
        Self { items }
    }
}

// ============================================================================
// Query
// ============================================================================

/// A compiled query, as handed over by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub guard: Option<Expr>,
    pub source: FromClause,
    pub transforms: Vec<Transform>,
}

impl Query {
    pub fn from_source(source: FromClause) -> Self {
        Self { guard: None, source, transforms: Vec::new() }
    }

    pub fn when(mut self, guard: Expr) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn filter_where(mut self, condition: Expr) -> Self {
        self.transforms.push(Transform::Where(condition));
        self
    }

    pub fn sort_by(mut self, keys: Vec<SortKey>) -> Self {
        self.transforms.push(Transform::Sort(keys));
        self
    }

    pub fn display(mut self, spec: DisplaySpec) -> Self {
        self.transforms.push(Transform::Display(spec));
        self
    }

    /// Run the full pipeline. Diagnostics collected along the way are
    /// returned on the output, whether or not the guard passed.
    pub fn execute(&self, env: &QueryEnv<'_>, start_path: &str) -> QueryOutput {
        if let Some(guard) = &self.guard {
            let ctx = EvalContext::active_file(env);
            if !guard.test(&ctx) {
                debug!(active = env.active_path(), "guard rejected query");
                return QueryOutput::hidden(
                    env.diagnostics.warnings(),
                    env.diagnostics.errors(),
                );
            }
        }

        let results = self.execute_nested(env, start_path, None);
        QueryOutput {
            visible: true,
            results,
            warnings: env.diagnostics.warnings(),
            errors: env.diagnostics.errors(),
        }
    }

    /// Source plus transforms, without the guard. Used directly by chain
    /// continuation (group/subquery targets) and aggregate sources, which
    /// inherit the ancestor set of the traversal that spawned them.
    pub(crate) fn execute_nested(
        &self,
        env: &QueryEnv<'_>,
        start_path: &str,
        ancestors: Option<&HashSet<String>>,
    ) -> Vec<QueryResultNode> {
        let mut nodes = self.run_source(env, start_path, ancestors);
        for transform in &self.transforms {
            nodes = match transform {
                Transform::Where(condition) => apply_where(env, nodes, condition),
                Transform::Sort(keys) => {
                    let mut sorted = nodes;
                    sort_forest(env, keys, &mut sorted);
                    sorted
                }
                Transform::Display(spec) => apply_display(env, nodes, spec),
            };
        }
        nodes
    }

    fn run_source(
        &self,
        env: &QueryEnv<'_>,
        start_path: &str,
        ancestors: Option<&HashSet<String>>,
    ) -> Vec<QueryResultNode> {
        let output = self.source.output(env);
        let keep_all = KeepAll;
        let prune;
        let filter: &dyn NodeFilter = match &self.source.prune {
            Some(condition) => {
                prune = PruneFilter::new(condition.clone());
                &prune
            }
            None => &keep_all,
        };

        let mut nodes = Vec::new();
        for chain in &self.source.chains {
            nodes.extend(run_chain(
                env,
                chain,
                start_path,
                self.source.depth,
                output,
                filter,
                ancestors,
            ));
        }
        nodes
    }

    /// Structural validation of every clause and expression. Problems
    /// accumulate as diagnostics; validation never halts early.
    pub fn validate(&self, env: &QueryEnv<'_>) {
        let vctx = ValidationCtx::new(env);

        if let Some(guard) = &self.guard {
            guard.validate(&vctx);
        }

        if self.source.extend && self.source.flatten != FlattenMode::None {
            vctx.warning("extend ignored because flatten is set");
        }
        if let Some(condition) = &self.source.prune {
            condition.validate(&vctx);
        }
        for chain in &self.source.chains {
            if env.source().resolve_relation_id(&chain.first.name).is_none() {
                vctx.error(format!("Unknown relation '{}'", chain.first.name), None);
            }
            for target in &chain.rest {
                match target {
                    ChainTarget::Relation(spec) => {
                        if env.source().resolve_relation_id(&spec.name).is_none() {
                            vctx.error(format!("Unknown relation '{}'", spec.name), None);
                        }
                    }
                    ChainTarget::Group(name) => {
                        if env.source().resolve_group_query(name).is_none() {
                            vctx.error(format!("Unknown group '{name}'"), None);
                        }
                    }
                    ChainTarget::Subquery(query) => query.validate(env),
                }
            }
        }

        for transform in &self.transforms {
            match transform {
                Transform::Where(condition) => condition.validate(&vctx),
                Transform::Sort(keys) => {
                    for key in keys {
                        if let SortKey::Property { expr, .. } = key {
                            expr.validate(&vctx);
                        }
                    }
                }
                Transform::Display(spec) => {
                    for item in &spec.items {
                        if let DisplayItem::Expr { expr, .. } = item {
                            expr.validate(&vctx);
                        }
                    }
                }
            }
        }
    }
}

// ============================================================================
// WHERE
// ============================================================================

fn node_facts(node: &QueryResultNode) -> TraversalFacts {
    TraversalFacts {
        depth: node.depth,
        relation: node.relation.clone(),
        implied: node.implied,
        implied_from: node.implied_from.clone(),
    }
}

/// Recursive post-traversal filter. Children are filtered first; a
/// failing node is replaced by its surviving children, each flagged
/// `has_filtered_ancestor`.
fn apply_where(
    env: &QueryEnv<'_>,
    nodes: Vec<QueryResultNode>,
    condition: &Expr,
) -> Vec<QueryResultNode> {
    let mut out = Vec::new();
    for mut node in nodes {
        let children = apply_where(env, std::mem::take(&mut node.children), condition);

        let facts = node_facts(&node);
        let ctx = EvalContext::for_node(env, &node.path, &node.properties, Some(&facts));
        let keep = condition.test(&ctx);

        if keep {
            node.children = children;
            out.push(node);
        } else {
            for mut promoted in children {
                promoted.has_filtered_ancestor = true;
                out.push(promoted);
            }
        }
    }
    out
}

// ============================================================================
// DISPLAY
// ============================================================================

/// Attach ordered display key/value pairs to every node in the forest.
fn apply_display(
    env: &QueryEnv<'_>,
    nodes: Vec<QueryResultNode>,
    spec: &DisplaySpec,
) -> Vec<QueryResultNode> {
    nodes
        .into_iter()
        .map(|mut node| {
            node.children = apply_display(env, std::mem::take(&mut node.children), spec);
            node.display_properties = display_pairs(env, &node, spec);
            node
        })
        .collect()
}

fn display_pairs(
    env: &QueryEnv<'_>,
    node: &QueryResultNode,
    spec: &DisplaySpec,
) -> Vec<(String, Value)> {
    let facts = node_facts(node);
    let ctx = EvalContext::for_node(env, &node.path, &node.properties, Some(&facts));

    let mut seen: HashSet<String> = HashSet::new();
    let mut pairs = Vec::new();

    for item in &spec.items {
        match item {
            DisplayItem::All => {
                // Stable order for the expansion: the property map is
                // unordered, so sort by key.
                let mut keys: Vec<&String> = node
                    .properties
                    .keys()
                    .filter(|k| !is_internal_key(k))
                    .collect();
                keys.sort();
                for key in keys {
                    if seen.insert(key.clone()) {
                        pairs.push((key.clone(), node.properties[key].clone()));
                    }
                }
            }
            DisplayItem::Expr { key, expr } => {
                if seen.insert(key.clone()) {
                    pairs.push((key.clone(), expr.evaluate(&ctx)));
                }
            }
        }
    }
    pairs
}

fn is_internal_key(key: &str) -> bool {
    key == INTERNAL_NAMESPACE
        || key
            .strip_prefix(INTERNAL_NAMESPACE)
            .map_or(false, |rest| rest.starts_with('.'))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::RelationSpec;
    use crate::env::{GraphSource, MemoryGraph};
    use crate::expr::CmpOp;
    use crate::model::PropertyMap;

    /// root -> a {priority 2} -> g {priority 5}; root -> b {priority 1}.
    fn fixture() -> MemoryGraph {
        let mut g = MemoryGraph::new();
        let down = g.add_relation("down", None);
        g.add_note("root.md", PropertyMap::new());
        g.add_note_json("a.md", serde_json::json!({ "priority": 2 }));
        g.add_note_json("b.md", serde_json::json!({ "priority": 1 }));
        g.add_note_json("g.md", serde_json::json!({ "priority": 5 }));
        g.add_edge("root.md", "a.md", down);
        g.add_edge("root.md", "b.md", down);
        g.add_edge("a.md", "g.md", down);
        g
    }

    fn down_query() -> Query {
        Query::from_source(FromClause::single(ChainSpec::new(RelationSpec::named("down"))))
    }

    #[test]
    fn test_guard_rejection_hides_query() {
        let g = fixture();
        let env = QueryEnv::new(&g, "root.md");

        let query = down_query().when(Expr::property("published"));
        let output = query.execute(&env, "root.md");

        assert!(!output.visible);
        assert!(output.results.is_empty());
    }

    #[test]
    fn test_guard_uses_active_file_not_start() {
        let g = fixture();
        // Active file is a.md (priority 2); traversal still starts at root.
        let env = QueryEnv::new(&g, "a.md");

        let query = down_query().when(Expr::cmp(
            CmpOp::Gt,
            Expr::property("priority"),
            Expr::literal(1i64),
        ));
        let output = query.execute(&env, "root.md");

        assert!(output.visible);
        assert_eq!(output.results.len(), 2);
    }

    #[test]
    fn test_where_promotes_children_of_excluded_nodes() {
        let g = fixture();
        let env = QueryEnv::new(&g, "root.md");

        // a fails (priority 2 < 3), g passes and is promoted to a's spot.
        let query = down_query().filter_where(Expr::cmp(
            CmpOp::Ge,
            Expr::property("priority"),
            Expr::literal(3i64),
        ));
        let output = query.execute(&env, "root.md");

        assert_eq!(output.results.len(), 1);
        let g_node = &output.results[0];
        assert_eq!(g_node.path, "g.md");
        assert!(g_node.has_filtered_ancestor);
    }

    #[test]
    fn test_where_keeps_passing_node_with_filtered_children() {
        let g = fixture();
        let env = QueryEnv::new(&g, "root.md");

        let query = down_query().filter_where(Expr::cmp(
            CmpOp::Gt,
            Expr::property("priority"),
            Expr::literal(1i64),
        ));
        let output = query.execute(&env, "root.md");

        // b (priority 1) excluded with no children to promote.
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].path, "a.md");
        assert_eq!(output.results[0].children[0].path, "g.md");
        assert!(!output.results[0].children[0].has_filtered_ancestor);
    }

    #[test]
    fn test_display_all_excludes_internal_and_dedups_explicit() {
        let mut g = fixture();
        g.add_note_json(
            "c.md",
            serde_json::json!({ "priority": 9, "tql.origin": "sync", "title": "C" }),
        );
        let down = g.resolve_relation_id("down").unwrap();
        g.add_edge("root.md", "c.md", down);
        let env = QueryEnv::new(&g, "root.md");

        let query = down_query().display(DisplaySpec::of(vec![
            DisplayItem::property("priority"),
            DisplayItem::All,
        ]));
        let output = query.execute(&env, "root.md");

        let c = output.results.iter().find(|n| n.path == "c.md").unwrap();
        let keys: Vec<&str> = c.display_properties.iter().map(|(k, _)| k.as_str()).collect();
        // Explicit pick first, All expansion skips it and the internal key.
        assert_eq!(keys, vec!["priority", "title"]);
    }

    #[test]
    fn test_extend_with_flatten_warns_and_is_ignored() {
        let g = fixture();
        let env = QueryEnv::new(&g, "root.md");

        let mut query = down_query();
        query.source.extend = true;
        query.source.flatten = FlattenMode::Full;
        let output = query.execute(&env, "root.md");

        assert!(output
            .warnings
            .iter()
            .any(|w| w.message == "extend ignored because flatten is set"));
        // Full flatten still applies.
        assert!(output.results.iter().all(|n| n.depth == 1));
    }

    #[test]
    fn test_validate_collects_unknown_relation_and_group() {
        let g = fixture();
        let env = QueryEnv::new(&g, "root.md");

        let query = Query::from_source(FromClause::single(
            ChainSpec::new(RelationSpec::named("sideways"))
                .then(ChainTarget::Group("missing".into())),
        ));
        query.validate(&env);

        let errors = env.diagnostics.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("sideways"));
        assert!(errors[1].message.contains("missing"));
    }
}
