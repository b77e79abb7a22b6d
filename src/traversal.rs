//! Graph traversal engine.
//!
//! One call per chain segment: walk one relation from a start path and
//! produce result nodes in one of three shapes — nested tree, fully flat
//! (breadth-first with global de-duplication), or a hybrid that nests up
//! to a depth and collapses everything below it.
//!
//! Cycle safety is enforced before descent: the ancestor set holds every
//! path between the segment start and the current node (plus any
//! ancestors inherited across a chain boundary), and an edge back into it
//! is never followed.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::env::{EvalContext, QueryEnv, TraversalFacts};
use crate::filter::{FilterDecision, NodeFilter};
use crate::model::{PropertyMap, QueryResultNode, RelationEdge, RelationId, VisualDirection};

/// Hard ceiling on descent, independent of `max_depth`. Guards against
/// unbounded recursion on pathological graphs when the query asks for
/// unlimited depth.
pub const MAX_TRAVERSAL_DEPTH: u32 = 256;

// ============================================================================
// Configuration
// ============================================================================

/// Output shape selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlattenMode {
    /// Nested tree, true per-edge depth.
    #[default]
    None,
    /// Single-level list: BFS, global dedup, every node at depth 1.
    Full,
    /// Nest above the given depth, collapse below it.
    FromDepth(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputConfig {
    pub flatten_from: FlattenMode,
}

/// One traversal invocation (outer or chained).
#[derive(Debug, Clone)]
pub struct TraversalConfig {
    pub start_path: String,
    pub relation: RelationId,
    pub label: Option<String>,
    pub max_depth: Option<u32>,
    pub output: OutputConfig,
}

impl TraversalConfig {
    fn depth_allows(&self, next_depth: u32) -> bool {
        next_depth <= self.max_depth.unwrap_or(u32::MAX) && next_depth <= MAX_TRAVERSAL_DEPTH
    }
}

// ============================================================================
// NodeContext
// ============================================================================

/// Everything known about one visited node — the single bundle threaded
/// through filter, leaf continuation and result construction.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub path: String,
    pub edge: RelationEdge,
    /// True edge distance from the segment start.
    pub depth: u32,
    pub parent: String,
    pub traversal_path: Vec<String>,
    pub properties: PropertyMap,
    pub relation: String,
    pub implied_from: Option<String>,
    pub visual_direction: VisualDirection,
}

impl NodeContext {
    fn resolve(
        env: &QueryEnv<'_>,
        edge: RelationEdge,
        depth: u32,
        parent: String,
        traversal_path: Vec<String>,
    ) -> Self {
        let properties = env.properties(&edge.to_path);
        let relation = env.relation_name(edge.relation_id);
        let implied_from = edge.implied_from_id.map(|id| env.relation_name(id));
        let visual_direction = env.source().visual_direction(edge.relation_id);
        Self {
            path: edge.to_path.clone(),
            edge,
            depth,
            parent,
            traversal_path,
            properties,
            relation,
            implied_from,
            visual_direction,
        }
    }

    pub fn facts(&self) -> TraversalFacts {
        TraversalFacts {
            depth: self.depth,
            relation: self.relation.clone(),
            implied: self.edge.implied,
            implied_from: self.implied_from.clone(),
        }
    }

    /// Result node with the given children; all other fields come from
    /// this context.
    pub fn into_result_node(self, children: Vec<QueryResultNode>) -> QueryResultNode {
        QueryResultNode {
            path: self.path,
            relation: self.relation,
            label: self.edge.label,
            depth: self.depth,
            implied: self.edge.implied,
            implied_from: self.implied_from,
            parent: Some(self.parent),
            traversal_path: self.traversal_path,
            properties: self.properties,
            display_properties: Vec::new(),
            visual_direction: self.visual_direction,
            has_filtered_ancestor: false,
            children,
        }
    }
}

// ============================================================================
// Leaf continuation
// ============================================================================

/// Hook invoked where a traversal bottoms out — both at natural leaves
/// (no matching outgoing edges) and at depth-limited ones. The chain
/// module uses it to continue into the next relation of a `>>` chain.
///
/// State is passed explicitly (node context + ancestor set); resolvers
/// must not capture mutable traversal state.
pub trait LeafContinuation {
    fn on_leaf(
        &self,
        env: &QueryEnv<'_>,
        node: &NodeContext,
        ancestors: &HashSet<String>,
    ) -> Vec<QueryResultNode>;
}

// ============================================================================
// Entry point
// ============================================================================

/// Walk one relation from `config.start_path` and build result nodes.
pub fn traverse(
    env: &QueryEnv<'_>,
    config: &TraversalConfig,
    filter: &dyn NodeFilter,
    on_leaf: Option<&dyn LeafContinuation>,
    initial_ancestors: Option<&HashSet<String>>,
) -> Vec<QueryResultNode> {
    debug!(
        start = %config.start_path,
        relation = %config.relation,
        flatten = ?config.output.flatten_from,
        "traversal segment"
    );

    let mut ancestors: HashSet<String> = initial_ancestors.cloned().unwrap_or_default();
    ancestors.insert(config.start_path.clone());

    match config.output.flatten_from {
        FlattenMode::Full => traverse_bfs(env, config, filter, on_leaf, ancestors),
        _ => {
            let mut state = DfsState {
                ancestors,
                path_stack: vec![config.start_path.clone()],
            };
            visit_children(env, config, filter, on_leaf, &mut state, &config.start_path, 1)
        }
    }
}

// ============================================================================
// Depth-first walk (tree + partial flatten)
// ============================================================================

struct DfsState {
    ancestors: HashSet<String>,
    path_stack: Vec<String>,
}

fn visit_children(
    env: &QueryEnv<'_>,
    config: &TraversalConfig,
    filter: &dyn NodeFilter,
    on_leaf: Option<&dyn LeafContinuation>,
    state: &mut DfsState,
    parent_path: &str,
    depth: u32,
) -> Vec<QueryResultNode> {
    let edges = env.outgoing_edges(parent_path, Some(config.relation), config.label.as_deref());
    let mut out = Vec::new();

    for edge in edges {
        // Cycle safety: never re-enter a path already on the walk.
        if state.ancestors.contains(&edge.to_path) {
            continue;
        }

        let mut traversal_path = state.path_stack.clone();
        traversal_path.push(edge.to_path.clone());
        let node = NodeContext::resolve(env, edge, depth, parent_path.to_string(), traversal_path);

        let facts = node.facts();
        let ctx = EvalContext::for_node(env, &node.path, &node.properties, Some(&facts));
        let decision = filter.decide(&ctx);
        if decision == FilterDecision::DROP {
            continue;
        }

        state.ancestors.insert(node.path.clone());
        state.path_stack.push(node.path.clone());

        let mut children = if decision.traverse && config.depth_allows(depth + 1) {
            visit_children(env, config, filter, on_leaf, state, &node.path.clone(), depth + 1)
        } else {
            Vec::new()
        };

        if children.is_empty() {
            if let Some(handler) = on_leaf {
                children = handler.on_leaf(env, &node, &state.ancestors);
            }
        }

        state.path_stack.pop();
        state.ancestors.remove(&node.path);

        if !decision.include {
            // Reserved: excluded from output, descendants surface in its place.
            out.extend(children);
            continue;
        }

        if let FlattenMode::FromDepth(boundary) = config.output.flatten_from {
            if depth >= boundary {
                children = collapse_preorder(children);
            }
        }

        out.push(node.into_result_node(children));
    }

    out
}

/// Pre-order flatten of a subtree into a single-level list; every emitted
/// node loses its own children.
fn collapse_preorder(nodes: Vec<QueryResultNode>) -> Vec<QueryResultNode> {
    let mut flat = Vec::new();
    for mut node in nodes {
        let children = std::mem::take(&mut node.children);
        flat.push(node);
        flat.extend(collapse_preorder(children));
    }
    flat
}

// ============================================================================
// Breadth-first walk (full flatten)
// ============================================================================

struct BfsEntry {
    edge: RelationEdge,
    depth: u32,
    traversal_path: Vec<String>,
}

fn traverse_bfs(
    env: &QueryEnv<'_>,
    config: &TraversalConfig,
    filter: &dyn NodeFilter,
    on_leaf: Option<&dyn LeafContinuation>,
    mut visited: HashSet<String>,
) -> Vec<QueryResultNode> {
    let start = config.start_path.clone();
    let mut queue: VecDeque<BfsEntry> = VecDeque::new();
    for edge in env.outgoing_edges(&start, Some(config.relation), config.label.as_deref()) {
        queue.push_back(BfsEntry {
            traversal_path: vec![start.clone(), edge.to_path.clone()],
            edge,
            depth: 1,
        });
    }

    // Emitted nodes keep their contexts around: true leaves are only
    // known once the whole queue has drained (global dedup means a
    // node's neighbors may be claimed by a later dequeue).
    let mut emitted: Vec<(NodeContext, QueryResultNode)> = Vec::new();
    let mut has_child: HashSet<String> = HashSet::new();

    while let Some(entry) = queue.pop_front() {
        let path = entry.edge.to_path.clone();
        if visited.contains(&path) {
            continue;
        }

        let parent = entry
            .traversal_path
            .get(entry.traversal_path.len().wrapping_sub(2))
            .cloned()
            .unwrap_or_else(|| start.clone());
        let node = NodeContext::resolve(
            env,
            entry.edge,
            entry.depth,
            parent.clone(),
            entry.traversal_path.clone(),
        );

        let facts = node.facts();
        let ctx = EvalContext::for_node(env, &node.path, &node.properties, Some(&facts));
        let decision = filter.decide(&ctx);
        if decision == FilterDecision::DROP {
            continue;
        }

        visited.insert(path.clone());
        if parent != start {
            has_child.insert(parent);
        }

        if decision.traverse && config.depth_allows(entry.depth + 1) {
            for edge in env.outgoing_edges(&path, Some(config.relation), config.label.as_deref()) {
                if visited.contains(&edge.to_path) {
                    continue;
                }
                let mut next_path = entry.traversal_path.clone();
                next_path.push(edge.to_path.clone());
                queue.push_back(BfsEntry {
                    edge,
                    depth: entry.depth + 1,
                    traversal_path: next_path,
                });
            }
        }

        if decision.include {
            // Normalized shape: every flattened node reports depth 1 and
            // the segment start as parent.
            let mut result = node.clone().into_result_node(Vec::new());
            result.depth = 1;
            result.parent = Some(start.clone());
            emitted.push((node, result));
        }
    }

    // Queue has drained; nodes that never produced a child are the true
    // leaves and get the continuation.
    let mut out = Vec::with_capacity(emitted.len());
    for (node, mut result) in emitted {
        if !has_child.contains(&node.path) {
            if let Some(handler) = on_leaf {
                let ancestors: HashSet<String> =
                    node.traversal_path.iter().cloned().collect();
                result.children = handler.on_leaf(env, &node, &ancestors);
            }
        }
        out.push(result);
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
