//! Multi-key result sorting.
//!
//! Keys are ordered `(key, direction)` pairs; a key is either a property
//! expression or the chain marker, which keeps runs of sequentially
//! linked siblings contiguous. Property key values are computed once per
//! node (one fresh context each) before any comparison; ties fall
//! through to the next key and finally to the case-sensitive basename.
//! Sorting recurses into every node's children with the same key list.

use std::cmp::Ordering;

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::env::{EvalContext, QueryEnv, TraversalFacts};
use crate::expr::Expr;
use crate::model::{QueryResultNode, Value};

// ============================================================================
// Keys
// ============================================================================

/// One SORT key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SortKey {
    Property { expr: Expr, descending: bool },
    /// Orders sequentially linked siblings as contiguous runs.
    Chain { descending: bool },
}

impl SortKey {
    pub fn property(expr: Expr) -> Self {
        SortKey::Property { expr, descending: false }
    }

    pub fn property_desc(expr: Expr) -> Self {
        SortKey::Property { expr, descending: true }
    }

    pub fn chain(descending: bool) -> Self {
        SortKey::Chain { descending }
    }
}

// ============================================================================
// Chain structure detection
// ============================================================================

/// Sequential-adjacency structure of one sibling group: maximal chains
/// (head path mapped to the ordered member sequence, head included) and
/// the paths not linked to any sibling.
#[derive(Debug, Clone, Default)]
pub struct ChainStructure {
    chains: HashMap<String, Vec<String>>,
    disconnected: Vec<String>,
}

impl ChainStructure {
    /// Detect chains among `paths` using only edges between those paths
    /// along relations flagged sequential.
    pub fn detect(env: &QueryEnv<'_>, paths: &[String]) -> Self {
        let sequential = env.source().sequential_relations();
        if sequential.is_empty() {
            return Self { chains: HashMap::new(), disconnected: paths.to_vec() };
        }

        let sibling_set: HashSet<&str> = paths.iter().map(String::as_str).collect();
        let mut next: HashMap<&str, String> = HashMap::new();
        let mut has_pred: HashSet<String> = HashSet::new();

        for path in paths {
            for edge in env.outgoing_edges(path, None, None) {
                if sequential.contains(&edge.relation_id)
                    && edge.to_path != *path
                    && sibling_set.contains(edge.to_path.as_str())
                {
                    has_pred.insert(edge.to_path.clone());
                    next.insert(path.as_str(), edge.to_path);
                    break;
                }
            }
        }

        let mut chains = HashMap::new();
        let mut disconnected = Vec::new();
        let mut assigned: HashSet<String> = HashSet::new();

        for path in paths {
            if has_pred.contains(path) {
                continue;
            }
            match next.get(path.as_str()) {
                None => {
                    disconnected.push(path.clone());
                    assigned.insert(path.clone());
                }
                Some(_) => {
                    let mut members = vec![path.clone()];
                    let mut cursor = path.clone();
                    while let Some(succ) = next.get(cursor.as_str()) {
                        if members.contains(succ) {
                            break;
                        }
                        cursor = succ.clone();
                        members.push(cursor.clone());
                    }
                    for member in &members {
                        assigned.insert(member.clone());
                    }
                    chains.insert(path.clone(), members);
                }
            }
        }

        // Siblings forming a pure cycle have no head; treat them as
        // disconnected rather than dropping them.
        for path in paths {
            if !assigned.contains(path) {
                disconnected.push(path.clone());
                assigned.insert(path.clone());
            }
        }

        Self { chains, disconnected }
    }

    pub fn chain_members(&self, head: &str) -> Option<&[String]> {
        self.chains.get(head).map(Vec::as_slice)
    }

    pub fn disconnected(&self) -> &[String] {
        &self.disconnected
    }

    pub fn has_chains(&self) -> bool {
        !self.chains.is_empty()
    }

    /// Head path of the chain containing `path`, if any.
    fn head_of(&self, path: &str) -> Option<&str> {
        self.chains
            .iter()
            .find(|(_, members)| members.iter().any(|m| m == path))
            .map(|(head, _)| head.as_str())
    }
}

// ============================================================================
// Sorting
// ============================================================================

/// Sort a result forest in place, recursing into children.
pub fn sort_forest(env: &QueryEnv<'_>, keys: &[SortKey], nodes: &mut Vec<QueryResultNode>) {
    if keys.is_empty() {
        return;
    }
    sort_siblings(env, keys, nodes);
    for node in nodes.iter_mut() {
        sort_forest(env, keys, &mut node.children);
    }
}

fn sort_siblings(env: &QueryEnv<'_>, keys: &[SortKey], nodes: &mut Vec<QueryResultNode>) {
    if nodes.len() < 2 {
        return;
    }

    let chain_pos = keys.iter().position(|k| matches!(k, SortKey::Chain { .. }));
    match chain_pos {
        None => {
            let props = property_keys(keys);
            sort_plain(env, &props, nodes);
        }
        Some(pos) => {
            let preceding = property_keys(&keys[..pos]);
            let remaining = property_keys(&keys[pos + 1..]);
            let descending = matches!(keys[pos], SortKey::Chain { descending: true });

            if preceding.is_empty() {
                let taken = std::mem::take(nodes);
                *nodes = order_with_chains(env, taken, &remaining, descending);
            } else {
                sort_partitioned(env, &preceding, &remaining, descending, nodes);
            }
        }
    }
}

fn property_keys(keys: &[SortKey]) -> Vec<(&Expr, bool)> {
    keys.iter()
        .filter_map(|k| match k {
            SortKey::Property { expr, descending } => Some((expr, *descending)),
            SortKey::Chain { .. } => None,
        })
        .collect()
}

/// One fresh context per node; every key value computed before any
/// comparison happens.
fn key_values(env: &QueryEnv<'_>, node: &QueryResultNode, props: &[(&Expr, bool)]) -> Vec<Value> {
    let facts = TraversalFacts {
        depth: node.depth,
        relation: node.relation.clone(),
        implied: node.implied,
        implied_from: node.implied_from.clone(),
    };
    let ctx = EvalContext::for_node(env, &node.path, &node.properties, Some(&facts));
    props.iter().map(|(expr, _)| expr.evaluate(&ctx)).collect()
}

fn cmp_keyed(a: &[Value], b: &[Value], props: &[(&Expr, bool)]) -> Ordering {
    for ((x, y), (_, descending)) in a.iter().zip(b).zip(props) {
        let mut ord = x.compare(y);
        if *descending {
            ord = ord.reverse();
        }
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn sort_plain(env: &QueryEnv<'_>, props: &[(&Expr, bool)], nodes: &mut Vec<QueryResultNode>) {
    let mut keyed: Vec<(Vec<Value>, QueryResultNode)> = std::mem::take(nodes)
        .into_iter()
        .map(|n| (key_values(env, &n, props), n))
        .collect();
    keyed.sort_by(|a, b| {
        cmp_keyed(&a.0, &b.0, props).then_with(|| a.1.basename().cmp(b.1.basename()))
    });
    *nodes = keyed.into_iter().map(|(_, n)| n).collect();
}

/// Chain key preceded by property keys: partition by the combined value
/// of the preceding keys, order partitions by that value, then apply
/// chain ordering independently within each partition.
fn sort_partitioned(
    env: &QueryEnv<'_>,
    preceding: &[(&Expr, bool)],
    remaining: &[(&Expr, bool)],
    descending: bool,
    nodes: &mut Vec<QueryResultNode>,
) {
    let mut keyed: Vec<(Vec<Value>, QueryResultNode)> = std::mem::take(nodes)
        .into_iter()
        .map(|n| (key_values(env, &n, preceding), n))
        .collect();
    keyed.sort_by(|a, b| cmp_keyed(&a.0, &b.0, preceding));

    let mut out = Vec::with_capacity(keyed.len());
    let mut iter = keyed.into_iter().peekable();
    while let Some((value, node)) = iter.next() {
        let mut partition = vec![node];
        while let Some((next_value, _)) = iter.peek() {
            if cmp_keyed(&value, next_value, preceding) != Ordering::Equal {
                break;
            }
            partition.push(iter.next().map(|(_, n)| n).unwrap_or_else(|| unreachable!()));
        }
        out.extend(order_with_chains(env, partition, remaining, descending));
    }
    *nodes = out;
}

/// Collapse chains to their heads, order heads and disconnected siblings
/// by the remaining keys, then splice each chain back in as a contiguous
/// run (reversed when the chain key is descending).
fn order_with_chains(
    env: &QueryEnv<'_>,
    nodes: Vec<QueryResultNode>,
    remaining: &[(&Expr, bool)],
    descending: bool,
) -> Vec<QueryResultNode> {
    let paths: Vec<String> = nodes.iter().map(|n| n.path.clone()).collect();
    let structure = ChainStructure::detect(env, &paths);

    // Duplicated sibling paths are possible; keep them in buckets.
    let mut by_path: HashMap<String, Vec<QueryResultNode>> = HashMap::new();
    for node in nodes {
        by_path.entry(node.path.clone()).or_default().push(node);
    }

    // One representative per chain (its head) and per disconnected path.
    let mut reps: Vec<(Vec<Value>, String, Vec<String>)> = Vec::new();
    for path in &paths {
        let expansion = match structure.chain_members(path) {
            Some(members) => {
                let mut members = members.to_vec();
                if descending {
                    members.reverse();
                }
                members
            }
            None => {
                if structure.head_of(path).is_some() {
                    continue; // emitted with its head
                }
                vec![path.clone()]
            }
        };
        let rep_node = by_path.get(path).and_then(|bucket| bucket.first());
        let values = rep_node
            .map(|n| key_values(env, n, remaining))
            .unwrap_or_default();
        reps.push((values, path.clone(), expansion));
    }

    reps.sort_by(|a, b| {
        cmp_keyed(&a.0, &b.0, remaining).then_with(|| basename(&a.1).cmp(basename(&b.1)))
    });

    let mut out = Vec::with_capacity(paths.len());
    for (_, _, expansion) in reps {
        for member in expansion {
            if let Some(bucket) = by_path.get_mut(&member) {
                if !bucket.is_empty() {
                    out.push(bucket.remove(0));
                }
            }
        }
    }
    // Anything left in a bucket (duplicate paths) trails in input order.
    for path in &paths {
        if let Some(bucket) = by_path.get_mut(path) {
            out.append(bucket);
        }
    }
    out
}

fn basename(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{GraphSource, MemoryGraph};
    use crate::model::{PropertyMap, VisualDirection};

    fn node(path: &str, props: serde_json::Value) -> QueryResultNode {
        QueryResultNode {
            path: path.into(),
            relation: "down".into(),
            label: None,
            depth: 1,
            implied: false,
            implied_from: None,
            parent: None,
            traversal_path: vec![path.into()],
            properties: crate::model::property_map_from_json(props),
            display_properties: Vec::new(),
            visual_direction: VisualDirection::Down,
            has_filtered_ancestor: false,
            children: Vec::new(),
        }
    }

    fn paths(nodes: &[QueryResultNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.path.as_str()).collect()
    }

    #[test]
    fn test_property_sort_with_descending_and_tie_break() {
        let g = MemoryGraph::new();
        let env = QueryEnv::new(&g, "root.md");

        let mut nodes = vec![
            node("b.md", serde_json::json!({ "priority": 1 })),
            node("c.md", serde_json::json!({ "priority": 2 })),
            node("a.md", serde_json::json!({ "priority": 1 })),
        ];
        sort_forest(
            &env,
            &[SortKey::property_desc(Expr::property("priority"))],
            &mut nodes,
        );
        // 2 first, then the two 1s by ascending basename.
        assert_eq!(paths(&nodes), vec!["c.md", "a.md", "b.md"]);
    }

    #[test]
    fn test_null_keys_sort_last() {
        let g = MemoryGraph::new();
        let env = QueryEnv::new(&g, "root.md");

        let mut nodes = vec![
            node("x.md", serde_json::json!({})),
            node("y.md", serde_json::json!({ "priority": 3 })),
        ];
        sort_forest(&env, &[SortKey::property(Expr::property("priority"))], &mut nodes);
        assert_eq!(paths(&nodes), vec!["y.md", "x.md"]);
    }

    #[test]
    fn test_sort_recurses_into_children() {
        let g = MemoryGraph::new();
        let env = QueryEnv::new(&g, "root.md");

        let mut parent = node("p.md", serde_json::json!({ "priority": 1 }));
        parent.children = vec![
            node("z.md", serde_json::json!({ "priority": 2 })),
            node("a.md", serde_json::json!({ "priority": 1 })),
        ];
        let mut nodes = vec![parent];
        sort_forest(&env, &[SortKey::property(Expr::property("priority"))], &mut nodes);
        assert_eq!(paths(&nodes[0].children), vec!["a.md", "z.md"]);
    }

    /// a -> b -> c sequential chain plus disconnected d.
    fn sequential_graph() -> MemoryGraph {
        let mut g = MemoryGraph::new();
        let next = g.add_relation("next", None);
        g.set_sequential(next);
        for p in ["a.md", "b.md", "c.md", "d.md"] {
            g.add_note(p, PropertyMap::new());
        }
        g.add_edge("a.md", "b.md", next);
        g.add_edge("b.md", "c.md", next);
        g
    }

    #[test]
    fn test_chain_structure_detection() {
        let g = sequential_graph();
        let env = QueryEnv::new(&g, "a.md");

        let paths: Vec<String> =
            ["a.md", "b.md", "c.md", "d.md"].iter().map(|s| s.to_string()).collect();
        let structure = ChainStructure::detect(&env, &paths);

        assert_eq!(
            structure.chain_members("a.md"),
            Some(&["a.md".to_string(), "b.md".into(), "c.md".into()][..])
        );
        assert_eq!(structure.disconnected(), &["d.md".to_string()]);
    }

    #[test]
    fn test_chain_sort_descending_keeps_run_contiguous() {
        let g = sequential_graph();
        let env = QueryEnv::new(&g, "a.md");

        let mut nodes = vec![
            node("c.md", serde_json::json!({ "priority": 1 })),
            node("a.md", serde_json::json!({ "priority": 1 })),
            node("d.md", serde_json::json!({ "priority": 0 })),
            node("b.md", serde_json::json!({ "priority": 1 })),
        ];
        sort_forest(
            &env,
            &[
                SortKey::chain(true),
                SortKey::property(Expr::property("priority")),
            ],
            &mut nodes,
        );
        // d (priority 0) sorts before the chain head a (priority 1);
        // the chain expands descending as c, b, a.
        assert_eq!(paths(&nodes), vec!["d.md", "c.md", "b.md", "a.md"]);
    }

    #[test]
    fn test_chain_after_property_partitions_first() {
        let mut g = sequential_graph();
        // Second chain inside the other partition: e -> f.
        for p in ["e.md", "f.md"] {
            g.add_note(p, PropertyMap::new());
        }
        let next = g.resolve_relation_id("next").unwrap();
        g.add_edge("e.md", "f.md", next);
        let env = QueryEnv::new(&g, "a.md");

        let mut nodes = vec![
            node("e.md", serde_json::json!({ "group": 2 })),
            node("b.md", serde_json::json!({ "group": 1 })),
            node("f.md", serde_json::json!({ "group": 2 })),
            node("a.md", serde_json::json!({ "group": 1 })),
        ];
        sort_forest(
            &env,
            &[
                SortKey::property(Expr::property("group")),
                SortKey::chain(false),
            ],
            &mut nodes,
        );
        // Partition group=1 holds the a -> b run, group=2 the e -> f run.
        assert_eq!(paths(&nodes), vec!["a.md", "b.md", "e.md", "f.md"]);
    }

    #[test]
    fn test_no_sequential_relations_means_all_disconnected() {
        let mut g = MemoryGraph::new();
        let next = g.add_relation("next", None);
        g.add_note("a.md", PropertyMap::new());
        g.add_note("b.md", PropertyMap::new());
        g.add_edge("a.md", "b.md", next); // not flagged sequential
        let env = QueryEnv::new(&g, "a.md");

        let paths: Vec<String> = vec!["a.md".into(), "b.md".into()];
        let structure = ChainStructure::detect(&env, &paths);
        assert!(!structure.has_chains());
        assert_eq!(structure.disconnected().len(), 2);
    }
}
