//! In-memory note graph.
//!
//! This is the reference implementation of `GraphSource`. It is what the
//! unit and integration suites run against, and it works for embedding the
//! engine in applications that keep their whole graph in memory.
//!
//! ## Limitations
//!
//! - **No persistence**: everything lives in HashMaps.
//! - **Build-then-query**: mutation goes through `&mut self`; once queries
//!   run, the graph is read-only.
//! - **Implied edges are materialized eagerly**: register an implied
//!   inverse with [`MemoryGraph::add_implied_inverse`] *before* adding
//!   edges of the explicit relation.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::model::{
    property_map_from_json, FileMetadata, PropertyMap, RelationEdge, RelationId,
    VisualDirection,
};
use crate::pipeline::Query;

use super::{resolve_relative_date_from, GraphSource};
use crate::expr::RelativeDate;

// ============================================================================
// MemoryGraph
// ============================================================================

struct RelationDef {
    name: String,
    direction: VisualDirection,
    sequential: bool,
}

struct NoteRecord {
    properties: PropertyMap,
    metadata: FileMetadata,
}

/// In-memory `GraphSource` for tests and embedding.
pub struct MemoryGraph {
    relations: Vec<RelationDef>,
    relation_ids: HashMap<String, RelationId>,
    /// explicit relation → its registered implied inverse
    implied_inverse: HashMap<RelationId, RelationId>,
    notes: HashMap<String, NoteRecord>,
    adjacency: HashMap<String, SmallVec<[RelationEdge; 4]>>,
    groups: HashMap<String, Query>,
    /// Fixed clock for deterministic relative dates in tests.
    now: Option<DateTime<Utc>>,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self {
            relations: Vec::new(),
            relation_ids: HashMap::new(),
            implied_inverse: HashMap::new(),
            notes: HashMap::new(),
            adjacency: HashMap::new(),
            groups: HashMap::new(),
            now: None,
        }
    }

    // ------------------------------------------------------------------
    // Relation registry
    // ------------------------------------------------------------------

    /// Register a relation. Direction defaults to `Down`.
    pub fn add_relation(&mut self, name: &str, direction: Option<VisualDirection>) -> RelationId {
        let id = RelationId(self.relations.len() as u32);
        self.relations.push(RelationDef {
            name: name.to_string(),
            direction: direction.unwrap_or(VisualDirection::Down),
            sequential: false,
        });
        self.relation_ids.insert(name.to_string(), id);
        id
    }

    /// Mark a relation eligible for chain-order sorting.
    pub fn set_sequential(&mut self, id: RelationId) {
        if let Some(def) = self.relations.get_mut(id.0 as usize) {
            def.sequential = true;
        }
    }

    /// Register `name` as the automatic inverse of `of`. Subsequent edges
    /// added for `of` also materialize an implied reverse edge.
    pub fn add_implied_inverse(
        &mut self,
        of: RelationId,
        name: &str,
        direction: Option<VisualDirection>,
    ) -> RelationId {
        let inverse = self.add_relation(name, direction);
        self.implied_inverse.insert(of, inverse);
        inverse
    }

    // ------------------------------------------------------------------
    // Notes and edges
    // ------------------------------------------------------------------

    pub fn add_note(&mut self, path: &str, properties: PropertyMap) {
        self.notes.insert(
            path.to_string(),
            NoteRecord { properties, metadata: FileMetadata::for_path(path) },
        );
        self.adjacency.entry(path.to_string()).or_default();
    }

    /// Add a note with frontmatter supplied as JSON; nested objects are
    /// flattened to dotted property keys.
    pub fn add_note_json(&mut self, path: &str, frontmatter: serde_json::Value) {
        self.add_note(path, property_map_from_json(frontmatter));
    }

    pub fn metadata_mut(&mut self, path: &str) -> Option<&mut FileMetadata> {
        self.notes.get_mut(path).map(|n| &mut n.metadata)
    }

    pub fn add_edge(&mut self, from: &str, to: &str, relation: RelationId) {
        self.insert_edge(RelationEdge::explicit(from, to, relation));
    }

    pub fn add_edge_labeled(&mut self, from: &str, to: &str, relation: RelationId, label: &str) {
        self.insert_edge(RelationEdge::explicit(from, to, relation).with_label(label));
    }

    fn insert_edge(&mut self, edge: RelationEdge) {
        if let Some(&inverse) = self.implied_inverse.get(&edge.relation_id) {
            let implied = RelationEdge::implied_inverse(&edge, inverse);
            self.adjacency
                .entry(implied.from_path.clone())
                .or_default()
                .push(implied);
        }
        self.adjacency
            .entry(edge.from_path.clone())
            .or_default()
            .push(edge);
    }

    // ------------------------------------------------------------------
    // Groups and clock
    // ------------------------------------------------------------------

    pub fn add_group(&mut self, name: &str, query: Query) {
        self.groups.insert(name.to_string(), query);
    }

    pub fn set_now(&mut self, now: DateTime<Utc>) {
        self.now = Some(now);
    }
}

// ============================================================================
// GraphSource impl
// ============================================================================

impl GraphSource for MemoryGraph {
    fn outgoing_edges(
        &self,
        path: &str,
        relation: Option<RelationId>,
        label: Option<&str>,
    ) -> Vec<RelationEdge> {
        let Some(edges) = self.adjacency.get(path) else {
            return Vec::new();
        };
        edges
            .iter()
            .filter(|e| relation.map_or(true, |r| e.relation_id == r))
            .filter(|e| label.map_or(true, |l| e.label.as_deref() == Some(l)))
            .cloned()
            .collect()
    }

    fn properties(&self, path: &str) -> PropertyMap {
        self.notes
            .get(path)
            .map(|n| n.properties.clone())
            .unwrap_or_default()
    }

    fn file_metadata(&self, path: &str) -> Option<FileMetadata> {
        self.notes.get(path).map(|n| n.metadata.clone())
    }

    fn resolve_relation_id(&self, name: &str) -> Option<RelationId> {
        self.relation_ids.get(name).copied()
    }

    fn relation_name(&self, id: RelationId) -> String {
        self.relations
            .get(id.0 as usize)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    fn visual_direction(&self, id: RelationId) -> VisualDirection {
        self.relations
            .get(id.0 as usize)
            .map(|d| d.direction)
            .unwrap_or(VisualDirection::Lateral)
    }

    fn sequential_relations(&self) -> HashSet<RelationId> {
        self.relations
            .iter()
            .enumerate()
            .filter(|(_, d)| d.sequential)
            .map(|(i, _)| RelationId(i as u32))
            .collect()
    }

    fn resolve_group_query(&self, name: &str) -> Option<Query> {
        self.groups.get(name).cloned()
    }

    fn resolve_relative_date(&self, kind: RelativeDate) -> DateTime<Utc> {
        resolve_relative_date_from(self.now.unwrap_or_else(Utc::now), kind)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    #[test]
    fn test_edges_filtered_by_relation_and_label() {
        let mut g = MemoryGraph::new();
        let down = g.add_relation("down", None);
        let next = g.add_relation("next", None);
        g.add_note("a.md", PropertyMap::new());
        g.add_note("b.md", PropertyMap::new());
        g.add_note("c.md", PropertyMap::new());
        g.add_edge("a.md", "b.md", down);
        g.add_edge_labeled("a.md", "c.md", down, "archived");
        g.add_edge("a.md", "c.md", next);

        assert_eq!(g.outgoing_edges("a.md", None, None).len(), 3);
        assert_eq!(g.outgoing_edges("a.md", Some(down), None).len(), 2);
        assert_eq!(g.outgoing_edges("a.md", Some(down), Some("archived")).len(), 1);
        assert!(g.outgoing_edges("missing.md", None, None).is_empty());
    }

    #[test]
    fn test_implied_inverse_materialized() {
        let mut g = MemoryGraph::new();
        let down = g.add_relation("down", Some(VisualDirection::Down));
        let up = g.add_implied_inverse(down, "up", Some(VisualDirection::Up));
        g.add_note("parent.md", PropertyMap::new());
        g.add_note("child.md", PropertyMap::new());
        g.add_edge("parent.md", "child.md", down);

        let back = g.outgoing_edges("child.md", Some(up), None);
        assert_eq!(back.len(), 1);
        assert!(back[0].implied);
        assert_eq!(back[0].implied_from_id, Some(down));
        assert_eq!(back[0].to_path, "parent.md");
    }

    #[test]
    fn test_json_frontmatter() {
        let mut g = MemoryGraph::new();
        g.add_note_json("n.md", serde_json::json!({ "priority": 3, "meta": { "tag": "x" } }));
        let props = g.properties("n.md");
        assert_eq!(props.get("priority"), Some(&Value::Number(3.0)));
        assert_eq!(props.get("meta.tag"), Some(&Value::String("x".into())));
    }

    #[test]
    fn test_sequential_registry() {
        let mut g = MemoryGraph::new();
        let next = g.add_relation("next", Some(VisualDirection::Lateral));
        let down = g.add_relation("down", None);
        g.set_sequential(next);

        let seq = g.sequential_relations();
        assert!(seq.contains(&next));
        assert!(!seq.contains(&down));
    }
}
