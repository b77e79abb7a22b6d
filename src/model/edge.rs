//! Relation edges — the typed, directed links between notes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a relation type, assigned by the storage collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationId(pub u32);

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rel({})", self.0)
    }
}

/// How a relation is rendered relative to the current note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisualDirection {
    Up,
    Down,
    Lateral,
}

/// One directed edge, supplied per traversal step by the environment.
///
/// An *implied* edge is derived rather than authored — typically the
/// automatic inverse of another relation; `implied_from_id` names the
/// relation it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub from_path: String,
    pub to_path: String,
    pub relation_id: RelationId,
    pub label: Option<String>,
    pub implied: bool,
    pub implied_from_id: Option<RelationId>,
}

impl RelationEdge {
    /// An explicit (authored) edge.
    pub fn explicit(from: impl Into<String>, to: impl Into<String>, relation_id: RelationId) -> Self {
        Self {
            from_path: from.into(),
            to_path: to.into(),
            relation_id,
            label: None,
            implied: false,
            implied_from_id: None,
        }
    }

    /// The derived inverse of an explicit edge.
    pub fn implied_inverse(explicit: &RelationEdge, inverse_id: RelationId) -> Self {
        Self {
            from_path: explicit.to_path.clone(),
            to_path: explicit.from_path.clone(),
            relation_id: inverse_id,
            label: explicit.label.clone(),
            implied: true,
            implied_from_id: Some(explicit.relation_id),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
