//! Query result DTOs consumed by the rendering layer.

use serde::{Deserialize, Serialize};

use super::{PropertyMap, Value, VisualDirection};

/// Byte span into the original query text, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A collected error or warning. Never aborts execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), span: None }
    }

    pub fn with_span(message: impl Into<String>, span: Span) -> Self {
        Self { message: message.into(), span: Some(span) }
    }
}

/// One node of a query result tree.
///
/// Produced once by the traversal engine; later pipeline stages (WHERE
/// promotion, SORT, DISPLAY) only copy-with-modification, never mutate in
/// place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResultNode {
    pub path: String,
    /// Relation name this node was reached by.
    pub relation: String,
    pub label: Option<String>,
    /// True edge distance from the chain-segment start in tree and partial
    /// flatten modes; always 1 in full flatten.
    pub depth: u32,
    pub implied: bool,
    pub implied_from: Option<String>,
    /// Graph parent in tree and partial flatten modes. In full flatten this
    /// is always the flatten segment's start, not the true graph parent —
    /// do not reconstruct graph structure from it in that mode.
    pub parent: Option<String>,
    /// Every path walked from the segment start to reach this node.
    /// Never repeats a segment (cycle safety).
    pub traversal_path: Vec<String>,
    /// Property snapshot taken at visit time.
    pub properties: PropertyMap,
    /// Ordered display key/value pairs attached by DISPLAY.
    pub display_properties: Vec<(String, Value)>,
    pub visual_direction: VisualDirection,
    /// Set when this node was promoted into the position of a
    /// WHERE-excluded ancestor.
    pub has_filtered_ancestor: bool,
    pub children: Vec<QueryResultNode>,
}

impl QueryResultNode {
    /// Basename used as the final sort tie-break: file name without folder
    /// or extension, case-sensitive.
    pub fn basename(&self) -> &str {
        let name = self.path.rsplit('/').next().unwrap_or(&self.path);
        name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
    }

    /// Pre-order flatten of this subtree, self included.
    pub fn flatten_into<'a>(&'a self, out: &mut Vec<&'a QueryResultNode>) {
        out.push(self);
        for child in &self.children {
            child.flatten_into(out);
        }
    }
}

/// The complete outcome of one query run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    /// False when the WHEN guard rejected the active file; results are
    /// never computed in that case.
    pub visible: bool,
    pub results: Vec<QueryResultNode>,
    pub warnings: Vec<Diagnostic>,
    pub errors: Vec<Diagnostic>,
}

impl QueryOutput {
    pub fn hidden(warnings: Vec<Diagnostic>, errors: Vec<Diagnostic>) -> Self {
        Self { visible: false, results: Vec::new(), warnings, errors }
    }
}
