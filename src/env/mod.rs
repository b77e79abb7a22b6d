//! Query environment.
//!
//! `GraphSource` is the contract implemented by the note-storage
//! collaborator; the engine sees the graph only through it. `QueryEnv`
//! bundles one source with per-query diagnostic state — one instance per
//! query, never shared. `EvalContext` is the immutable per-node bundle
//! handed to expression evaluation, built fresh for every visited node.

pub mod memory;

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use parking_lot::Mutex;

use crate::expr::{DurationUnit, RelativeDate};
use crate::model::{
    Diagnostic, FileMetadata, PropertyMap, RelationEdge, RelationId, Span, Value,
    VisualDirection,
};
use crate::pipeline::Query;

pub use memory::MemoryGraph;

// ============================================================================
// GraphSource
// ============================================================================

/// Read-only access to the note graph. Synchronous and already
/// materialized — the engine never performs I/O.
pub trait GraphSource {
    /// Outgoing edges of `path`, optionally restricted to one relation
    /// and/or one edge label.
    fn outgoing_edges(
        &self,
        path: &str,
        relation: Option<RelationId>,
        label: Option<&str>,
    ) -> Vec<RelationEdge>;

    /// Property bag of a note. Unknown paths yield an empty bag.
    fn properties(&self, path: &str) -> PropertyMap;

    /// File metadata backing `$file.*`, if the path resolves to a file.
    fn file_metadata(&self, path: &str) -> Option<FileMetadata>;

    fn resolve_relation_id(&self, name: &str) -> Option<RelationId>;

    fn relation_name(&self, id: RelationId) -> String;

    fn visual_direction(&self, id: RelationId) -> VisualDirection;

    /// Relations eligible for chain-order sorting.
    fn sequential_relations(&self) -> HashSet<RelationId>;

    /// Look up a named, reusable query definition.
    fn resolve_group_query(&self, name: &str) -> Option<Query>;

    /// Milliseconds in `amount` units. Months and years use calendar
    /// approximations (30 / 365 days).
    fn duration_to_ms(&self, amount: f64, unit: DurationUnit) -> f64 {
        amount * unit.approx_ms()
    }

    /// Resolve a relative date keyword. Weeks start on Monday.
    fn resolve_relative_date(&self, kind: RelativeDate) -> DateTime<Utc> {
        resolve_relative_date_from(Utc::now(), kind)
    }
}

/// Shared implementation for [`GraphSource::resolve_relative_date`], split
/// out so sources with a fixed clock can reuse it.
pub fn resolve_relative_date_from(now: DateTime<Utc>, kind: RelativeDate) -> DateTime<Utc> {
    let midnight = Utc
        .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .single()
        .unwrap_or(now);
    match kind {
        RelativeDate::Today => midnight,
        RelativeDate::Yesterday => midnight - Duration::days(1),
        RelativeDate::Tomorrow => midnight + Duration::days(1),
        RelativeDate::StartOfWeek => {
            midnight - Duration::days(now.weekday().num_days_from_monday() as i64)
        }
        RelativeDate::EndOfWeek => {
            midnight + Duration::days(6 - now.weekday().num_days_from_monday() as i64)
        }
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Per-query error/warning accumulation.
///
/// Appending happens through `&self` (evaluation only ever holds shared
/// references to the environment), so the vectors sit behind a mutex.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Mutex<Vec<Diagnostic>>,
    warnings: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&self, message: impl Into<String>, span: Option<Span>) {
        self.errors.lock().push(Diagnostic { message: message.into(), span });
    }

    pub fn add_warning(&self, message: impl Into<String>) {
        self.warnings.lock().push(Diagnostic::new(message));
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        self.errors.lock().clone()
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.warnings.lock().clone()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.lock().is_empty()
    }
}

// ============================================================================
// QueryEnv
// ============================================================================

/// Everything one query run needs: graph access, the active file, and the
/// shared diagnostic sink. Safe to run independent queries concurrently
/// only if each gets its own instance.
pub struct QueryEnv<'a> {
    source: &'a dyn GraphSource,
    active_path: String,
    active_properties: PropertyMap,
    pub diagnostics: Diagnostics,
}

impl<'a> QueryEnv<'a> {
    pub fn new(source: &'a dyn GraphSource, active_path: impl Into<String>) -> Self {
        let active_path = active_path.into();
        let active_properties = source.properties(&active_path);
        Self {
            source,
            active_path,
            active_properties,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn source(&self) -> &dyn GraphSource {
        self.source
    }

    pub fn active_path(&self) -> &str {
        &self.active_path
    }

    pub fn active_properties(&self) -> &PropertyMap {
        &self.active_properties
    }

    pub fn add_error(&self, message: impl Into<String>, span: Option<Span>) {
        self.diagnostics.add_error(message, span);
    }

    pub fn add_warning(&self, message: impl Into<String>) {
        self.diagnostics.add_warning(message);
    }

    // ------------------------------------------------------------------
    // GraphSource pass-throughs used throughout the engine
    // ------------------------------------------------------------------

    pub fn outgoing_edges(
        &self,
        path: &str,
        relation: Option<RelationId>,
        label: Option<&str>,
    ) -> Vec<RelationEdge> {
        self.source.outgoing_edges(path, relation, label)
    }

    pub fn properties(&self, path: &str) -> PropertyMap {
        self.source.properties(path)
    }

    pub fn relation_name(&self, id: RelationId) -> String {
        self.source.relation_name(id)
    }
}

// ============================================================================
// EvalContext
// ============================================================================

/// Traversal-position facts backing `$traversal.*`. Absent when an
/// expression is evaluated outside a traversal (e.g. the WHEN guard).
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalFacts {
    pub depth: u32,
    pub relation: String,
    pub implied: bool,
    pub implied_from: Option<String>,
}

/// Immutable per-node evaluation context.
///
/// Built fresh for every node an expression is evaluated against. Never
/// reuse one context across nodes — the engine deliberately has no
/// "set current file, then evaluate" mutation anywhere.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub env: &'a QueryEnv<'a>,
    pub path: &'a str,
    pub properties: &'a PropertyMap,
    pub traversal: Option<&'a TraversalFacts>,
}

impl<'a> EvalContext<'a> {
    /// Context for the environment's active file (WHEN guard evaluation).
    pub fn active_file(env: &'a QueryEnv<'a>) -> Self {
        Self {
            env,
            path: env.active_path(),
            properties: env.active_properties(),
            traversal: None,
        }
    }

    /// Context for an arbitrary node with its property snapshot.
    pub fn for_node(
        env: &'a QueryEnv<'a>,
        path: &'a str,
        properties: &'a PropertyMap,
        traversal: Option<&'a TraversalFacts>,
    ) -> Self {
        Self { env, path, properties, traversal }
    }

    /// Dotted-segment property lookup. Nested frontmatter is stored flat
    /// with dotted keys, so segment traversal and literal flat-key lookup
    /// resolve through the same map; a miss yields null.
    pub fn property(&self, segments: &[String]) -> Value {
        let key = segments.join(".");
        self.properties.get(&key).cloned().unwrap_or(Value::Null)
    }

    pub fn file_metadata(&self) -> Option<FileMetadata> {
        self.env.source().file_metadata(self.path)
    }
}

// ============================================================================
// Tests
// ============================================================================
