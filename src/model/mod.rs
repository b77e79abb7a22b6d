//! # TQL data model
//!
//! Clean DTOs that cross every boundary: storage ↔ evaluation ↔ traversal ↔
//! rendering. This module is pure data — no I/O, no state.

pub mod value;
pub mod edge;
pub mod property_map;
pub mod result;
pub mod file;

pub use value::Value;
pub use edge::{RelationEdge, RelationId, VisualDirection};
pub use property_map::{property_map_from_json, PropertyMap};
pub use result::{Diagnostic, QueryOutput, QueryResultNode, Span};
pub use file::FileMetadata;
