//! Prelude module for convenient imports
//!
//! Re-exports the types most callers need to load a workspace, parse a
//! document, edit the graph and write it back.

// Catalog
pub use crate::catalog::{
    CatalogBuilder, Multiplicity, NodeTemplate, Pin, SchemaConnection, SchemaValue,
    TemplateCatalog, VariantIdentity,
};

// Resolution
pub use crate::resolver::{IdentityCandidate, IdentitySource, VariantResolver};

// Documents and graphs
pub use crate::document::{
    DocumentParser, DocumentSerializer, GraphEdge, GraphNode, NodeData, NodeFactory, NodeKind,
    ParsedGraph, Position,
};

// Live edits
pub use crate::mapper::{
    ApplyOptions, PayloadMap, TemplateSource, apply_schema_edges, collect_payloads_by_id,
    extract_schema_edges,
};

// Error types
pub use crate::error::{CatalogDiagnostic, DocumentError};

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
