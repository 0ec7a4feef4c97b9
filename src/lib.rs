//! # Kumiki - Schema-Driven Document ⇄ Node Graph Synchronization
//!
//! **Kumiki** edits structured game-asset documents (typed JSON trees describing
//! behavior graphs) through a node-graph view and writes every edit back into
//! the document's original shape. All of it is driven by a workspace's node
//! definitions: nothing about a particular asset format is hard-coded.
//!
//! ## Core Workflow
//!
//! 1.  **Build a Catalog**: Feed the workspace configuration (`_Workspace.json`) and
//!     one definition object per node type to [`catalog::CatalogBuilder`]. Malformed
//!     entries become diagnostics on the catalog instead of errors.
//! 2.  **Parse**: [`document::DocumentParser`] walks a document into a flat list of
//!     [`document::GraphNode`]s and [`document::GraphEdge`]s, resolving each polymorphic
//!     payload to its template through the [`resolver::VariantResolver`].
//! 3.  **Edit**: Change field values, add nodes with [`document::NodeFactory`], or rewire
//!     embedded children directly on payloads with the [`mapper`] without a reparse.
//! 4.  **Serialize**: [`document::DocumentSerializer`] rebuilds the JSON tree and the
//!     `$NodeEditorMetadata` side channel.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kumiki::prelude::*;
//! use serde_json::json;
//!
//! fn main() -> Result<()> {
//!     let catalog = TemplateCatalog::builder(json!({
//!         "WorkspaceName": "Density",
//!         "Roots": {"Density": {"RootNodeType": "Density", "MenuName": "Density"}}
//!     }))
//!     .with_definition("Density.json", json!({
//!         "Id": "Density",
//!         "Title": "Density",
//!         "Content": [{"Id": "Value", "Type": "Float", "Options": {"Default": 1.0}}],
//!         "Inputs": [{"Id": "input", "Type": "Flow"}],
//!         "Outputs": [{"Id": "next", "Type": "Flow"}],
//!         "Schema": {"Value": "Value", "Next": {"Pin": "next"}}
//!     }))
//!     .build();
//!
//!     let document = json!({
//!         "$NodeId": "Density-1",
//!         "Value": 0.25,
//!         "Next": {"$NodeId": "Density-2"}
//!     });
//!
//!     let graph = DocumentParser::new(&catalog).parse(&document, Some("Density"))?;
//!     println!("{} nodes, {} edges", graph.nodes.len(), graph.edges.len());
//!
//!     let written = DocumentSerializer::new(&catalog).serialize(&graph)?;
//!     assert_eq!(written["Next"]["$NodeId"], "Density-2");
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod document;
pub mod error;
pub mod keys;
pub mod mapper;
pub mod prelude;
pub mod resolver;
