use crate::catalog::{FieldKind, Pin, SchemaConnection, SchemaConstant};
use crate::error::CatalogDiagnostic;
use crate::keys;
use serde::Serialize;
use serde_json::{Map, Value};

/// Target handle every link node receives its incoming edge on.
pub const INPUT_HANDLE: &str = "input";
/// Source handle of a link node's outgoing edges.
pub const LINK_OUTPUT_HANDLE: &str = "output";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Data,
    Raw,
    Link,
    Group,
    Comment,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Data => "data",
            NodeKind::Raw => "raw",
            NodeKind::Link => "link",
            NodeKind::Group => "group",
            NodeKind::Comment => "comment",
        }
    }
}

/// A content field of a data node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValue {
    pub field_id: String,
    /// Document key the field is stored under. Unmapped fields are editor-only.
    pub schema_key: Option<String>,
    pub kind: FieldKind,
    pub default: Value,
    /// `None` until the document or the user provides a value.
    pub value: Option<Value>,
}

impl FieldValue {
    /// The stored value, else the field's default.
    pub fn effective(&self) -> &Value {
        self.value.as_ref().unwrap_or(&self.default)
    }
}

/// A schema constant of a data node and whether the document carries it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeConstant {
    pub schema_key: String,
    pub value: String,
    pub written: bool,
}

impl NodeConstant {
    pub(crate) fn from_schema(constant: &SchemaConstant, written: bool) -> Self {
        Self {
            schema_key: constant.schema_key.clone(),
            value: constant.value.clone(),
            written,
        }
    }
}

/// A node governed by a template.
///
/// Everything the template declares is copied in, so a node stays readable
/// even if it outlives the catalog it was parsed with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataNode {
    pub template_id: String,
    pub label: String,
    pub color: Option<String>,
    pub fields: Vec<FieldValue>,
    pub input_pins: Vec<Pin>,
    pub output_pins: Vec<Pin>,
    pub connections: Vec<SchemaConnection>,
    pub constants: Vec<NodeConstant>,
    /// Payload keys no field, pin or constant consumed, kept verbatim.
    pub unparsed: Map<String, Value>,
    pub title_override: Option<String>,
    pub comment: Option<String>,
    /// Unknown keys of the node's `$Nodes` entry.
    pub editor_extra: Map<String, Value>,
}

impl DataNode {
    pub fn field(&self, field_id: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|field| field.field_id == field_id)
    }

    pub fn field_mut(&mut self, field_id: &str) -> Option<&mut FieldValue> {
        self.fields.iter_mut().find(|field| field.field_id == field_id)
    }

    pub fn connection_for_pin(&self, pin_id: &str) -> Option<&SchemaConnection> {
        self.connections
            .iter()
            .find(|connection| connection.output_pin_id == pin_id)
    }
}

/// A payload no template governs, kept as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawNode {
    /// The payload exactly as the document holds it, `$NodeId` included.
    ///
    /// Embedded children are the exception: they are parsed into nodes of
    /// their own only when a template governs the parent, so a raw node keeps
    /// its whole subtree here.
    pub content: Map<String, Value>,
    pub title_override: Option<String>,
    /// Mirrors a string `$Comment` in `content`. Edits are written back in place.
    pub comment: Option<String>,
    /// Unknown keys of the node's `$Nodes` entry.
    pub editor_extra: Map<String, Value>,
}

/// A reroute point spliced between a source pin and its targets.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LinkNode {
    pub title: Option<String>,
    pub target_endpoint: Option<String>,
    pub input_connections: Vec<String>,
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GroupNode {
    pub name: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CommentNode {
    pub name: Option<String>,
    pub text: Option<String>,
    pub font_size: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeData {
    Data(Box<DataNode>),
    Raw(RawNode),
    Link(LinkNode),
    Group(GroupNode),
    Comment(CommentNode),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub position: Position,
    pub data: NodeData,
}

impl GraphNode {
    pub fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::Data(_) => NodeKind::Data,
            NodeData::Raw(_) => NodeKind::Raw,
            NodeData::Link(_) => NodeKind::Link,
            NodeData::Group(_) => NodeKind::Group,
            NodeData::Comment(_) => NodeKind::Comment,
        }
    }

    /// Data and raw nodes are written into the document tree.
    pub fn is_payload(&self) -> bool {
        matches!(self.data, NodeData::Data(_) | NodeData::Raw(_))
    }

    pub fn as_data(&self) -> Option<&DataNode> {
        match &self.data {
            NodeData::Data(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_data_mut(&mut self) -> Option<&mut DataNode> {
        match &mut self.data {
            NodeData::Data(data) => Some(data),
            _ => None,
        }
    }

    pub fn title_override(&self) -> Option<&str> {
        match &self.data {
            NodeData::Data(data) => data.title_override.as_deref(),
            NodeData::Raw(raw) => raw.title_override.as_deref(),
            _ => None,
        }
    }

    pub fn raw(id: impl Into<String>, content: Map<String, Value>) -> Self {
        let comment = content
            .get(keys::COMMENT)
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            id: id.into(),
            position: Position::default(),
            data: NodeData::Raw(RawNode {
                content,
                title_override: None,
                comment,
                editor_extra: Map::new(),
            }),
        }
    }

    /// Unknown keys of the node's `$Nodes` entry.
    pub fn editor_extra(&self) -> Option<&Map<String, Value>> {
        match &self.data {
            NodeData::Data(data) => Some(&data.editor_extra),
            NodeData::Raw(raw) => Some(&raw.editor_extra),
            _ => None,
        }
    }

    pub fn link(id: impl Into<String>, position: Position) -> Self {
        Self {
            id: id.into(),
            position,
            data: NodeData::Link(LinkNode::default()),
        }
    }

    pub fn group(id: impl Into<String>, position: Position, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            position,
            data: NodeData::Group(GroupNode {
                name,
                ..GroupNode::default()
            }),
        }
    }

    pub fn comment(id: impl Into<String>, position: Position, text: Option<String>) -> Self {
        Self {
            id: id.into(),
            position,
            data: NodeData::Comment(CommentNode {
                text,
                ..CommentNode::default()
            }),
        }
    }
}

/// A connection from an output pin (or a link's output) to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub source_handle: String,
    pub target: String,
    pub target_handle: Option<String>,
    /// Runtime schema key the edge was read from, when known.
    pub schema_key: Option<String>,
    /// Key of the child inside a map-valued connection.
    pub map_key: Option<String>,
    /// Position of the child inside an array-valued connection.
    pub index: Option<usize>,
}

/// The flat graph a document parses into.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub root_node_id: String,
    pub workspace_id: Option<String>,
    /// `$NodeEditorMetadata` keys the parser does not understand, kept verbatim.
    pub extra_metadata: Map<String, Value>,
    pub diagnostics: Vec<CatalogDiagnostic>,
}

impl ParsedGraph {
    pub fn node(&self, node_id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == node_id)
    }

    pub fn node_mut(&mut self, node_id: &str) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|node| node.id == node_id)
    }

    pub fn root(&self) -> Option<&GraphNode> {
        self.node(&self.root_node_id)
    }

    pub fn edges_from<'a>(
        &'a self,
        source: &'a str,
        source_handle: &'a str,
    ) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges
            .iter()
            .filter(move |edge| edge.source == source && edge.source_handle == source_handle)
    }

    pub fn edges_into<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |edge| edge.target == target)
    }

    /// Removes a node and every edge touching it.
    pub fn remove_node(&mut self, node_id: &str) -> Option<GraphNode> {
        let position = self.nodes.iter().position(|node| node.id == node_id)?;
        self.edges
            .retain(|edge| edge.source != node_id && edge.target != node_id);
        Some(self.nodes.remove(position))
    }
}
