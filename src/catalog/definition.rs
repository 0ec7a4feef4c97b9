//! Raw shapes of workspace configuration entries as they appear on disk.
//!
//! Each entry is deserialized on its own so one malformed entry can be
//! diagnosed and skipped without failing the whole workspace.

use serde::Deserialize;
use serde_json::{Map, Value};

/// A single node type definition file.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct NodeDefinition {
    #[serde(default, alias = "id")]
    pub id: Option<Value>,
    #[serde(default, alias = "title")]
    pub title: Option<String>,
    #[serde(default, alias = "color", alias = "Colour")]
    pub color: Option<String>,
    #[serde(default, alias = "content")]
    pub content: Vec<Value>,
    #[serde(default, alias = "inputs")]
    pub inputs: Vec<Value>,
    #[serde(default, alias = "outputs")]
    pub outputs: Vec<Value>,
    #[serde(default, alias = "schema")]
    pub schema: Map<String, Value>,
}

/// One entry of a definition's `Content` array.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ContentDefinition {
    #[serde(default, alias = "id")]
    pub id: Option<String>,
    #[serde(default, rename = "Type", alias = "type")]
    pub field_type: Option<String>,
    #[serde(default, alias = "options")]
    pub options: Map<String, Value>,
}

/// One entry of a definition's `Inputs` or `Outputs` array.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct PinDefinition {
    #[serde(default, alias = "id")]
    pub id: Option<String>,
    #[serde(default, rename = "Type", alias = "type")]
    pub pin_type: Option<String>,
    #[serde(default, alias = "color")]
    pub color: Option<String>,
    #[serde(default, alias = "label")]
    pub label: Option<String>,
    #[serde(default, alias = "multiple")]
    pub multiple: bool,
    #[serde(default, alias = "isMap")]
    pub is_map: bool,
}

/// An object-valued `Schema` entry: `{"Pin": ..}`, `{"Node": ..}` or both.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct SchemaLinkDefinition {
    #[serde(default, alias = "pin")]
    pub pin: Option<String>,
    #[serde(default, alias = "node")]
    pub node: Option<String>,
}

/// An entry of the workspace `Roots` object.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct RootDefinition {
    #[serde(alias = "rootNodeType")]
    pub root_node_type: String,
    #[serde(default, alias = "menuName")]
    pub menu_name: Option<String>,
}

/// An entry of the workspace `Variants` object.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct VariantDefinitionEntry {
    #[serde(alias = "variantFieldName")]
    pub variant_field_name: String,
    /// Value to template id, in declaration order.
    #[serde(default, alias = "variants")]
    pub variants: Map<String, Value>,
}
