//! Entries of the `$NodeEditorMetadata` side channel.
//!
//! The side channel stores everything the asset format itself has no room
//! for: node positions and titles, link reroute points, groups, comments and
//! subtrees that are not attached to the root.

use super::model::Position;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetadataPosition {
    #[serde(rename = "$x", default)]
    pub x: f64,
    #[serde(rename = "$y", default)]
    pub y: f64,
}

impl From<MetadataPosition> for Position {
    fn from(position: MetadataPosition) -> Self {
        Position::new(position.x, position.y)
    }
}

impl From<Position> for MetadataPosition {
    fn from(position: Position) -> Self {
        Self {
            x: position.x,
            y: position.y,
        }
    }
}

/// A `$Nodes` entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeMetadata {
    #[serde(rename = "$Position", default, skip_serializing_if = "Option::is_none")]
    pub position: Option<MetadataPosition>,
    #[serde(rename = "$Title", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Keys this crate does not interpret, written back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A `$Links` entry. Endpoints are written `nodeId:pinId`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkMetadata {
    #[serde(rename = "$Position", default, skip_serializing_if = "Option::is_none")]
    pub position: Option<MetadataPosition>,
    #[serde(rename = "$Title", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        rename = "sourceEndpoint",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_endpoint: Option<String>,
    #[serde(
        rename = "targetEndpoint",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub target_endpoint: Option<String>,
    #[serde(
        rename = "inputConnections",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub input_connections: Vec<String>,
    #[serde(rename = "outputConnections", default)]
    pub output_connections: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A `$Groups` entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupMetadata {
    #[serde(rename = "$NodeId", default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(rename = "$Position", default, skip_serializing_if = "Option::is_none")]
    pub position: Option<MetadataPosition>,
    #[serde(rename = "$width", default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(rename = "$height", default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(rename = "$name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A `$Comments` entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommentMetadata {
    #[serde(rename = "$NodeId", default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(rename = "$Position", default, skip_serializing_if = "Option::is_none")]
    pub position: Option<MetadataPosition>,
    #[serde(rename = "$width", default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(rename = "$height", default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(rename = "$name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "$text", default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "$fontSize", default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Splits a `nodeId:pinId` endpoint at its first colon.
pub fn split_endpoint(endpoint: &str) -> Option<(&str, &str)> {
    let (node_id, pin_id) = endpoint.split_once(':')?;
    let node_id = node_id.trim();
    (!node_id.is_empty()).then_some((node_id, pin_id.trim()))
}

pub fn join_endpoint(node_id: &str, pin_id: &str) -> String {
    format!("{node_id}:{pin_id}")
}
