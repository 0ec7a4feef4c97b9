use super::metadata::{
    CommentMetadata, GroupMetadata, LinkMetadata, MetadataPosition, NodeMetadata, join_endpoint,
};
use super::model::{GraphEdge, GraphNode, INPUT_HANDLE, NodeData, ParsedGraph};
use crate::catalog::TemplateCatalog;
use crate::error::DocumentError;
use crate::keys;
use crate::mapper::{ApplyOptions, AssignedTemplates, PayloadMap, apply_schema_edges};
use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use serde_json::{Map, Value};

/// Writes parsed graphs back into asset documents.
pub struct DocumentSerializer<'c> {
    catalog: &'c TemplateCatalog,
}

impl<'c> DocumentSerializer<'c> {
    pub fn new(catalog: &'c TemplateCatalog) -> Self {
        Self { catalog }
    }

    pub fn serialize_to_string(&self, graph: &ParsedGraph) -> Result<String, DocumentError> {
        let document = self.serialize(graph)?;
        serde_json::to_string_pretty(&document)
            .map_err(|error| DocumentError::MetadataEncodeError(error.to_string()))
    }

    /// Rebuilds the document tree rooted at `graph.root_node_id`.
    ///
    /// Payload nodes not reachable from the root are written under
    /// `$FloatingNodes`. Link nodes collapse back into `$Links`.
    pub fn serialize(&self, graph: &ParsedGraph) -> Result<Value, DocumentError> {
        let root = graph
            .root()
            .ok_or_else(|| DocumentError::MissingRootNode(graph.root_node_id.clone()))?;
        if !root.is_payload() {
            return Err(DocumentError::InvalidRootNode {
                node_id: root.id.clone(),
                kind: root.kind().as_str().to_string(),
            });
        }

        let nodes: AHashMap<&str, &GraphNode> =
            graph.nodes.iter().map(|node| (node.id.as_str(), node)).collect();
        let flattened = flatten_links(graph, &nodes);

        let payloads: PayloadMap = graph
            .nodes
            .iter()
            .filter_map(|node| flat_payload(node).map(|payload| (node.id.clone(), payload)))
            .collect();
        let templates = AssignedTemplates::from_graph(self.catalog, graph);

        let options = ApplyOptions::new()
            .with_map_key_resolver(|target| target.map_key.map(str::to_string))
            .with_target_order(|a, b| {
                a.index
                    .unwrap_or(usize::MAX)
                    .cmp(&b.index.unwrap_or(usize::MAX))
            });
        let mut materialized = apply_schema_edges(&payloads, &flattened.edges, &templates, &options);

        let mut document = materialized
            .remove(&graph.root_node_id)
            .unwrap_or_default();

        let floating: Vec<Value> = floating_roots(graph, &flattened.edges)
            .into_iter()
            .filter_map(|node_id| materialized.remove(node_id))
            .map(Value::Object)
            .collect();

        let metadata = self.metadata(graph, &flattened, floating)?;
        if !metadata.is_empty() {
            document.insert(keys::NODE_EDITOR_METADATA.to_string(), Value::Object(metadata));
        }
        Ok(Value::Object(document))
    }

    fn metadata(
        &self,
        graph: &ParsedGraph,
        flattened: &Flattened,
        floating: Vec<Value>,
    ) -> Result<Map<String, Value>, DocumentError> {
        let mut metadata = Map::new();

        let mut nodes = Map::new();
        for node in graph.nodes.iter().filter(|node| node.is_payload()) {
            let entry = NodeMetadata {
                position: Some(MetadataPosition::from(node.position)),
                title: node.title_override().map(str::to_string),
                extra: node.editor_extra().cloned().unwrap_or_default(),
            };
            nodes.insert(node.id.clone(), encode(&entry)?);
        }
        if !nodes.is_empty() {
            metadata.insert(keys::NODES.to_string(), Value::Object(nodes));
        }

        if !floating.is_empty() {
            metadata.insert(keys::FLOATING_NODES.to_string(), Value::Array(floating));
        }

        let mut links = Map::new();
        for link_id in &flattened.link_order {
            let Some(node) = graph.node(link_id) else {
                continue;
            };
            let NodeData::Link(link) = &node.data else {
                continue;
            };
            let routed = flattened.links.get(link_id.as_str());
            let entry = LinkMetadata {
                position: Some(MetadataPosition::from(node.position)),
                title: link.title.clone(),
                source_endpoint: routed.and_then(|routed| routed.source_endpoint.clone()),
                target_endpoint: link.target_endpoint.clone(),
                input_connections: link.input_connections.clone(),
                output_connections: routed
                    .map(|routed| routed.output_connections.clone())
                    .unwrap_or_default(),
                extra: link.extra.clone(),
            };
            links.insert(link_id.clone(), encode(&entry)?);
        }
        if !links.is_empty() {
            metadata.insert(keys::LINKS.to_string(), Value::Object(links));
        }

        let mut groups = Vec::new();
        let mut comments = Vec::new();
        for node in &graph.nodes {
            match &node.data {
                NodeData::Group(group) => groups.push(encode(&GroupMetadata {
                    node_id: Some(node.id.clone()),
                    position: Some(node.position.into()),
                    width: group.width,
                    height: group.height,
                    name: group.name.clone(),
                    extra: group.extra.clone(),
                })?),
                NodeData::Comment(comment) => comments.push(encode(&CommentMetadata {
                    node_id: Some(node.id.clone()),
                    position: Some(node.position.into()),
                    width: comment.width,
                    height: comment.height,
                    name: comment.name.clone(),
                    text: comment.text.clone(),
                    font_size: comment.font_size,
                    extra: comment.extra.clone(),
                })?),
                _ => {}
            }
        }
        if !groups.is_empty() {
            metadata.insert(keys::GROUPS.to_string(), Value::Array(groups));
        }
        if !comments.is_empty() {
            metadata.insert(keys::COMMENTS.to_string(), Value::Array(comments));
        }

        if let Some(workspace_id) = &graph.workspace_id {
            metadata.insert(
                keys::WORKSPACE_ID.to_string(),
                Value::String(workspace_id.clone()),
            );
        }
        for (key, value) in &graph.extra_metadata {
            metadata.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Ok(metadata)
    }
}

/// Convenience wrapper around [`DocumentSerializer`].
pub fn serialize_document(graph: &ParsedGraph, catalog: &TemplateCatalog) -> Result<Value, DocumentError> {
    DocumentSerializer::new(catalog).serialize(graph)
}

fn encode<T: Serialize>(entry: &T) -> Result<Value, DocumentError> {
    serde_json::to_value(entry).map_err(|error| DocumentError::MetadataEncodeError(error.to_string()))
}

/// The node's own keys, without embedded children.
///
/// Raw nodes are written exactly as they were read, apart from comment edits.
fn flat_payload(node: &GraphNode) -> Option<Map<String, Value>> {
    let mut payload = Map::new();
    match &node.data {
        NodeData::Data(data) => {
            payload.insert(keys::NODE_ID.to_string(), Value::String(node.id.clone()));
            if let Some(comment) = &data.comment {
                payload.insert(keys::COMMENT.to_string(), Value::String(comment.clone()));
            }
            for constant in data.constants.iter().filter(|constant| constant.written) {
                payload.insert(
                    constant.schema_key.clone(),
                    Value::String(constant.value.clone()),
                );
            }
            for field in &data.fields {
                if let (Some(key), Some(value)) = (&field.schema_key, &field.value) {
                    payload.insert(key.clone(), value.clone());
                }
            }
            for (key, value) in &data.unparsed {
                payload.insert(key.clone(), value.clone());
            }
        }
        NodeData::Raw(raw) => {
            payload = raw.content.clone();
            let stored = payload.get(keys::COMMENT).and_then(Value::as_str);
            if stored != raw.comment.as_deref() {
                match &raw.comment {
                    Some(comment) => {
                        payload.insert(keys::COMMENT.to_string(), Value::String(comment.clone()));
                    }
                    None => {
                        payload.shift_remove(keys::COMMENT);
                    }
                }
            }
        }
        _ => return None,
    }
    Some(payload)
}

/// How a link node was wired, rebuilt from the edges around it.
#[derive(Debug, Default)]
struct RoutedLink {
    source_endpoint: Option<String>,
    output_connections: Vec<String>,
}

/// Edges with link nodes removed, plus what `$Links` needs to restore them.
#[derive(Debug, Default)]
struct Flattened {
    edges: Vec<GraphEdge>,
    links: AHashMap<String, RoutedLink>,
    link_order: Vec<String>,
}

fn flatten_links(graph: &ParsedGraph, nodes: &AHashMap<&str, &GraphNode>) -> Flattened {
    let is_link = |id: &str| {
        nodes
            .get(id)
            .is_some_and(|node| matches!(node.data, NodeData::Link(_)))
    };
    let mut flattened = Flattened::default();
    let mut expanded: AHashSet<(&str, &str, &str)> = AHashSet::new();

    for edge in graph.edges.iter().filter(|edge| !is_link(&edge.source)) {
        if !is_link(&edge.target) {
            flattened.edges.push(edge.clone());
            continue;
        }
        if !expanded.insert((
            edge.source.as_str(),
            edge.source_handle.as_str(),
            edge.target.as_str(),
        )) {
            continue;
        }
        let mut path = vec![edge.target.as_str()];
        expand_link(graph, edge, edge, &is_link, &mut path, &mut flattened);
    }

    for node in &graph.nodes {
        if matches!(node.data, NodeData::Link(_)) && !flattened.link_order.contains(&node.id) {
            flattened.link_order.push(node.id.clone());
        }
    }
    flattened
}

/// Follows a link node to its final targets, recording how it was wired.
fn expand_link<'g>(
    graph: &'g ParsedGraph,
    origin: &GraphEdge,
    incoming: &'g GraphEdge,
    is_link: &impl Fn(&str) -> bool,
    path: &mut Vec<&'g str>,
    flattened: &mut Flattened,
) {
    let link_id = incoming.target.as_str();
    if !flattened.link_order.iter().any(|id| id == link_id) {
        flattened.link_order.push(link_id.to_string());
    }
    let routed = flattened.links.entry(link_id.to_string()).or_default();
    if routed.source_endpoint.is_none() {
        routed.source_endpoint = Some(join_endpoint(&incoming.source, &incoming.source_handle));
    }

    let outgoing: Vec<&GraphEdge> = graph
        .edges
        .iter()
        .filter(|edge| edge.source == link_id)
        .collect();
    for edge in outgoing {
        let endpoint = join_endpoint(
            &edge.target,
            edge.target_handle.as_deref().unwrap_or(INPUT_HANDLE),
        );
        if let Some(routed) = flattened.links.get_mut(link_id) {
            if !routed.output_connections.contains(&endpoint) {
                routed.output_connections.push(endpoint);
            }
        }
        if is_link(&edge.target) {
            if path.contains(&edge.target.as_str()) {
                tracing::warn!("Link '{}' routes back into itself", edge.target);
                continue;
            }
            path.push(edge.target.as_str());
            expand_link(graph, origin, edge, is_link, path, flattened);
            path.pop();
            continue;
        }
        flattened.edges.push(GraphEdge {
            id: edge.id.clone(),
            source: origin.source.clone(),
            source_handle: origin.source_handle.clone(),
            target: edge.target.clone(),
            target_handle: edge.target_handle.clone(),
            schema_key: edge.schema_key.clone().or_else(|| origin.schema_key.clone()),
            map_key: edge.map_key.clone().or_else(|| origin.map_key.clone()),
            index: edge.index.or(origin.index),
        });
    }
}

/// Payload nodes the root does not reach, reduced to their topmost ancestors.
fn floating_roots<'g>(graph: &'g ParsedGraph, edges: &[GraphEdge]) -> Vec<&'g str> {
    let mut children: AHashMap<&str, Vec<&str>> = AHashMap::new();
    let mut parents: AHashMap<&str, &str> = AHashMap::new();
    for edge in edges {
        children
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
        parents
            .entry(edge.target.as_str())
            .or_insert(edge.source.as_str());
    }

    let mut covered: AHashSet<&str> = AHashSet::new();
    mark_reachable(&graph.root_node_id, &children, &mut covered);

    let mut roots = Vec::new();
    for node in graph.nodes.iter().filter(|node| node.is_payload()) {
        if covered.contains(node.id.as_str()) {
            continue;
        }
        let mut top = node.id.as_str();
        let mut climbed: AHashSet<&str> = AHashSet::new();
        while let Some(&parent) = parents.get(top) {
            if !climbed.insert(top) || covered.contains(parent) {
                break;
            }
            top = parent;
        }
        let Some(top) = graph.node(top).map(|node| node.id.as_str()) else {
            continue;
        };
        mark_reachable(top, &children, &mut covered);
        roots.push(top);
    }
    roots
}

fn mark_reachable<'a>(
    start: &'a str,
    children: &AHashMap<&'a str, Vec<&'a str>>,
    covered: &mut AHashSet<&'a str>,
) {
    let mut stack = vec![start];
    while let Some(node_id) = stack.pop() {
        if !covered.insert(node_id) {
            continue;
        }
        if let Some(targets) = children.get(node_id) {
            stack.extend(targets.iter().copied());
        }
    }
}
