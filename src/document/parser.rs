use super::factory::shape_from_template;
use super::ids::{EdgeIdAllocator, NodeIdAllocator};
use super::metadata::{
    CommentMetadata, GroupMetadata, LinkMetadata, MetadataPosition, NodeMetadata, split_endpoint,
};
use super::model::{
    CommentNode, GraphEdge, GraphNode, GroupNode, INPUT_HANDLE, LINK_OUTPUT_HANDLE, LinkNode,
    NodeConstant, NodeData, ParsedGraph, Position,
};
use crate::catalog::{Multiplicity, NodeTemplate, Pin, SchemaConnection, TemplateCatalog};
use crate::error::{CatalogDiagnostic, DocumentError};
use crate::keys::{self, json_type_name, non_empty, non_empty_str};
use crate::mapper::{choose_compatible_input_handle, holds_children};
use crate::mapper::payload::collect_node_ids;
use crate::resolver::VariantResolver;
use ahash::{AHashMap, AHashSet};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Id prefix of nodes no template governs.
pub const GENERIC_PREFIX: &str = "Generic";

const METADATA_SECTIONS: [&str; 6] = [
    keys::NODES,
    keys::FLOATING_NODES,
    keys::LINKS,
    keys::GROUPS,
    keys::COMMENTS,
    keys::WORKSPACE_ID,
];

/// Walks asset documents into flat graphs.
pub struct DocumentParser<'c> {
    catalog: &'c TemplateCatalog,
    resolver: VariantResolver<'c>,
}

impl<'c> DocumentParser<'c> {
    pub fn new(catalog: &'c TemplateCatalog) -> Self {
        Self {
            catalog,
            resolver: VariantResolver::new(catalog),
        }
    }

    pub fn parse_str(&self, text: &str, selector: Option<&str>) -> Result<ParsedGraph, DocumentError> {
        let root: Value = serde_json::from_str(text)
            .map_err(|error| DocumentError::JsonParseError(error.to_string()))?;
        self.parse(&root, selector)
    }

    /// Parses a document. `selector` names the root's template or variant.
    pub fn parse(&self, root: &Value, selector: Option<&str>) -> Result<ParsedGraph, DocumentError> {
        let Value::Object(root_payload) = root else {
            return Err(DocumentError::RootNotObject {
                found: json_type_name(root),
            });
        };

        let mut taken = AHashSet::new();
        collect_node_ids(root, &mut taken);
        if let Some(Value::Object(metadata)) = root_payload.get(keys::NODE_EDITOR_METADATA) {
            for section in metadata.values() {
                collect_node_ids(section, &mut taken);
            }
            if let Some(Value::Object(links)) = metadata.get(keys::LINKS) {
                taken.extend(links.keys().cloned());
            }
        }

        let mut session = ParseSession {
            catalog: self.catalog,
            resolver: &self.resolver,
            nodes: Vec::new(),
            node_index: AHashMap::new(),
            edges: Vec::new(),
            node_ids: NodeIdAllocator::new(taken),
            edge_ids: EdgeIdAllocator::default(),
            ancestors: Vec::new(),
            first_payloads: AHashMap::new(),
            diagnostics: Vec::new(),
        };
        let root_node_id = session.parse_payload(root_payload, selector, "root", true);
        let (workspace_id, extra_metadata) = session.apply_metadata(root_payload);

        Ok(ParsedGraph {
            nodes: session.nodes,
            edges: session.edges,
            root_node_id,
            workspace_id,
            extra_metadata,
            diagnostics: session.diagnostics,
        })
    }
}

/// Convenience wrapper around [`DocumentParser`].
pub fn parse_document(
    root: &Value,
    selector: Option<&str>,
    catalog: &TemplateCatalog,
) -> Result<ParsedGraph, DocumentError> {
    DocumentParser::new(catalog).parse(root, selector)
}

/// A child payload found under a connection key.
struct ChildSlot<'v> {
    payload: &'v Map<String, Value>,
    map_key: Option<String>,
    index: Option<usize>,
}

/// Reads the children stored under a connection key, or `None` when the value
/// does not have the shape the pin's multiplicity expects.
fn child_slots(value: &Value, multiplicity: Multiplicity) -> Option<Vec<ChildSlot<'_>>> {
    if !holds_children(value, multiplicity) {
        return None;
    }
    let slots = match multiplicity {
        Multiplicity::Single => value
            .as_object()
            .map(|payload| ChildSlot {
                payload,
                map_key: None,
                index: None,
            })
            .into_iter()
            .collect(),
        Multiplicity::Multiple => value
            .as_array()
            .into_iter()
            .flatten()
            .enumerate()
            .filter_map(|(index, item)| {
                item.as_object().map(|payload| ChildSlot {
                    payload,
                    map_key: None,
                    index: Some(index),
                })
            })
            .collect(),
        Multiplicity::Map => value
            .as_object()
            .into_iter()
            .flatten()
            .filter_map(|(key, item)| {
                item.as_object().map(|payload| ChildSlot {
                    payload,
                    map_key: Some(key.clone()),
                    index: None,
                })
            })
            .collect(),
    };
    Some(slots)
}

fn read_metadata_entry<T: DeserializeOwned>(
    section: &'static str,
    value: &Value,
    diagnostics: &mut Vec<CatalogDiagnostic>,
) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(entry) => Some(entry),
        Err(error) => {
            diagnostics.push(CatalogDiagnostic::MalformedMetadata {
                section,
                message: error.to_string(),
            });
            None
        }
    }
}

struct ParseSession<'v, 'p, 'c> {
    catalog: &'c TemplateCatalog,
    resolver: &'p VariantResolver<'c>,
    nodes: Vec<GraphNode>,
    node_index: AHashMap<String, usize>,
    edges: Vec<GraphEdge>,
    node_ids: NodeIdAllocator,
    edge_ids: EdgeIdAllocator,
    /// Ids on the path from the root to the payload being parsed.
    ancestors: Vec<String>,
    /// The first payload seen under each persisted id.
    first_payloads: AHashMap<&'v str, &'v Map<String, Value>>,
    diagnostics: Vec<CatalogDiagnostic>,
}

impl<'v, 'c> ParseSession<'v, '_, 'c> {
    /// Parses one payload and its embedded children, returning the node id.
    fn parse_payload(
        &mut self,
        payload: &'v Map<String, Value>,
        selector: Option<&str>,
        path: &str,
        is_root: bool,
    ) -> String {
        let persisted = payload.get(keys::NODE_ID).and_then(non_empty_str);
        let mut conflicting = None;

        if let Some(id) = persisted {
            if self.ancestors.iter().any(|ancestor| ancestor == id) {
                tracing::warn!("Node '{}' repeats an ancestor id; keeping it as raw JSON", id);
                self.diagnostics
                    .push(CatalogDiagnostic::CyclicReference(id.to_string()));
                let minted = self.node_ids.mint(GENERIC_PREFIX, path);
                let mut node = GraphNode::raw(minted.clone(), payload.clone());
                node.position = legacy_position(payload).unwrap_or_default();
                self.insert_node(node);
                return minted;
            }
            if let Some(&first) = self.first_payloads.get(id) {
                if first == payload {
                    tracing::debug!("Node '{}' is embedded more than once; sharing it", id);
                    return id.to_string();
                }
                conflicting = Some(id);
            }
        }

        let template = self.resolve_template(payload, selector, persisted);
        let id = match (persisted.filter(|_| conflicting.is_none()), template) {
            (Some(id), _) => id.to_string(),
            (None, Some(template)) => self.node_ids.mint(&template.template_id, path),
            (None, None) => self.node_ids.mint(GENERIC_PREFIX, path),
        };
        match (conflicting, persisted) {
            (Some(original), _) => {
                tracing::warn!(
                    "Node id '{}' is reused by a different payload; parsing the repeat as '{}'",
                    original,
                    id
                );
                self.diagnostics.push(CatalogDiagnostic::ConflictingNodeId {
                    node_id: original.to_string(),
                    renamed: id.clone(),
                });
            }
            (None, Some(persisted)) => {
                self.first_payloads.insert(persisted, payload);
            }
            (None, None) => {}
        }

        match template {
            Some(template) => self.parse_data_node(template, payload, id, path, is_root),
            None => {
                tracing::debug!("No template governs the payload at '{}'; keeping it raw", path);
                let mut content = payload.clone();
                if is_root {
                    content.shift_remove(keys::NODE_EDITOR_METADATA);
                    content.shift_remove(keys::GROUPS);
                }
                let mut node = GraphNode::raw(id.clone(), content);
                node.position = legacy_position(payload).unwrap_or_default();
                self.insert_node(node);
                id
            }
        }
    }

    /// Variant lookup, then full inference for variant selectors, then the
    /// selector as a template id, then inference from the payload and its id.
    fn resolve_template(
        &self,
        payload: &Map<String, Value>,
        selector: Option<&str>,
        persisted: Option<&str>,
    ) -> Option<&'c NodeTemplate> {
        if let Some(selector) = selector.and_then(non_empty) {
            if let Some(variant) = self.catalog.variant(selector) {
                let by_variant = payload
                    .get(&variant.field_name)
                    .and_then(non_empty_str)
                    .and_then(|value| variant.template_for(value))
                    .and_then(|template_id| self.catalog.template(template_id));
                if by_variant.is_some() {
                    return by_variant;
                }
                return self.infer_template(payload, persisted);
            }
            if let Some(template) = self.catalog.template(selector) {
                return Some(template);
            }
        }
        self.infer_template(payload, persisted)
    }

    fn infer_template(
        &self,
        payload: &Map<String, Value>,
        persisted: Option<&str>,
    ) -> Option<&'c NodeTemplate> {
        self.resolver.resolve(payload, persisted).template
    }

    fn parse_data_node(
        &mut self,
        template: &'c NodeTemplate,
        payload: &'v Map<String, Value>,
        id: String,
        path: &str,
        is_root: bool,
    ) -> String {
        let mut data = shape_from_template(template);
        let mut consumed: AHashSet<&str> = AHashSet::new();
        consumed.insert(keys::NODE_ID);
        if is_root {
            consumed.insert(keys::NODE_EDITOR_METADATA);
            consumed.insert(keys::GROUPS);
        }
        if let Some(comment) = payload.get(keys::COMMENT).and_then(Value::as_str) {
            data.comment = Some(comment.to_string());
            consumed.insert(keys::COMMENT);
        }

        self.ancestors.push(id.clone());
        for pin in &template.output_pins {
            for connection in template.connections_for_pin(&pin.id) {
                let key = connection.schema_key.as_str();
                if consumed.contains(key) {
                    continue;
                }
                let Some(slots) = payload
                    .get(key)
                    .and_then(|value| child_slots(value, connection.multiplicity))
                else {
                    continue;
                };
                consumed.insert(key);
                for slot in slots {
                    let child_path = match (&slot.map_key, slot.index) {
                        (Some(map_key), _) => format!("{path}/{key}/{map_key}"),
                        (None, Some(index)) => format!("{path}/{key}/{index}"),
                        (None, None) => format!("{path}/{key}"),
                    };
                    let child_id = self.parse_payload(
                        slot.payload,
                        connection.node_selector.as_deref(),
                        &child_path,
                        false,
                    );
                    self.push_edge(&id, pin, connection, &child_id, slot.map_key, slot.index);
                }
            }
        }
        self.ancestors.pop();

        for field in data.fields.iter_mut() {
            let Some(key) = field.schema_key.as_deref() else {
                continue;
            };
            if consumed.contains(key) {
                continue;
            }
            if let Some(value) = payload.get(key) {
                field.value = Some(value.clone());
                if let Some((stored_key, _)) = payload.get_key_value(key) {
                    consumed.insert(stored_key.as_str());
                }
            }
        }

        for constant in data.constants.iter_mut() {
            match payload.get_key_value(constant.schema_key.as_str()) {
                Some((stored_key, Value::String(value))) if *value == constant.value => {
                    constant.written = true;
                    consumed.insert(stored_key.as_str());
                }
                Some((_, found)) => {
                    tracing::warn!(
                        "Constant '{}' on node '{}' expected '{}' but found {}",
                        constant.schema_key,
                        id,
                        constant.value,
                        found
                    );
                    self.diagnostics.push(mismatch(&id, constant, found));
                }
                None => {}
            }
        }

        data.unparsed = payload
            .iter()
            .filter(|(key, _)| !consumed.contains(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        self.insert_node(GraphNode {
            id: id.clone(),
            position: legacy_position(payload).unwrap_or_default(),
            data: NodeData::Data(Box::new(data)),
        });
        id
    }

    fn push_edge(
        &mut self,
        source: &str,
        pin: &Pin,
        connection: &SchemaConnection,
        target: &str,
        map_key: Option<String>,
        index: Option<usize>,
    ) {
        let target_handle = self
            .node(target)
            .and_then(|node| node.as_data())
            .and_then(|data| {
                choose_compatible_input_handle(connection.pin_type.as_deref(), &data.input_pins)
            });
        let id = self.edge_ids.unique(format!("{source}:{}-{target}", pin.id));
        self.edges.push(GraphEdge {
            id,
            source: source.to_string(),
            source_handle: pin.id.clone(),
            target: target.to_string(),
            target_handle,
            schema_key: Some(connection.schema_key.clone()),
            map_key,
            index,
        });
    }

    fn insert_node(&mut self, node: GraphNode) {
        self.node_ids.reserve(&node.id);
        self.node_index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
    }

    fn node(&self, node_id: &str) -> Option<&GraphNode> {
        self.node_index.get(node_id).map(|&index| &self.nodes[index])
    }

    fn node_mut(&mut self, node_id: &str) -> Option<&mut GraphNode> {
        let index = *self.node_index.get(node_id)?;
        self.nodes.get_mut(index)
    }

    /// Applies `$NodeEditorMetadata` and the legacy top-level `$Groups`.
    ///
    /// Returns the workspace id and the metadata keys this parser does not know.
    fn apply_metadata(&mut self, root: &'v Map<String, Value>) -> (Option<String>, Map<String, Value>) {
        let mut workspace_id = None;
        let mut extra = Map::new();

        match root.get(keys::NODE_EDITOR_METADATA) {
            Some(Value::Object(metadata)) => {
                if let Some(floating) = metadata.get(keys::FLOATING_NODES) {
                    self.parse_floating(floating);
                }
                if let Some(nodes) = metadata.get(keys::NODES) {
                    self.apply_node_overrides(nodes);
                }
                if let Some(links) = metadata.get(keys::LINKS) {
                    self.splice_links(links);
                }
                if let Some(groups) = metadata.get(keys::GROUPS) {
                    self.add_groups(groups, "groups");
                }
                if let Some(comments) = metadata.get(keys::COMMENTS) {
                    self.add_comments(comments);
                }
                workspace_id = metadata
                    .get(keys::WORKSPACE_ID)
                    .and_then(non_empty_str)
                    .map(str::to_string);
                extra = metadata
                    .iter()
                    .filter(|(key, _)| !METADATA_SECTIONS.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
            }
            Some(other) => self.diagnostics.push(CatalogDiagnostic::MalformedMetadata {
                section: keys::NODE_EDITOR_METADATA,
                message: format!("expected an object, found {}", json_type_name(other)),
            }),
            None => {}
        }

        if let Some(groups) = root.get(keys::GROUPS) {
            self.add_groups(groups, "legacy-groups");
        }
        (workspace_id, extra)
    }

    fn parse_floating(&mut self, floating: &'v Value) {
        let Some(entries) = floating.as_array() else {
            self.malformed(keys::FLOATING_NODES, floating);
            return;
        };
        for (index, entry) in entries.iter().enumerate() {
            match entry {
                Value::Object(payload) => {
                    self.parse_payload(payload, None, &format!("floating/{index}"), false);
                }
                other => self.malformed(keys::FLOATING_NODES, other),
            }
        }
    }

    fn apply_node_overrides(&mut self, nodes: &Value) {
        let Some(entries) = nodes.as_object() else {
            self.malformed(keys::NODES, nodes);
            return;
        };
        for (node_id, entry) in entries {
            let Some(entry) =
                read_metadata_entry::<NodeMetadata>(keys::NODES, entry, &mut self.diagnostics)
            else {
                continue;
            };
            let Some(node) = self.node_mut(node_id) else {
                tracing::warn!("Editor metadata references unknown node '{}'", node_id);
                self.diagnostics
                    .push(CatalogDiagnostic::UnknownMetadataNode(node_id.clone()));
                continue;
            };
            if let Some(position) = entry.position {
                node.position = position.into();
            }
            match &mut node.data {
                NodeData::Data(data) => {
                    data.title_override = entry.title.or(data.title_override.take());
                    data.editor_extra = entry.extra;
                }
                NodeData::Raw(raw) => {
                    raw.title_override = entry.title.or(raw.title_override.take());
                    raw.editor_extra = entry.extra;
                }
                _ => {}
            }
        }
    }

    fn splice_links(&mut self, links: &Value) {
        let Some(entries) = links.as_object() else {
            self.malformed(keys::LINKS, links);
            return;
        };
        for (link_id, entry) in entries {
            let Some(entry) =
                read_metadata_entry::<LinkMetadata>(keys::LINKS, entry, &mut self.diagnostics)
            else {
                continue;
            };
            self.splice_link(link_id, entry);
        }
    }

    /// Inserts a link node between a source pin and the targets it reroutes.
    fn splice_link(&mut self, link_id: &str, entry: LinkMetadata) {
        if self.node_index.contains_key(link_id) {
            self.diagnostics.push(CatalogDiagnostic::MalformedMetadata {
                section: keys::LINKS,
                message: format!("link id '{link_id}' is already used by another node"),
            });
            return;
        }
        self.insert_node(GraphNode {
            id: link_id.to_string(),
            position: entry.position.map(Position::from).unwrap_or_default(),
            data: NodeData::Link(LinkNode {
                title: entry.title,
                target_endpoint: entry.target_endpoint,
                input_connections: entry.input_connections,
                extra: entry.extra,
            }),
        });

        let Some(source_endpoint) = entry.source_endpoint else {
            return;
        };
        let Some((source, pin_ref)) = split_endpoint(&source_endpoint) else {
            self.link_endpoint_missing(link_id, &source_endpoint);
            return;
        };
        let Some(source_node) = self.node(source) else {
            self.link_endpoint_missing(link_id, &source_endpoint);
            return;
        };
        let source = source.to_string();
        let handle = match &source_node.data {
            NodeData::Data(data) => data
                .output_pins
                .iter()
                .find(|pin| pin.id == pin_ref)
                .or_else(|| {
                    data.output_pins
                        .iter()
                        .find(|pin| pin.id.eq_ignore_ascii_case(pin_ref))
                })
                .map(|pin| pin.id.clone())
                .or_else(|| {
                    data.connections
                        .iter()
                        .find(|connection| connection.schema_key == pin_ref)
                        .map(|connection| connection.output_pin_id.clone())
                })
                .unwrap_or_else(|| pin_ref.to_string()),
            NodeData::Link(_) => LINK_OUTPUT_HANDLE.to_string(),
            _ => pin_ref.to_string(),
        };

        for endpoint in &entry.output_connections {
            let Some((target, _)) = split_endpoint(endpoint) else {
                self.link_endpoint_missing(link_id, endpoint);
                continue;
            };
            let Some(position) = self.edges.iter().position(|edge| {
                edge.source == source && edge.source_handle == handle && edge.target == target
            }) else {
                self.link_endpoint_missing(link_id, endpoint);
                continue;
            };

            let original = self.edges[position].clone();
            let retargeted = &mut self.edges[position];
            retargeted.target = link_id.to_string();
            retargeted.target_handle = Some(INPUT_HANDLE.to_string());

            let id = self
                .edge_ids
                .unique(format!("{link_id}:{LINK_OUTPUT_HANDLE}-{}", original.target));
            self.edges.push(GraphEdge {
                id,
                source: link_id.to_string(),
                source_handle: LINK_OUTPUT_HANDLE.to_string(),
                target: original.target,
                target_handle: original.target_handle,
                schema_key: original.schema_key,
                map_key: original.map_key,
                index: original.index,
            });
        }
    }

    fn link_endpoint_missing(&mut self, link_id: &str, endpoint: &str) {
        tracing::warn!("Link '{}' endpoint '{}' could not be resolved", link_id, endpoint);
        self.diagnostics.push(CatalogDiagnostic::LinkEndpointNotFound {
            link_id: link_id.to_string(),
            endpoint: endpoint.to_string(),
        });
    }

    fn add_groups(&mut self, groups: &Value, path: &str) {
        let Some(entries) = groups.as_array() else {
            self.malformed(keys::GROUPS, groups);
            return;
        };
        for (index, entry) in entries.iter().enumerate() {
            let Some(entry) =
                read_metadata_entry::<GroupMetadata>(keys::GROUPS, entry, &mut self.diagnostics)
            else {
                continue;
            };
            let id = self.free_or_mint(entry.node_id.as_deref(), "Group", &format!("{path}/{index}"));
            self.insert_node(GraphNode {
                id,
                position: entry.position.map(Position::from).unwrap_or_default(),
                data: NodeData::Group(GroupNode {
                    name: entry.name,
                    width: entry.width,
                    height: entry.height,
                    extra: entry.extra,
                }),
            });
        }
    }

    fn add_comments(&mut self, comments: &Value) {
        let Some(entries) = comments.as_array() else {
            self.malformed(keys::COMMENTS, comments);
            return;
        };
        for (index, entry) in entries.iter().enumerate() {
            let Some(entry) =
                read_metadata_entry::<CommentMetadata>(keys::COMMENTS, entry, &mut self.diagnostics)
            else {
                continue;
            };
            let id = self.free_or_mint(entry.node_id.as_deref(), "Comment", &format!("comments/{index}"));
            self.insert_node(GraphNode {
                id,
                position: entry.position.map(Position::from).unwrap_or_default(),
                data: NodeData::Comment(CommentNode {
                    name: entry.name,
                    text: entry.text,
                    font_size: entry.font_size,
                    width: entry.width,
                    height: entry.height,
                    extra: entry.extra,
                }),
            });
        }
    }

    /// Keeps a persisted id unless a node already owns it.
    fn free_or_mint(&mut self, persisted: Option<&str>, prefix: &str, path: &str) -> String {
        match persisted.and_then(non_empty) {
            Some(id) if !self.node_index.contains_key(id) => id.to_string(),
            _ => self.node_ids.mint(prefix, path),
        }
    }

    fn malformed(&mut self, section: &'static str, found: &Value) {
        self.diagnostics.push(CatalogDiagnostic::MalformedMetadata {
            section,
            message: format!("unexpected {}", json_type_name(found)),
        });
    }
}

fn mismatch(node_id: &str, constant: &NodeConstant, found: &Value) -> CatalogDiagnostic {
    CatalogDiagnostic::ConstantMismatch {
        node_id: node_id.to_string(),
        schema_key: constant.schema_key.clone(),
        expected: constant.value.clone(),
        found: found.to_string(),
    }
}

/// Older documents store positions inline.
fn legacy_position(payload: &Map<String, Value>) -> Option<Position> {
    payload
        .get(keys::POSITION)
        .and_then(|value| serde_json::from_value::<MetadataPosition>(value.clone()).ok())
        .map(Position::from)
}
