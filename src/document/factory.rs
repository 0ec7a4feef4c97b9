use super::ids::NodeIdAllocator;
use super::model::{DataNode, FieldValue, GraphNode, NodeConstant, NodeData, ParsedGraph, Position};
use crate::catalog::{NodeTemplate, TemplateCatalog, VariantIdentity};
use crate::keys;
use crate::resolver::VariantResolver;
use serde_json::{Map, Value};

/// The per-node copy of a template, with no values filled in.
pub(crate) fn shape_from_template(template: &NodeTemplate) -> DataNode {
    let fields = template
        .fields
        .iter()
        .map(|field| FieldValue {
            field_id: field.id.clone(),
            schema_key: template
                .field_mappings()
                .find(|mapping| mapping.field_id == field.id)
                .map(|mapping| mapping.schema_key.clone()),
            kind: field.kind.clone(),
            default: field.default_value(),
            value: None,
        })
        .collect();

    DataNode {
        template_id: template.template_id.clone(),
        label: template.label.clone(),
        color: template.color.clone(),
        fields,
        input_pins: template.input_pins.clone(),
        output_pins: template.output_pins.clone(),
        connections: template.connections().cloned().collect(),
        constants: template
            .constants()
            .map(|constant| NodeConstant::from_schema(constant, false))
            .collect(),
        unparsed: Map::new(),
        title_override: None,
        comment: None,
        editor_extra: Map::new(),
    }
}

/// Creates and retypes data nodes.
pub struct NodeFactory<'c> {
    catalog: &'c TemplateCatalog,
    resolver: VariantResolver<'c>,
}

impl<'c> NodeFactory<'c> {
    pub fn new(catalog: &'c TemplateCatalog) -> Self {
        Self {
            catalog,
            resolver: VariantResolver::new(catalog),
        }
    }

    /// A fresh node: default field values, every constant written and the
    /// template's canonical variant identity stamped.
    pub fn instantiate(
        &self,
        template: &NodeTemplate,
        node_id: impl Into<String>,
        position: Position,
    ) -> GraphNode {
        let mut data = shape_from_template(template);
        for field in data.fields.iter_mut() {
            field.value = Some(field.default.clone());
        }
        for constant in data.constants.iter_mut() {
            constant.written = true;
        }
        self.stamp_identity(&mut data, template);
        GraphNode {
            id: node_id.into(),
            position,
            data: NodeData::Data(Box::new(data)),
        }
    }

    /// Adds a fresh node of `template_id` to a graph under a newly minted id.
    pub fn instantiate_in(
        &self,
        graph: &mut ParsedGraph,
        template_id: &str,
        position: Position,
    ) -> Option<String> {
        let template = self.catalog.template(template_id)?;
        let mut ids =
            NodeIdAllocator::new(graph.nodes.iter().map(|node| node.id.clone()).collect());
        let node_id = ids.mint(
            &template.template_id,
            &format!("new/{}", graph.nodes.len()),
        );
        graph
            .nodes
            .push(self.instantiate(template, node_id.clone(), position));
        Some(node_id)
    }

    /// Switches a data or raw node to another template.
    ///
    /// Values whose keys the new template maps become field values, the rest
    /// stay as unparsed keys, and the new identity is stamped. Id, position,
    /// title and comment survive. Returns `false` for link, group and comment
    /// nodes, which have no template.
    pub fn retype(&self, node: &mut GraphNode, template: &NodeTemplate) -> bool {
        let (mut flat, title_override, comment, editor_extra) = match &node.data {
            NodeData::Data(data) => {
                let mut flat = Map::new();
                for field in &data.fields {
                    if let (Some(key), Some(value)) = (&field.schema_key, &field.value) {
                        flat.insert(key.clone(), value.clone());
                    }
                }
                for constant in data.constants.iter().filter(|constant| constant.written) {
                    flat.insert(
                        constant.schema_key.clone(),
                        Value::String(constant.value.clone()),
                    );
                }
                flat.extend(data.unparsed.clone());
                (
                    flat,
                    data.title_override.clone(),
                    data.comment.clone(),
                    data.editor_extra.clone(),
                )
            }
            NodeData::Raw(raw) => {
                let mut flat = raw.content.clone();
                flat.shift_remove(keys::NODE_ID);
                flat.shift_remove(keys::COMMENT);
                (
                    flat,
                    raw.title_override.clone(),
                    raw.comment.clone(),
                    raw.editor_extra.clone(),
                )
            }
            _ => return false,
        };

        let mut data = shape_from_template(template);
        for field in data.fields.iter_mut() {
            let Some(key) = field.schema_key.as_deref() else {
                continue;
            };
            field.value = Some(flat.shift_remove(key).unwrap_or_else(|| field.default.clone()));
        }
        for constant in data.constants.iter_mut() {
            flat.shift_remove(&constant.schema_key);
            constant.written = true;
        }
        data.unparsed = flat;
        data.title_override = title_override;
        data.comment = comment;
        data.editor_extra = editor_extra;
        self.stamp_identity(&mut data, template);

        node.data = NodeData::Data(Box::new(data));
        true
    }

    /// Writes the canonical identity, routing keys the template maps to fields.
    fn stamp_identity(&self, data: &mut DataNode, template: &NodeTemplate) -> VariantIdentity {
        let mut payload = data.unparsed.clone();
        for field in &data.fields {
            if let (Some(key), Some(value)) = (&field.schema_key, &field.value) {
                payload
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        let identity = self.resolver.write_identity(&mut payload, template);

        for field in data.fields.iter_mut() {
            if let Some(key) = field.schema_key.as_deref() {
                if let Some(value) = payload.shift_remove(key) {
                    field.value = Some(value);
                }
            }
        }
        data.unparsed = payload;
        identity
    }
}
