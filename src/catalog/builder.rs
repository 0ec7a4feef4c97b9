use super::definition::{
    ContentDefinition, NodeDefinition, PinDefinition, RootDefinition, SchemaLinkDefinition,
    VariantDefinitionEntry,
};
use super::template::{
    FieldDefinition, FieldKind, FieldMapping, Multiplicity, NodeTemplate, Pin, SchemaConnection,
    SchemaConstant, SchemaValue, VariantFieldValue,
};
use super::variants::{TYPE_FIELD, VariantDefinition, VariantIndex, VariantOption};
use super::{Root, TemplateCatalog, UNCATEGORIZED};
use crate::error::CatalogDiagnostic;
use crate::keys::{self, json_type_name, non_empty, non_empty_str};
use ahash::{AHashMap, AHashSet};
use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Field names classified as variant identity even when no variant declares them.
const BASELINE_IDENTITY_FIELDS: [&str; 2] = [TYPE_FIELD, "Id"];

/// Builds a [`TemplateCatalog`] from a workspace configuration and its node definitions.
///
/// Loading is best-effort: every malformed entry becomes a [`CatalogDiagnostic`]
/// on the resulting catalog and the rest of the workspace still loads.
pub struct CatalogBuilder {
    config: Value,
    definitions: Vec<(String, Value)>,
}

impl CatalogBuilder {
    pub fn new(config: Value) -> Self {
        Self {
            config,
            definitions: Vec::new(),
        }
    }

    /// Adds one node definition. `source_name` only shows up in diagnostics.
    pub fn with_definition(mut self, source_name: impl Into<String>, definition: Value) -> Self {
        self.definitions.push((source_name.into(), definition));
        self
    }

    pub fn with_definitions<I, S>(mut self, definitions: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        self.definitions.extend(
            definitions
                .into_iter()
                .map(|(source_name, definition)| (source_name.into(), definition)),
        );
        self
    }

    pub fn build(self) -> TemplateCatalog {
        let mut diagnostics = Vec::new();

        let empty = Map::new();
        let config = match &self.config {
            Value::Object(config) => config,
            Value::Null => &empty,
            other => {
                diagnostics.push(CatalogDiagnostic::ConfigNotObject {
                    found: json_type_name(other),
                });
                &empty
            }
        };

        let variants = read_variants(config, &mut diagnostics);
        let mut identity_fields: Vec<&str> = variants
            .iter()
            .map(|variant| variant.field_name.as_str())
            .collect();
        identity_fields.extend(BASELINE_IDENTITY_FIELDS);

        let mut loader = DefinitionLoader {
            identity_fields: &identity_fields,
            unsupported_types: AHashSet::new(),
            diagnostics: &mut diagnostics,
        };
        let mut templates: AHashMap<String, NodeTemplate> = AHashMap::new();
        let mut declaration_order: Vec<String> = Vec::new();
        for (source_name, definition) in &self.definitions {
            let Some(template) = loader.load(source_name, definition) else {
                continue;
            };
            if templates.contains_key(&template.template_id) {
                loader
                    .diagnostics
                    .push(CatalogDiagnostic::DuplicateTemplateId {
                        template_id: template.template_id.clone(),
                        source_name: source_name.clone(),
                    });
                declaration_order.retain(|id| id != &template.template_id);
            }
            declaration_order.push(template.template_id.clone());
            templates.insert(template.template_id.clone(), template);
        }
        if !loader.unsupported_types.is_empty() {
            let names = loader.unsupported_types.drain().sorted().collect();
            loader
                .diagnostics
                .push(CatalogDiagnostic::UnsupportedFieldTypes(names));
        }

        let roots = read_roots(config, &templates, &mut diagnostics);
        let ordered = order_templates(config, templates, &declaration_order, &mut diagnostics);
        let variant_index = VariantIndex::build(
            variants,
            |template_id| ordered.iter().any(|t| t.template_id == template_id),
            &mut diagnostics,
        );

        if !diagnostics.is_empty() {
            tracing::warn!(
                "Workspace catalog loaded with {} diagnostic(s)",
                diagnostics.len()
            );
            for diagnostic in &diagnostics {
                tracing::debug!("{}", diagnostic);
            }
        }

        TemplateCatalog::from_parts(
            config
                .get("WorkspaceName")
                .and_then(non_empty_str)
                .map(str::to_string),
            ordered,
            roots,
            variant_index,
            diagnostics,
        )
    }
}

/// Deserializes one configuration entry, diagnosing instead of failing.
fn read_entry<T: DeserializeOwned>(
    owner: &str,
    section: &'static str,
    value: &Value,
    diagnostics: &mut Vec<CatalogDiagnostic>,
) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(entry) => Some(entry),
        Err(error) => {
            diagnostics.push(CatalogDiagnostic::MalformedEntry {
                owner: owner.to_string(),
                section,
                message: error.to_string(),
            });
            None
        }
    }
}

fn read_variants(
    config: &Map<String, Value>,
    diagnostics: &mut Vec<CatalogDiagnostic>,
) -> Vec<VariantDefinition> {
    let Some(declared) = config.get("Variants").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut variants = Vec::with_capacity(declared.len());
    for (variant_id, entry) in declared {
        let Some(entry) =
            read_entry::<VariantDefinitionEntry>(variant_id, "Variants", entry, diagnostics)
        else {
            continue;
        };
        let Some(field_name) = non_empty(&entry.variant_field_name) else {
            diagnostics.push(CatalogDiagnostic::MalformedEntry {
                owner: variant_id.clone(),
                section: "Variants",
                message: "missing VariantFieldName".to_string(),
            });
            continue;
        };
        let options = entry
            .variants
            .iter()
            .filter_map(|(value, template_id)| {
                non_empty_str(template_id).map(|template_id| VariantOption {
                    value: value.clone(),
                    template_id: template_id.to_string(),
                })
            })
            .collect();
        variants.push(VariantDefinition {
            variant_id: variant_id.clone(),
            field_name: field_name.to_string(),
            options,
        });
    }
    variants
}

fn read_roots(
    config: &Map<String, Value>,
    templates: &AHashMap<String, NodeTemplate>,
    diagnostics: &mut Vec<CatalogDiagnostic>,
) -> Vec<Root> {
    let Some(declared) = config.get("Roots").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut roots = Vec::with_capacity(declared.len());
    for (root_id, entry) in declared {
        let Some(entry) = read_entry::<RootDefinition>(root_id, "Roots", entry, diagnostics) else {
            continue;
        };
        let Some(node_type) = non_empty(&entry.root_node_type) else {
            diagnostics.push(CatalogDiagnostic::MalformedEntry {
                owner: root_id.clone(),
                section: "Roots",
                message: "missing RootNodeType".to_string(),
            });
            continue;
        };
        // Root node types may name a variant as well as a template.
        let is_variant = config
            .get("Variants")
            .and_then(Value::as_object)
            .is_some_and(|variants| variants.contains_key(node_type));
        if !is_variant && !templates.contains_key(node_type) {
            diagnostics.push(CatalogDiagnostic::UnknownRootTemplate {
                root_id: root_id.clone(),
                node_type: node_type.to_string(),
            });
        }
        roots.push(Root {
            root_id: root_id.clone(),
            root_node_type: node_type.to_string(),
            menu_name: entry.menu_name.as_deref().and_then(non_empty).map(str::to_string),
        });
    }
    roots
}

/// Categorized templates first, in category order, then the rest sorted by label.
fn order_templates(
    config: &Map<String, Value>,
    mut templates: AHashMap<String, NodeTemplate>,
    declaration_order: &[String],
    diagnostics: &mut Vec<CatalogDiagnostic>,
) -> Vec<NodeTemplate> {
    let mut ordered = Vec::with_capacity(templates.len());
    if let Some(categories) = config.get("NodeCategories").and_then(Value::as_object) {
        for (category, members) in categories {
            let Some(members) = members.as_array() else {
                diagnostics.push(CatalogDiagnostic::MalformedEntry {
                    owner: category.clone(),
                    section: "NodeCategories",
                    message: format!("expected an array, found {}", json_type_name(members)),
                });
                continue;
            };
            for template_id in members.iter().filter_map(non_empty_str) {
                if let Some(mut template) = templates.remove(template_id) {
                    template.category = category.clone();
                    ordered.push(template);
                } else if !ordered.iter().any(|t| t.template_id == template_id) {
                    diagnostics.push(CatalogDiagnostic::UnknownCategoryTemplate {
                        category: category.clone(),
                        template_id: template_id.to_string(),
                    });
                }
            }
        }
    }

    let leftovers = declaration_order
        .iter()
        .filter_map(|id| templates.remove(id))
        .sorted_by(|a, b| {
            a.label
                .cmp(&b.label)
                .then_with(|| a.template_id.cmp(&b.template_id))
        })
        .map(|mut template| {
            template.category = UNCATEGORIZED.to_string();
            template
        });
    ordered.extend(leftovers);
    ordered
}

/// Turns one definition into a template, reporting everything it skips.
struct DefinitionLoader<'a> {
    identity_fields: &'a [&'a str],
    unsupported_types: AHashSet<String>,
    diagnostics: &'a mut Vec<CatalogDiagnostic>,
}

impl DefinitionLoader<'_> {
    fn load(&mut self, source_name: &str, raw: &Value) -> Option<NodeTemplate> {
        if !raw.is_object() {
            self.diagnostics.push(CatalogDiagnostic::DefinitionNotObject {
                source_name: source_name.to_string(),
                found: json_type_name(raw),
            });
            return None;
        }
        let definition: NodeDefinition =
            read_entry(source_name, "definition", raw, self.diagnostics)?;
        let Some(template_id) = definition.id.as_ref().and_then(non_empty_str) else {
            self.diagnostics.push(CatalogDiagnostic::MissingTemplateId {
                source_name: source_name.to_string(),
            });
            return None;
        };
        let template_id = template_id.to_string();

        let fields = self.load_fields(&template_id, &definition.content);
        let input_pins = self.load_pins(&template_id, &definition.inputs);
        let output_pins = self.load_pins(&template_id, &definition.outputs);
        let (schema, variant_values) =
            self.classify_schema(&template_id, &definition.schema, &fields, &output_pins);

        let schema_type = definition
            .schema
            .get(TYPE_FIELD)
            .and_then(non_empty_str)
            .unwrap_or(&template_id)
            .to_string();
        let label = definition
            .title
            .as_deref()
            .and_then(non_empty)
            .unwrap_or(&template_id)
            .to_string();

        Some(NodeTemplate {
            label,
            color: definition.color.as_deref().and_then(non_empty).map(str::to_string),
            schema_type,
            category: UNCATEGORIZED.to_string(),
            fields,
            input_pins,
            output_pins,
            schema,
            variant_values,
            template_id,
        })
    }

    fn load_fields(&mut self, template_id: &str, content: &[Value]) -> Vec<FieldDefinition> {
        let mut fields: Vec<FieldDefinition> = Vec::with_capacity(content.len());
        for raw in content {
            let Some(entry) =
                read_entry::<ContentDefinition>(template_id, "Content", raw, self.diagnostics)
            else {
                continue;
            };
            let Some(field_id) = entry.id.as_deref().and_then(non_empty) else {
                self.diagnostics.push(CatalogDiagnostic::MissingFieldId {
                    template_id: template_id.to_string(),
                });
                continue;
            };
            let Some(type_name) = entry.field_type.as_deref().and_then(non_empty) else {
                self.diagnostics.push(CatalogDiagnostic::MissingFieldType {
                    template_id: template_id.to_string(),
                    field_id: field_id.to_string(),
                });
                continue;
            };
            let kind = FieldKind::parse(type_name);
            if !kind.is_supported() {
                self.unsupported_types.insert(type_name.to_string());
            }

            let nested = match (&kind, entry.options.get("Fields")) {
                (FieldKind::Object, Some(Value::Array(nested))) => {
                    self.load_fields(&format!("{template_id}.{field_id}"), nested)
                }
                _ => Vec::new(),
            };
            let label = entry
                .options
                .get("Label")
                .and_then(non_empty_str)
                .unwrap_or(field_id)
                .to_string();

            if let Some(position) = fields.iter().position(|field| field.id == field_id) {
                self.diagnostics.push(CatalogDiagnostic::DuplicateFieldId {
                    template_id: template_id.to_string(),
                    field_id: field_id.to_string(),
                });
                fields.remove(position);
            }
            fields.push(FieldDefinition {
                id: field_id.to_string(),
                kind,
                label,
                options: entry.options,
                fields: nested,
            });
        }
        fields
    }

    fn load_pins(&mut self, template_id: &str, raw_pins: &[Value]) -> Vec<Pin> {
        let mut pins = Vec::with_capacity(raw_pins.len());
        for raw in raw_pins {
            let Some(entry) = read_entry::<PinDefinition>(template_id, "pin", raw, self.diagnostics)
            else {
                continue;
            };
            let Some(pin_id) = entry.id.as_deref().and_then(non_empty) else {
                self.diagnostics.push(CatalogDiagnostic::MissingPinId {
                    template_id: template_id.to_string(),
                });
                continue;
            };
            pins.push(Pin {
                id: pin_id.to_string(),
                pin_type: entry.pin_type.as_deref().and_then(non_empty).map(str::to_string),
                multiplicity: Multiplicity::from_flags(entry.multiple, entry.is_map),
                label: entry
                    .label
                    .as_deref()
                    .and_then(non_empty)
                    .unwrap_or(pin_id)
                    .to_string(),
                color: entry.color.as_deref().and_then(non_empty).map(str::to_string),
            });
        }
        pins
    }

    fn classify_schema(
        &mut self,
        template_id: &str,
        schema: &Map<String, Value>,
        fields: &[FieldDefinition],
        output_pins: &[Pin],
    ) -> (Vec<SchemaValue>, Vec<VariantFieldValue>) {
        let mut classified = Vec::with_capacity(schema.len());
        let mut variant_values = Vec::new();
        let mut node_only_selectors: Vec<(String, String)> = Vec::new();

        for (declared_key, value) in schema {
            let schema_key = keys::runtime_schema_key(declared_key);
            if schema_key.is_empty() || keys::is_reserved(schema_key) {
                self.diagnostics.push(CatalogDiagnostic::ReservedSchemaKey {
                    template_id: template_id.to_string(),
                    schema_key: declared_key.clone(),
                });
                continue;
            }

            match value {
                Value::String(text) => {
                    let names_field = fields.iter().any(|field| field.id == *text);
                    if names_field {
                        classified.push(SchemaValue::Field(FieldMapping {
                            schema_key: schema_key.to_string(),
                            field_id: text.clone(),
                        }));
                    } else if self.identity_fields.contains(&schema_key) {
                        variant_values.push(VariantFieldValue {
                            field_name: schema_key.to_string(),
                            value: text.clone(),
                        });
                    } else {
                        classified.push(SchemaValue::Constant(SchemaConstant {
                            schema_key: schema_key.to_string(),
                            value: text.clone(),
                        }));
                    }
                }
                Value::Object(_) => {
                    let Some(link) = read_entry::<SchemaLinkDefinition>(
                        template_id,
                        "Schema",
                        value,
                        self.diagnostics,
                    ) else {
                        continue;
                    };
                    let selector = link.node.as_deref().and_then(non_empty).map(str::to_string);
                    let Some(pin_name) = link.pin.as_deref().and_then(non_empty) else {
                        if let Some(selector) = selector {
                            node_only_selectors.push((schema_key.to_string(), selector));
                        } else {
                            self.diagnostics
                                .push(CatalogDiagnostic::UnsupportedSchemaValue {
                                    template_id: template_id.to_string(),
                                    schema_key: declared_key.clone(),
                                    found: "object",
                                });
                        }
                        continue;
                    };
                    let Some(pin) = output_pins
                        .iter()
                        .find(|pin| pin.id.eq_ignore_ascii_case(pin_name))
                    else {
                        self.diagnostics.push(CatalogDiagnostic::UnknownPin {
                            template_id: template_id.to_string(),
                            schema_key: declared_key.clone(),
                            pin_id: pin_name.to_string(),
                        });
                        continue;
                    };
                    classified.push(SchemaValue::Connection(SchemaConnection {
                        schema_key: schema_key.to_string(),
                        output_pin_id: pin.id.clone(),
                        pin_type: pin.pin_type.clone(),
                        multiplicity: pin.multiplicity,
                        node_selector: selector,
                    }));
                }
                other => self
                    .diagnostics
                    .push(CatalogDiagnostic::UnsupportedSchemaValue {
                        template_id: template_id.to_string(),
                        schema_key: declared_key.clone(),
                        found: json_type_name(other),
                    }),
            }
        }

        // A `Node`-only entry names the child selector of the pin sharing its key.
        for (schema_key, selector) in node_only_selectors {
            for entry in classified.iter_mut() {
                if let SchemaValue::Connection(connection) = entry {
                    if connection.schema_key == schema_key && connection.node_selector.is_none() {
                        connection.node_selector = Some(selector.clone());
                    }
                }
            }
        }

        (classified, variant_values)
    }
}
