use ahash::AHashSet;
use serde::Serialize;
use serde_json::{Map, Number, Value};

/// How many children an output pin accepts, and how they are stored in a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Multiplicity {
    /// One embedded child object.
    #[default]
    Single,
    /// An ordered array of embedded children.
    Multiple,
    /// An object keyed by caller-chosen names.
    Map,
}

impl Multiplicity {
    /// `IsMap` takes precedence over `Multiple`.
    pub fn from_flags(multiple: bool, is_map: bool) -> Self {
        if is_map {
            Multiplicity::Map
        } else if multiple {
            Multiplicity::Multiple
        } else {
            Multiplicity::Single
        }
    }
}

/// A typed connection point on a node template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pin {
    pub id: String,
    pub pin_type: Option<String>,
    pub multiplicity: Multiplicity,
    pub label: String,
    pub color: Option<String>,
}

/// The editor widget kind of a content field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum FieldKind {
    SmallString,
    String,
    Float,
    Int,
    Integer,
    IntSlider,
    Checkbox,
    Bool,
    Enum,
    FilePath,
    List,
    Object,
    /// A declared type the editor does not know. Edited as a string.
    Unsupported(String),
}

impl FieldKind {
    pub fn parse(type_name: &str) -> Self {
        match type_name.trim() {
            "SmallString" => FieldKind::SmallString,
            "String" => FieldKind::String,
            "Float" => FieldKind::Float,
            "Int" => FieldKind::Int,
            "Integer" => FieldKind::Integer,
            "IntSlider" => FieldKind::IntSlider,
            "Checkbox" => FieldKind::Checkbox,
            "Bool" => FieldKind::Bool,
            "Enum" => FieldKind::Enum,
            "FilePath" => FieldKind::FilePath,
            "List" => FieldKind::List,
            "Object" => FieldKind::Object,
            other => FieldKind::Unsupported(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FieldKind::SmallString => "SmallString",
            FieldKind::String => "String",
            FieldKind::Float => "Float",
            FieldKind::Int => "Int",
            FieldKind::Integer => "Integer",
            FieldKind::IntSlider => "IntSlider",
            FieldKind::Checkbox => "Checkbox",
            FieldKind::Bool => "Bool",
            FieldKind::Enum => "Enum",
            FieldKind::FilePath => "FilePath",
            FieldKind::List => "List",
            FieldKind::Object => "Object",
            FieldKind::Unsupported(name) => name,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, FieldKind::Unsupported(_))
    }
}

/// One editable content field of a template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDefinition {
    pub id: String,
    pub kind: FieldKind,
    pub label: String,
    /// The raw `Options` object, kept for editor widgets (`Width`, `Min`, `Values`...).
    pub options: Map<String, Value>,
    /// Nested fields of an `Object` field.
    pub fields: Vec<FieldDefinition>,
}

impl FieldDefinition {
    /// The value a freshly instantiated node starts with.
    pub fn default_value(&self) -> Value {
        let declared = self.options.get("Default");
        match &self.kind {
            FieldKind::Float => number_or_zero(declared, false),
            FieldKind::Int | FieldKind::Integer | FieldKind::IntSlider => {
                number_or_zero(declared, true)
            }
            FieldKind::Checkbox | FieldKind::Bool => {
                let flag = declared
                    .or_else(|| self.options.get("DefaultValue"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                Value::Bool(flag)
            }
            FieldKind::Enum => {
                let values = self.enum_values();
                let chosen = declared
                    .and_then(Value::as_str)
                    .filter(|candidate| values.contains(candidate))
                    .or_else(|| values.first().copied())
                    .unwrap_or("");
                Value::String(chosen.to_string())
            }
            FieldKind::List => Value::Array(Vec::new()),
            FieldKind::Object => Value::Object(
                self.fields
                    .iter()
                    .map(|field| (field.id.clone(), field.default_value()))
                    .collect(),
            ),
            FieldKind::SmallString
            | FieldKind::String
            | FieldKind::FilePath
            | FieldKind::Unsupported(_) => match declared {
                Some(Value::String(text)) => Value::String(text.clone()),
                _ => Value::String(String::new()),
            },
        }
    }

    /// The allowed values of an `Enum` field, in declaration order.
    pub fn enum_values(&self) -> Vec<&str> {
        self.options
            .get("Values")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

fn number_or_zero(declared: Option<&Value>, integral: bool) -> Value {
    let Some(number) = declared.and_then(Value::as_f64).filter(|n| n.is_finite()) else {
        return Value::Number(Number::from(0));
    };
    if integral {
        Value::Number(Number::from(number.round() as i64))
    } else {
        // Integral literals stay integers so `5` round-trips as `5`, not `5.0`.
        match declared.and_then(Value::as_i64) {
            Some(whole) => Value::Number(Number::from(whole)),
            None => Number::from_f64(number)
                .map(Value::Number)
                .unwrap_or_else(|| Value::Number(Number::from(0))),
        }
    }
}

/// A schema key that reads and writes a content field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMapping {
    pub schema_key: String,
    pub field_id: String,
}

/// A schema key whose value embeds child node payloads through an output pin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaConnection {
    pub schema_key: String,
    pub output_pin_id: String,
    pub pin_type: Option<String>,
    pub multiplicity: Multiplicity,
    /// Template or variant id used to resolve the embedded children.
    pub node_selector: Option<String>,
}

/// A schema key with a fixed literal value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaConstant {
    pub schema_key: String,
    pub value: String,
}

/// A classified `Schema` entry of a node definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SchemaValue {
    Field(FieldMapping),
    Connection(SchemaConnection),
    Constant(SchemaConstant),
}

impl SchemaValue {
    pub fn schema_key(&self) -> &str {
        match self {
            SchemaValue::Field(mapping) => &mapping.schema_key,
            SchemaValue::Connection(connection) => &connection.schema_key,
            SchemaValue::Constant(constant) => &constant.schema_key,
        }
    }
}

/// The canonical value a template declares for a variant identity field
/// (for example `"Type": "Density"` in its schema).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantFieldValue {
    pub field_name: String,
    pub value: String,
}

/// One concrete node type of a workspace.
///
/// Templates are immutable once the catalog is built. Graph nodes copy what
/// they need out of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeTemplate {
    pub template_id: String,
    pub label: String,
    pub color: Option<String>,
    pub schema_type: String,
    pub category: String,
    pub fields: Vec<FieldDefinition>,
    pub input_pins: Vec<Pin>,
    pub output_pins: Vec<Pin>,
    pub schema: Vec<SchemaValue>,
    pub variant_values: Vec<VariantFieldValue>,
}

impl NodeTemplate {
    pub fn field(&self, field_id: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.id == field_id)
    }

    pub fn input_pin(&self, pin_id: &str) -> Option<&Pin> {
        self.input_pins.iter().find(|pin| pin.id == pin_id)
    }

    pub fn output_pin(&self, pin_id: &str) -> Option<&Pin> {
        self.output_pins.iter().find(|pin| pin.id == pin_id)
    }

    pub fn field_mappings(&self) -> impl Iterator<Item = &FieldMapping> {
        self.schema.iter().filter_map(|entry| match entry {
            SchemaValue::Field(mapping) => Some(mapping),
            _ => None,
        })
    }

    pub fn connections(&self) -> impl Iterator<Item = &SchemaConnection> {
        self.schema.iter().filter_map(|entry| match entry {
            SchemaValue::Connection(connection) => Some(connection),
            _ => None,
        })
    }

    pub fn constants(&self) -> impl Iterator<Item = &SchemaConstant> {
        self.schema.iter().filter_map(|entry| match entry {
            SchemaValue::Constant(constant) => Some(constant),
            _ => None,
        })
    }

    pub fn connection(&self, schema_key: &str) -> Option<&SchemaConnection> {
        self.connections()
            .find(|connection| connection.schema_key == schema_key)
    }

    /// Connections driven by the given output pin.
    pub fn connections_for_pin<'a>(
        &'a self,
        pin_id: &'a str,
    ) -> impl Iterator<Item = &'a SchemaConnection> + 'a {
        self.connections()
            .filter(move |connection| connection.output_pin_id == pin_id)
    }

    pub fn variant_value(&self, field_name: &str) -> Option<&str> {
        self.variant_values
            .iter()
            .find(|entry| entry.field_name == field_name)
            .map(|entry| entry.value.as_str())
    }

    /// Every document key this template reads or writes as a field or a pin.
    pub fn runtime_keys(&self) -> AHashSet<&str> {
        self.schema
            .iter()
            .filter(|entry| !matches!(entry, SchemaValue::Constant(_)))
            .map(SchemaValue::schema_key)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(kind: &str, options: Value) -> FieldDefinition {
        FieldDefinition {
            id: "Value".to_string(),
            kind: FieldKind::parse(kind),
            label: "Value".to_string(),
            options: options.as_object().cloned().unwrap_or_default(),
            fields: Vec::new(),
        }
    }

    #[test]
    fn defaults_follow_field_kind() {
        assert_eq!(field("Float", json!({"Default": 0.5})).default_value(), json!(0.5));
        assert_eq!(field("Float", json!({})).default_value(), json!(0));
        assert_eq!(field("IntSlider", json!({"Default": 2.6})).default_value(), json!(3));
        assert_eq!(field("Bool", json!({"DefaultValue": true})).default_value(), json!(true));
        assert_eq!(field("String", json!({"Default": 7})).default_value(), json!(""));
        assert_eq!(field("List", json!({})).default_value(), json!([]));
        assert_eq!(field("Vector3", json!({"Default": "0,0,0"})).default_value(), json!("0,0,0"));
    }

    #[test]
    fn enum_default_must_be_a_declared_value() {
        let declared = field("Enum", json!({"Default": "Low", "Values": ["High", "Low"]}));
        assert_eq!(declared.default_value(), json!("Low"));

        let stray = field("Enum", json!({"Default": "Medium", "Values": ["High", "Low"]}));
        assert_eq!(stray.default_value(), json!("High"));

        assert_eq!(field("Enum", json!({})).default_value(), json!(""));
    }

    #[test]
    fn object_defaults_nest() {
        let mut object = field("Object", json!({}));
        object.fields = vec![field("Int", json!({"Default": 4}))];
        assert_eq!(object.default_value(), json!({"Value": 4}));
    }

    #[test]
    fn map_flag_wins_over_multiple() {
        assert_eq!(Multiplicity::from_flags(true, true), Multiplicity::Map);
        assert_eq!(Multiplicity::from_flags(true, false), Multiplicity::Multiple);
        assert_eq!(Multiplicity::from_flags(false, false), Multiplicity::Single);
    }
}
