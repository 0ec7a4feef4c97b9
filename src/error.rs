use serde::Serialize;
use thiserror::Error;

/// Fatal errors raised while reading or writing an asset document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("Failed to parse document JSON: {0}")]
    JsonParseError(String),

    #[error("Document root must be a JSON object, found {found}")]
    RootNotObject { found: &'static str },

    #[error("Root node '{0}' is not present in the graph")]
    MissingRootNode(String),

    #[error("Node '{node_id}' cannot be written as the document root: it is a {kind} node")]
    InvalidRootNode { node_id: String, kind: String },

    #[error("Failed to encode editor metadata: {0}")]
    MetadataEncodeError(String),
}

/// Non-fatal findings accumulated while building a catalog or parsing a document.
///
/// Nothing here stops a load. Each entry renders into a single human readable
/// line through `Display`.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum CatalogDiagnostic {
    #[error("Workspace configuration must be a JSON object, found {found}")]
    ConfigNotObject { found: &'static str },

    #[error("Skipping workspace definition '{source_name}': expected an object, found {found}")]
    DefinitionNotObject {
        source_name: String,
        found: &'static str,
    },

    #[error("Skipping workspace definition without a valid Id ({source_name})")]
    MissingTemplateId { source_name: String },

    #[error("Duplicate workspace node Id '{template_id}' in {source_name}; keeping the latest")]
    DuplicateTemplateId {
        template_id: String,
        source_name: String,
    },

    #[error("Malformed {section} entry in '{owner}': {message}")]
    MalformedEntry {
        owner: String,
        section: &'static str,
        message: String,
    },

    #[error("Skipping content entry without Id in '{template_id}'")]
    MissingFieldId { template_id: String },

    #[error("Duplicate field Id '{field_id}' in '{template_id}'; keeping the latest")]
    DuplicateFieldId {
        template_id: String,
        field_id: String,
    },

    #[error("Skipping field '{field_id}' in '{template_id}': missing Type")]
    MissingFieldType {
        template_id: String,
        field_id: String,
    },

    #[error("Unsupported field types treated as strings: {}", .0.join(", "))]
    UnsupportedFieldTypes(Vec<String>),

    #[error("Skipping pin without Id in '{template_id}'")]
    MissingPinId { template_id: String },

    #[error("Schema key '{schema_key}' in '{template_id}' references unknown output pin '{pin_id}'")]
    UnknownPin {
        template_id: String,
        schema_key: String,
        pin_id: String,
    },

    #[error("Schema key '{schema_key}' in '{template_id}' uses the reserved '$' prefix")]
    ReservedSchemaKey {
        template_id: String,
        schema_key: String,
    },

    #[error("Schema key '{schema_key}' in '{template_id}' has an unsupported {found} value")]
    UnsupportedSchemaValue {
        template_id: String,
        schema_key: String,
        found: &'static str,
    },

    #[error("Workspace category '{category}' references unknown node Id '{template_id}'")]
    UnknownCategoryTemplate {
        category: String,
        template_id: String,
    },

    #[error("Variant '{variant_id}' maps value '{value}' to unknown node Id '{template_id}'")]
    UnknownVariantTemplate {
        variant_id: String,
        value: String,
        template_id: String,
    },

    #[error(
        "Variant value '{value}' of field '{field_name}' maps to both '{kept}' and '{ignored}'; keeping '{kept}'"
    )]
    ConflictingVariantValue {
        field_name: String,
        value: String,
        kept: String,
        ignored: String,
    },

    #[error("Root '{root_id}' references unknown node type '{node_type}'")]
    UnknownRootTemplate { root_id: String, node_type: String },

    #[error(
        "Constant '{schema_key}' on node '{node_id}' expected '{expected}' but the document holds {found}"
    )]
    ConstantMismatch {
        node_id: String,
        schema_key: String,
        expected: String,
        found: String,
    },

    #[error("Editor metadata references unknown node '{0}'")]
    UnknownMetadataNode(String),

    #[error("Link '{link_id}' endpoint '{endpoint}' does not match any connection")]
    LinkEndpointNotFound { link_id: String, endpoint: String },

    #[error("Node '{0}' repeats an id already on its own ancestor path; kept as raw JSON")]
    CyclicReference(String),

    #[error("Node id '{node_id}' is reused by a different payload; the repeat was parsed as '{renamed}'")]
    ConflictingNodeId { node_id: String, renamed: String },

    #[error("Ignoring malformed metadata in {section}: {message}")]
    MalformedMetadata {
        section: &'static str,
        message: String,
    },
}
