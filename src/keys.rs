//! Reserved runtime keys of the asset document format and the schema-key
//! namespacing rule.
//!
//! Every JSON key starting with [`RESERVED_PREFIX`] is structural: it belongs to
//! the editor (node ids, positions, the metadata side channel) and is never
//! read as a field or pin schema key.
//!
//! # The `$Pin` suffix
//!
//! A node definition's `Schema` object may need to declare the same runtime key
//! twice, once for a content field and once for an output pin (for instance a
//! `Material` key that holds either a literal or a nested node). JSON objects
//! cannot repeat a key, so the pin entry is written as `Material$Pin`. The
//! suffix is a namespacing marker only: [`runtime_schema_key`] strips it once,
//! when the catalog is built, and only the stripped key is ever used to read or
//! write document values.

use serde_json::Value;

pub const RESERVED_PREFIX: char = '$';
pub const PIN_KEY_SUFFIX: &str = "$Pin";

pub const NODE_ID: &str = "$NodeId";
pub const POSITION: &str = "$Position";
pub const POSITION_X: &str = "$x";
pub const POSITION_Y: &str = "$y";
pub const COMMENT: &str = "$Comment";
pub const TITLE: &str = "$Title";

pub const NODE_EDITOR_METADATA: &str = "$NodeEditorMetadata";
pub const NODES: &str = "$Nodes";
pub const FLOATING_NODES: &str = "$FloatingNodes";
pub const LINKS: &str = "$Links";
pub const GROUPS: &str = "$Groups";
pub const COMMENTS: &str = "$Comments";
pub const WORKSPACE_ID: &str = "$WorkspaceID";

/// Returns `true` for keys owned by the editor rather than the asset schema.
pub fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// Maps a declared schema key to the key used in documents.
///
/// `"Next$Pin"` becomes `"Next"`. A key that would be empty after stripping is
/// returned unchanged (trimmed).
pub fn runtime_schema_key(schema_key: &str) -> &str {
    let trimmed = schema_key.trim();
    match trimmed.strip_suffix(PIN_KEY_SUFFIX) {
        Some(stripped) if !stripped.trim().is_empty() => stripped.trim(),
        _ => trimmed,
    }
}

/// Reads a trimmed, non-empty string out of a JSON value.
pub(crate) fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// Trims a string slice, discarding it when empty.
pub(crate) fn non_empty(candidate: &str) -> Option<&str> {
    Some(candidate.trim()).filter(|s| !s.is_empty())
}

/// A short name for a JSON value's type, used in diagnostics.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_pin_suffix_once() {
        assert_eq!(runtime_schema_key("Next$Pin"), "Next");
        assert_eq!(runtime_schema_key("  Inputs$Pin "), "Inputs");
        assert_eq!(runtime_schema_key("Next"), "Next");
        assert_eq!(runtime_schema_key("$Pin"), "$Pin");
        assert_eq!(runtime_schema_key("A$Pin$Pin"), "A$Pin");
    }

    #[test]
    fn reserved_keys_use_prefix() {
        assert!(is_reserved(NODE_ID));
        assert!(is_reserved("$Anything"));
        assert!(!is_reserved("Type"));
    }
}
