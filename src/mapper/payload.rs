//! Helpers over embedded node payload trees.
//!
//! A node payload is any JSON object carrying a `$NodeId`. The editor metadata
//! object is never searched: its entries describe nodes, they are not nodes.

use crate::keys;
use ahash::AHashSet;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Node payloads keyed by node id.
pub type PayloadMap = BTreeMap<String, Map<String, Value>>;

/// The persisted id of a payload, if it has one.
pub fn read_node_id(value: &Value) -> Option<&str> {
    value
        .as_object()
        .and_then(|payload| payload.get(keys::NODE_ID))
        .and_then(keys::non_empty_str)
}

/// Collects every embedded payload by id. The first occurrence of an id wins.
pub fn collect_payloads_by_id(root: &Value) -> PayloadMap {
    let mut payloads = PayloadMap::new();
    visit_payloads(root, &mut |id, payload| {
        payloads
            .entry(id.to_string())
            .or_insert_with(|| payload.clone());
    });
    payloads
}

/// Adds every `$NodeId` found in the tree to `ids`.
pub fn collect_node_ids(root: &Value, ids: &mut AHashSet<String>) {
    visit_payloads(root, &mut |id, _| {
        ids.insert(id.to_string());
    });
}

fn visit_payloads<'v>(value: &'v Value, visit: &mut impl FnMut(&'v str, &'v Map<String, Value>)) {
    match value {
        Value::Array(items) => {
            for item in items {
                visit_payloads(item, visit);
            }
        }
        Value::Object(object) => {
            if let Some(id) = object.get(keys::NODE_ID).and_then(keys::non_empty_str) {
                visit(id, object);
            }
            for (key, child) in object {
                if key != keys::NODE_EDITOR_METADATA {
                    visit_payloads(child, visit);
                }
            }
        }
        _ => {}
    }
}

/// Returns a copy of the tree with every payload whose id has a replacement
/// swapped for it. Replacements are not searched again.
pub fn rewrite_payload_tree(root: &Value, replacements: &PayloadMap) -> Value {
    match root {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| rewrite_payload_tree(item, replacements))
                .collect(),
        ),
        Value::Object(object) => {
            if let Some(replacement) = object
                .get(keys::NODE_ID)
                .and_then(keys::non_empty_str)
                .and_then(|id| replacements.get(id))
            {
                let mut rewritten = replacement.clone();
                // The document root keeps its side channel.
                if let Some(metadata) = object.get(keys::NODE_EDITOR_METADATA) {
                    rewritten
                        .entry(keys::NODE_EDITOR_METADATA)
                        .or_insert_with(|| metadata.clone());
                }
                return Value::Object(rewritten);
            }
            Value::Object(
                object
                    .iter()
                    .map(|(key, child)| {
                        let child = if key == keys::NODE_EDITOR_METADATA {
                            child.clone()
                        } else {
                            rewrite_payload_tree(child, replacements)
                        };
                        (key.clone(), child)
                    })
                    .collect(),
            )
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> Value {
        json!({
            "$NodeId": "Root-1",
            "Next": {"$NodeId": "Child-1", "Value": 1},
            "Items": [{"$NodeId": "Child-2"}, {"$NodeId": "Child-1", "Value": 99}],
            "$NodeEditorMetadata": {"$FloatingNodes": [{"$NodeId": "Floating-1"}]}
        })
    }

    #[test]
    fn first_occurrence_wins_and_metadata_is_skipped() {
        let payloads = collect_payloads_by_id(&tree());
        assert_eq!(
            payloads.keys().collect::<Vec<_>>(),
            vec!["Child-1", "Child-2", "Root-1"]
        );
        assert_eq!(payloads["Child-1"]["Value"], json!(1));
    }

    #[test]
    fn rewrite_replaces_whole_subtrees() {
        let mut replacements = PayloadMap::new();
        replacements.insert(
            "Child-1".to_string(),
            json!({"$NodeId": "Child-1", "Value": 2}).as_object().unwrap().clone(),
        );
        let rewritten = rewrite_payload_tree(&tree(), &replacements);
        assert_eq!(rewritten["Next"]["Value"], json!(2));
        assert_eq!(rewritten["Items"][1]["Value"], json!(2));
        assert_eq!(rewritten["$NodeEditorMetadata"], tree()["$NodeEditorMetadata"]);
    }
}
