//! Connection schema mapper tests
//!
//! Reading child references out as edges and writing edge lists back into
//! payloads without a reparse.
mod common;
use common::*;
use kumiki::mapper::{AssignedTemplates, rewrite_payload_tree};
use kumiki::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};

#[cfg(test)]
mod mapper_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn payloads(entries: Vec<Value>) -> PayloadMap {
        entries
            .into_iter()
            .map(|entry| {
                let payload: Map<String, Value> = entry.as_object().cloned().expect("object payload");
                let id = payload["$NodeId"].as_str().expect("payload id").to_string();
                (id, payload)
            })
            .collect()
    }

    fn edge(source: &str, source_handle: &str, target: &str) -> GraphEdge {
        GraphEdge {
            id: format!("{source}:{source_handle}->{target}"),
            source: source.to_string(),
            source_handle: source_handle.to_string(),
            target: target.to_string(),
            target_handle: None,
            schema_key: None,
            map_key: None,
            index: None,
        }
    }

    fn constant(id: &str, value: f64) -> Value {
        json!({"$NodeId": id, "Type": "Constant", "Value": value})
    }

    fn child_ids(value: &Value) -> Vec<String> {
        match value {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| item["$NodeId"].as_str().map(str::to_string))
                .collect(),
            Value::Object(entries) => entries
                .iter()
                .map(|(key, item)| format!("{}={}", key, item["$NodeId"].as_str().unwrap_or("?")))
                .collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_extract_reads_every_connection() {
        let catalog = terrain_catalog();
        let payloads = collect_payloads_by_id(&terrain_document());

        let edges = extract_schema_edges(&payloads, &catalog);

        let ids: Vec<&str> = edges.iter().map(|edge| edge.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "Mix-b:layers:Layers:0:Ground->Constant-c:in",
                "Mix-b:layers:Layers:1:Warp->Warp-d:target",
                "Sum-root:inputs:Inputs:0->Constant-a:in",
                "Sum-root:inputs:Inputs:1->Mix-b:in",
            ]
        );
        assert_eq!(edges[0].map_key.as_deref(), Some("Ground"));
        assert_eq!(edges[0].index, None);
        assert_eq!(edges[3].index, Some(1));
        assert_eq!(edges[3].map_key, None);
    }

    #[test]
    fn test_extract_skips_dangling_targets() {
        let catalog = terrain_catalog();
        let mut payloads = collect_payloads_by_id(&terrain_document());
        payloads.remove("Constant-a");

        let edges = extract_schema_edges(&payloads, &catalog);

        assert!(edges.iter().all(|edge| edge.target != "Constant-a"));
        assert_eq!(edges.len(), 3);
    }

    #[test]
    fn test_two_edges_into_empty_multiple() {
        let catalog = terrain_catalog();
        let payloads = payloads(vec![
            json!({"$NodeId": "Sum-1", "Type": "Sum"}),
            constant("Constant-1", 1.0),
            constant("Constant-2", 2.0),
        ]);
        let edges = vec![
            edge("Sum-1", "inputs", "Constant-2"),
            edge("Sum-1", "inputs", "Constant-1"),
        ];

        let applied = apply_schema_edges(&payloads, &edges, &catalog, &ApplyOptions::new());

        assert_eq!(
            Value::Object(applied["Sum-1"].clone()),
            json!({
                "$NodeId": "Sum-1",
                "Type": "Sum",
                "Inputs": [constant("Constant-2", 2.0), constant("Constant-1", 1.0)]
            })
        );
    }

    #[test]
    fn test_extract_apply_round_trip_for_multiple() {
        let catalog = terrain_catalog();
        let payloads = payloads(vec![
            json!({"$NodeId": "Sum-1", "Type": "Sum"}),
            constant("Constant-1", 1.0),
            constant("Constant-2", 2.0),
            constant("Constant-3", 3.0),
        ]);
        let edges = vec![
            edge("Sum-1", "inputs", "Constant-3"),
            edge("Sum-1", "inputs", "Constant-1"),
            edge("Sum-1", "inputs", "Constant-2"),
        ];

        let applied = apply_schema_edges(&payloads, &edges, &catalog, &ApplyOptions::new());
        let extracted = extract_schema_edges(&applied, &catalog);

        assert_eq!(edge_triples(&extracted), edge_triples(&edges));
        let order: Vec<(&str, Option<usize>)> = extracted
            .iter()
            .map(|edge| (edge.target.as_str(), edge.index))
            .collect();
        assert_eq!(
            order,
            vec![("Constant-3", Some(0)), ("Constant-1", Some(1)), ("Constant-2", Some(2))]
        );
    }

    #[test]
    fn test_existing_order_is_kept_and_new_targets_appended() {
        let catalog = terrain_catalog();
        let payloads = payloads(vec![
            json!({
                "$NodeId": "Sum-1",
                "Type": "Sum",
                "Inputs": [{"$NodeId": "Constant-2"}, {"$NodeId": "Constant-1"}]
            }),
            constant("Constant-1", 1.0),
            constant("Constant-2", 2.0),
            constant("Constant-3", 3.0),
        ]);
        let edges = vec![
            edge("Sum-1", "inputs", "Constant-3"),
            edge("Sum-1", "inputs", "Constant-1"),
            edge("Sum-1", "inputs", "Constant-2"),
        ];

        let applied = apply_schema_edges(&payloads, &edges, &catalog, &ApplyOptions::new());

        assert_eq!(
            child_ids(&applied["Sum-1"]["Inputs"]),
            vec!["Constant-2", "Constant-1", "Constant-3"]
        );
        // Children are embedded in full.
        assert_eq!(applied["Sum-1"]["Inputs"][0], constant("Constant-2", 2.0));
    }

    #[test]
    fn test_target_order_hook() {
        let catalog = terrain_catalog();
        let payloads = payloads(vec![
            json!({"$NodeId": "Sum-1", "Type": "Sum"}),
            constant("Constant-1", 1.0),
            constant("Constant-2", 2.0),
        ]);
        let edges = vec![
            edge("Sum-1", "inputs", "Constant-1"),
            edge("Sum-1", "inputs", "Constant-2"),
        ];
        let options = ApplyOptions::new()
            .with_target_order(|a, b| b.target_node_id.cmp(a.target_node_id));

        let applied = apply_schema_edges(&payloads, &edges, &catalog, &options);

        assert_eq!(
            child_ids(&applied["Sum-1"]["Inputs"]),
            vec!["Constant-2", "Constant-1"]
        );
    }

    #[test]
    fn test_map_keys_are_stable_across_applies() {
        let catalog = terrain_catalog();
        let payloads = payloads(vec![
            json!({
                "$NodeId": "Mix-1",
                "Type": "Mix",
                "Layers": {
                    "Ground": {"$NodeId": "Constant-1"},
                    "Hills": {"$NodeId": "Constant-2"}
                }
            }),
            constant("Constant-1", 1.0),
            constant("Constant-2", 2.0),
            constant("Constant-3", 3.0),
        ]);
        let edges = vec![
            edge("Mix-1", "layers", "Constant-2"),
            edge("Mix-1", "layers", "Constant-3"),
            edge("Mix-1", "layers", "Constant-1"),
        ];

        let once = apply_schema_edges(&payloads, &edges, &catalog, &ApplyOptions::new());
        let twice = apply_schema_edges(&once, &edges, &catalog, &ApplyOptions::new());

        let expected = vec!["Ground=Constant-1", "Hills=Constant-2", "Constant-3=Constant-3"];
        assert_eq!(child_ids(&once["Mix-1"]["Layers"]), expected);
        assert_eq!(child_ids(&twice["Mix-1"]["Layers"]), expected);
    }

    #[test]
    fn test_map_key_resolver_and_suffixes() {
        let catalog = terrain_catalog();
        let payloads = payloads(vec![
            json!({"$NodeId": "Mix-1", "Type": "Mix"}),
            constant("Constant-1", 1.0),
            constant("Constant-2", 2.0),
        ]);
        let edges = vec![
            edge("Mix-1", "layers", "Constant-1"),
            edge("Mix-1", "layers", "Constant-2"),
        ];
        let options = ApplyOptions::new().with_map_key_resolver(|target| {
            target.target_payload.get("Type").and_then(Value::as_str).map(str::to_string)
        });

        let applied = apply_schema_edges(&payloads, &edges, &catalog, &options);

        assert_eq!(
            child_ids(&applied["Mix-1"]["Layers"]),
            vec!["Constant=Constant-1", "Constant_2=Constant-2"]
        );
    }

    #[test]
    fn test_removing_every_edge_clears_the_key() {
        let catalog = terrain_catalog();
        let payloads = collect_payloads_by_id(&terrain_document());

        let applied = apply_schema_edges(&payloads, &[], &catalog, &ApplyOptions::new());

        assert!(!applied["Sum-root"].contains_key("Inputs"));
        assert!(!applied["Mix-b"].contains_key("Layers"));
        assert_eq!(applied["Sum-root"]["Seed"], json!(42));
    }

    #[test]
    fn test_opaque_connection_values_are_left_alone() {
        let catalog = terrain_catalog();
        let payloads = payloads(vec![
            json!({"$NodeId": "Sum-1", "Type": "Sum", "Inputs": [constant("Constant-a", 1.0), 5]}),
            json!({"$NodeId": "Mix-1", "Type": "Mix", "Layers": {"A": constant("Constant-b", 2.0), "B": "flat"}}),
        ]);

        assert!(extract_schema_edges(&payloads, &catalog).is_empty());
        let applied = apply_schema_edges(&payloads, &[], &catalog, &ApplyOptions::new());

        assert_eq!(applied["Sum-1"], payloads["Sum-1"]);
        assert_eq!(applied["Mix-1"], payloads["Mix-1"]);
    }

    #[test]
    fn test_each_edge_is_its_own_slot() {
        let catalog = terrain_catalog();
        let payloads = payloads(vec![
            json!({"$NodeId": "Sum-1", "Type": "Sum"}),
            constant("Constant-1", 1.0),
        ]);
        let edges = vec![
            edge("Sum-1", "inputs", "Constant-1"),
            edge("Sum-1", "inputs", "Constant-1"),
        ];

        let applied = apply_schema_edges(&payloads, &edges, &catalog, &ApplyOptions::new());
        assert_eq!(
            child_ids(&applied["Sum-1"]["Inputs"]),
            vec!["Constant-1", "Constant-1"]
        );

        // Applying the same edges to the written result keeps both slots.
        let mut written = payloads.clone();
        written.insert("Sum-1".to_string(), applied["Sum-1"].clone());
        let reapplied = apply_schema_edges(&written, &edges, &catalog, &ApplyOptions::new());
        assert_eq!(reapplied["Sum-1"], applied["Sum-1"]);
    }

    #[test]
    fn test_dangling_edges_are_ignored() {
        let catalog = terrain_catalog();
        let payloads = payloads(vec![
            json!({"$NodeId": "Sum-1", "Type": "Sum"}),
            constant("Constant-1", 1.0),
        ]);
        let edges = vec![
            edge("Sum-1", "inputs", "Missing-1"),
            edge("Sum-1", "inputs", "Constant-1"),
            edge("Missing-2", "inputs", "Constant-1"),
        ];

        let applied = apply_schema_edges(&payloads, &edges, &catalog, &ApplyOptions::new());

        assert_eq!(child_ids(&applied["Sum-1"]["Inputs"]), vec!["Constant-1"]);
        assert_eq!(applied.len(), 2);
    }

    #[test]
    fn test_single_connection_and_assigned_templates() {
        let catalog = density_catalog();
        let payloads = payloads(vec![
            json!({"$NodeId": "a", "Value": 1.0}),
            json!({"$NodeId": "b", "Value": 2.0}),
        ]);
        let edges = vec![edge("a", "next", "b")];

        // Ids without a type tag need explicit template assignments.
        let unresolved = apply_schema_edges(&payloads, &edges, &catalog, &ApplyOptions::new());
        assert!(!unresolved["a"].contains_key("Next"));

        let mut templates = AssignedTemplates::new(&catalog);
        templates.assign("a", "Density");
        templates.assign("b", "Density");
        let applied = apply_schema_edges(&payloads, &edges, &templates, &ApplyOptions::new());

        assert_eq!(
            Value::Object(applied["a"].clone()),
            json!({"$NodeId": "a", "Value": 1.0, "Next": {"$NodeId": "b", "Value": 2.0}})
        );
        let extracted = extract_schema_edges(&applied, &templates);
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].id, "a:next:Next:0->b:input");
    }

    #[test]
    fn test_rewrite_payload_tree_replaces_edited_payloads() {
        let catalog = terrain_catalog();
        let document = terrain_document();
        let payloads = collect_payloads_by_id(&document);
        let mut edges = extract_schema_edges(&payloads, &catalog);
        edges.retain(|edge| edge.target != "Warp-d");

        let applied = apply_schema_edges(&payloads, &edges, &catalog, &ApplyOptions::new());
        let mut replacements = PayloadMap::new();
        replacements.insert("Sum-root".to_string(), applied["Sum-root"].clone());
        let rewritten = rewrite_payload_tree(&document, &replacements);

        assert_eq!(
            child_ids(&rewritten["Inputs"][1]["Layers"]),
            vec!["Ground=Constant-c"]
        );
        assert_eq!(rewritten["Seed"], json!(42));
    }
}
