//! Serialization and round-trip tests
//!
//! Parsed graphs written back into documents, including edits made in between.
mod common;
use common::*;
use kumiki::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

#[cfg(test)]
mod roundtrip_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip(catalog: &TemplateCatalog, document: &Value, selector: Option<&str>) -> Value {
        let graph = parse(catalog, document, selector);
        serialize(catalog, &graph)
    }

    #[test]
    fn test_terrain_document_round_trips() {
        let catalog = terrain_catalog();
        let document = terrain_document();

        let written = round_trip(&catalog, &document, Some("DensityNode"));

        assert_eq!(without_metadata(written), document);
    }

    #[test]
    fn test_density_chain_round_trips() {
        let catalog = density_catalog();
        let document = json!({"$NodeId": "Density-1", "Value": 0.25, "Next": {"$NodeId": "Density-2"}});

        let written = round_trip(&catalog, &document, Some("Density"));

        assert_eq!(without_metadata(written), document);
    }

    #[test]
    fn test_full_metadata_round_trips() {
        let catalog = density_catalog();
        let document = json!({
            "$NodeId": "Density-1",
            "Next": {"$NodeId": "Density-2", "Value": 0.5},
            "$NodeEditorMetadata": {
                "$Nodes": {
                    "Density-1": {"$Position": {"$x": 10.0, "$y": 20.0}, "$Title": "Start"},
                    "Density-2": {"$Position": {"$x": 200.0, "$y": 20.0}},
                    "Density-9": {"$Position": {"$x": 0.0, "$y": 300.0}},
                    "Density-10": {"$Position": {"$x": 150.0, "$y": 300.0}}
                },
                "$FloatingNodes": [
                    {"$NodeId": "Density-9", "Value": 3.0, "Next": {"$NodeId": "Density-10"}}
                ],
                "$Links": {
                    "Link-1": {
                        "$Position": {"$x": 100.0, "$y": 25.0},
                        "sourceEndpoint": "Density-1:next",
                        "outputConnections": ["Density-2:input"]
                    }
                },
                "$Groups": [
                    {"$NodeId": "Group-1", "$Position": {"$x": 0.0, "$y": 0.0}, "$width": 400.0, "$height": 120.0, "$name": "Chain"}
                ],
                "$Comments": [
                    {"$NodeId": "Comment-1", "$Position": {"$x": 5.0, "$y": 150.0}, "$text": "floating chain below", "$fontSize": 14.0}
                ],
                "$WorkspaceID": "Density",
                "$Zoom": 1.5
            }
        });

        let graph = parse(&catalog, &document, Some("Density"));
        assert!(graph.diagnostics.is_empty());
        let written = serialize(&catalog, &graph);

        assert_eq!(written, document);
    }

    #[test]
    fn test_unknown_payload_is_byte_identical() {
        let catalog = terrain_catalog();
        let document = terrain_document();

        let written = round_trip(&catalog, &document, Some("DensityNode"));

        let original = serde_json::to_string(&document["Inputs"][1]["Layers"]["Warp"]).unwrap();
        let rewritten = serde_json::to_string(&written["Inputs"][1]["Layers"]["Warp"]).unwrap();
        assert_eq!(rewritten, original);
    }

    #[test]
    fn test_raw_payload_keeps_its_id_where_it_was() {
        let catalog = terrain_catalog();
        let document = json!({
            "$NodeId": "Mix-1",
            "Type": "Mix",
            "Layers": {
                "Warp": {"Type": "Warp", "$NodeId": "Warp-d", "K": 1},
                "Bare": {"Type": "Warp", "K": 2, "$Comment": "no id"}
            }
        });

        let written = round_trip(&catalog, &document, Some("DensityNode"));

        for layer in ["Warp", "Bare"] {
            let original = serde_json::to_string(&document["Layers"][layer]).unwrap();
            let rewritten = serde_json::to_string(&written["Layers"][layer]).unwrap();
            assert_eq!(rewritten, original);
        }
    }

    #[test]
    fn test_raw_comment_edit_is_written_in_place() {
        let catalog = terrain_catalog();
        let document = json!({
            "$NodeId": "Mix-1",
            "Type": "Mix",
            "Layers": {"Warp": {"$NodeId": "Warp-d", "$Comment": "old", "K": 1}}
        });
        let mut graph = parse(&catalog, &document, Some("DensityNode"));
        if let Some(NodeData::Raw(raw)) = graph.node_mut("Warp-d").map(|node| &mut node.data) {
            raw.comment = Some("new".to_string());
        }

        let written = serialize(&catalog, &graph);

        assert_eq!(
            serde_json::to_string(&written["Layers"]["Warp"]).unwrap(),
            r#"{"$NodeId":"Warp-d","$Comment":"new","K":1}"#
        );
    }

    #[test]
    fn test_repeated_identical_children_round_trip() {
        let catalog = terrain_catalog();
        let document = json!({
            "$NodeId": "Sum-1",
            "Type": "Sum",
            "Inputs": [
                {"$NodeId": "Constant-1", "Type": "Constant", "Value": 1},
                {"$NodeId": "Constant-1", "Type": "Constant", "Value": 1}
            ]
        });

        let written = round_trip(&catalog, &document, None);

        assert_eq!(without_metadata(written), document);
    }

    #[test]
    fn test_repeated_id_with_different_payload_keeps_both_values() {
        let catalog = terrain_catalog();
        let document = json!({
            "$NodeId": "Sum-1",
            "Type": "Sum",
            "Inputs": [
                {"$NodeId": "Constant-1", "Type": "Constant", "Value": 1},
                {"$NodeId": "Constant-1", "Type": "Constant", "Value": 2}
            ]
        });

        let written = round_trip(&catalog, &document, None);

        let inputs = written["Inputs"].as_array().expect("Inputs array");
        let values: Vec<&Value> = inputs.iter().map(|item| &item["Value"]).collect();
        assert_eq!(values, vec![&json!(1), &json!(2)]);
        assert_eq!(inputs[0]["$NodeId"], json!("Constant-1"));
        assert_ne!(inputs[1]["$NodeId"], json!("Constant-1"));
    }

    #[test]
    fn test_mixed_connection_values_round_trip() {
        let catalog = terrain_catalog();
        let document = json!({
            "$NodeId": "Sum-1",
            "Type": "Sum",
            "Inputs": [{"$NodeId": "Constant-a", "Type": "Constant", "Value": 0.25}, 5]
        });

        let written = round_trip(&catalog, &document, Some("DensityNode"));

        assert_eq!(without_metadata(written), document);
    }

    #[test]
    fn test_metadata_entry_extras_round_trip() {
        let catalog = density_catalog();
        let document = json!({
            "$NodeId": "Density-1",
            "Next": {"$NodeId": "Density-2"},
            "$NodeEditorMetadata": {
                "$Nodes": {
                    "Density-1": {"$Position": {"$x": 0.0, "$y": 0.0}, "$Collapsed": true},
                    "Density-2": {"$Position": {"$x": 200.0, "$y": 0.0}}
                },
                "$Links": {
                    "Link-1": {
                        "$Position": {"$x": 100.0, "$y": 0.0},
                        "sourceEndpoint": "Density-1:next",
                        "targetEndpoint": "Density-2:input",
                        "inputConnections": ["Density-1:next"],
                        "outputConnections": ["Density-2:input"],
                        "$Color": "red"
                    }
                },
                "$Groups": [
                    {"$NodeId": "Group-1", "$Position": {"$x": 0.0, "$y": 0.0}, "$name": "Chain", "$color": "#336699"}
                ],
                "$Comments": [
                    {"$NodeId": "Comment-1", "$Position": {"$x": 5.0, "$y": 150.0}, "$text": "note", "$pinned": true}
                ]
            }
        });

        let graph = parse(&catalog, &document, Some("Density"));
        assert!(graph.diagnostics.is_empty());
        let written = serialize(&catalog, &graph);

        assert_eq!(written, document);
    }

    #[test]
    fn test_cyclic_payload_is_written_back_verbatim() {
        let catalog = density_catalog();
        let document = json!({
            "$NodeId": "Density-1",
            "Next": {
                "$NodeId": "Density-2",
                "Next": {"$NodeId": "Density-1", "Value": 9.0}
            }
        });

        let written = round_trip(&catalog, &document, Some("Density"));

        assert_eq!(without_metadata(written), document);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let catalog = terrain_catalog();
        let document = json!({
            "Type": "Sum",
            "Inputs": [{"Type": "Constant"}, {"Type": "Mix", "Layers": {"A": {"Type": "Constant"}}}]
        });

        let first = parse(&catalog, &document, Some("DensityNode"));
        let second = parse(&catalog, &document, Some("DensityNode"));
        assert_eq!(first, second);

        // Minted ids are persisted, so a second round keeps them.
        let written = serialize(&catalog, &first);
        let reparsed = parse(&catalog, &written, Some("DensityNode"));
        let mut ids: Vec<&str> = first.nodes.iter().map(|node| node.id.as_str()).collect();
        let mut reparsed_ids: Vec<&str> = reparsed.nodes.iter().map(|node| node.id.as_str()).collect();
        ids.sort();
        reparsed_ids.sort();
        assert_eq!(reparsed_ids, ids);
        assert_eq!(edge_triples(&reparsed.edges), edge_triples(&first.edges));
    }

    #[test]
    fn test_edited_field_is_written() {
        let catalog = terrain_catalog();
        let mut graph = parse(&catalog, &terrain_document(), Some("DensityNode"));

        let constant = graph
            .node_mut("Constant-a")
            .and_then(GraphNode::as_data_mut)
            .expect("Constant-a is a data node");
        if let Some(field) = constant.field_mut("Value") {
            field.value = Some(json!(0.75));
        }

        let written = serialize(&catalog, &graph);
        assert_eq!(written["Inputs"][0]["Value"], json!(0.75));
    }

    #[test]
    fn test_new_edge_is_written_in_index_order() {
        let catalog = terrain_catalog();
        let mut graph = parse(&catalog, &terrain_document(), Some("DensityNode"));
        let factory = NodeFactory::new(&catalog);
        let new_id = factory
            .instantiate_in(&mut graph, "Constant", Position::new(0.0, 0.0))
            .expect("Constant template exists");

        graph.edges.push(GraphEdge {
            id: "new-edge".to_string(),
            source: "Sum-root".to_string(),
            source_handle: "inputs".to_string(),
            target: new_id.clone(),
            target_handle: Some("in".to_string()),
            schema_key: Some("Inputs".to_string()),
            map_key: None,
            index: Some(0),
        });
        for edge in graph.edges.iter_mut().filter(|edge| edge.source == "Sum-root") {
            if edge.target != new_id {
                edge.index = edge.index.map(|index| index + 1);
            }
        }

        let written = serialize(&catalog, &graph);
        let inputs: Vec<&str> = written["Inputs"]
            .as_array()
            .expect("Inputs array")
            .iter()
            .filter_map(|item| item["$NodeId"].as_str())
            .collect();
        assert_eq!(inputs, vec![new_id.as_str(), "Constant-a", "Mix-b"]);
        assert_eq!(written["Inputs"][0]["Type"], json!("Constant"));
        assert_eq!(written["Inputs"][0]["Value"], json!(0.5));
    }

    #[test]
    fn test_unattached_node_is_written_as_floating() {
        let catalog = density_catalog();
        let mut graph = parse(&catalog, &json!({"$NodeId": "Density-1"}), Some("Density"));
        let factory = NodeFactory::new(&catalog);
        let new_id = factory
            .instantiate_in(&mut graph, "Density", Position::new(40.0, 50.0))
            .expect("Density template exists");

        let written = serialize(&catalog, &graph);
        let metadata = &written["$NodeEditorMetadata"];

        assert_eq!(
            metadata["$FloatingNodes"],
            json!([{"$NodeId": new_id.clone(), "Value": 1.0, "Type": "Density"}])
        );
        assert_eq!(
            metadata["$Nodes"][new_id.as_str()]["$Position"],
            json!({"$x": 40.0, "$y": 50.0})
        );
    }

    #[test]
    fn test_removed_link_keeps_its_connection() {
        let catalog = density_catalog();
        let document = json!({
            "$NodeId": "Density-1",
            "Next": {"$NodeId": "Density-2"},
            "$NodeEditorMetadata": {
                "$Links": {
                    "Link-1": {"sourceEndpoint": "Density-1:next", "outputConnections": ["Density-2:input"]}
                }
            }
        });
        let mut graph = parse(&catalog, &document, Some("Density"));
        graph.remove_node("Link-1");
        graph.edges.push(GraphEdge {
            id: "direct".to_string(),
            source: "Density-1".to_string(),
            source_handle: "next".to_string(),
            target: "Density-2".to_string(),
            target_handle: Some("input".to_string()),
            schema_key: Some("Next".to_string()),
            map_key: None,
            index: None,
        });

        let written = serialize(&catalog, &graph);

        assert_eq!(written["Next"]["$NodeId"], json!("Density-2"));
        assert!(written["$NodeEditorMetadata"].get("$Links").is_none());
    }

    #[test]
    fn test_legacy_groups_move_into_metadata() {
        let catalog = density_catalog();
        let document = json!({
            "$NodeId": "Density-1",
            "$Groups": [{"$NodeId": "Group-1", "$name": "Old", "$Position": {"$x": 1.0, "$y": 2.0}}]
        });

        let written = round_trip(&catalog, &document, None);

        assert!(written.get("$Groups").is_none());
        assert_eq!(
            written["$NodeEditorMetadata"]["$Groups"],
            json!([{"$NodeId": "Group-1", "$Position": {"$x": 1.0, "$y": 2.0}, "$name": "Old"}])
        );
    }

    #[test]
    fn test_serializer_errors() {
        let catalog = density_catalog();
        let serializer = DocumentSerializer::new(&catalog);

        let mut graph = parse(&catalog, &json!({"$NodeId": "Density-1"}), None);
        graph.root_node_id = "Nowhere".to_string();
        assert_eq!(
            serializer.serialize(&graph),
            Err(DocumentError::MissingRootNode("Nowhere".to_string()))
        );

        graph
            .nodes
            .push(GraphNode::group("Group-1", Position::default(), None));
        graph.root_node_id = "Group-1".to_string();
        assert_eq!(
            serializer.serialize(&graph),
            Err(DocumentError::InvalidRootNode {
                node_id: "Group-1".to_string(),
                kind: "group".to_string(),
            })
        );
    }

    #[test]
    fn test_serialize_to_string_is_pretty_json() {
        let catalog = density_catalog();
        let graph = parse(&catalog, &json!({"$NodeId": "Density-1", "Value": 2.0}), None);

        let text = DocumentSerializer::new(&catalog)
            .serialize_to_string(&graph)
            .expect("serializes");
        let reparsed: Value = serde_json::from_str(&text).expect("valid JSON");

        assert!(text.contains('\n'));
        assert_eq!(reparsed["Value"], json!(2.0));
    }
}
