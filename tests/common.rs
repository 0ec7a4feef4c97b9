//! Common test utilities: workspace catalogs and sample documents.
use kumiki::prelude::*;
use serde_json::{Value, json};

/// A one-template workspace: `Density` with a float `Value` and a single
/// `next` output pin stored under `Next`.
#[allow(dead_code)]
pub fn density_catalog() -> TemplateCatalog {
    TemplateCatalog::builder(json!({
        "WorkspaceName": "Density",
        "Roots": {"Density": {"RootNodeType": "Density", "MenuName": "Density"}}
    }))
    .with_definition("Density.json", density_definition())
    .build()
}

#[allow(dead_code)]
pub fn density_definition() -> Value {
    json!({
        "Id": "Density",
        "Title": "Density",
        "Content": [{"Id": "Value", "Type": "Float", "Options": {"Default": 1.0}}],
        "Inputs": [{"Id": "input", "Type": "Flow"}],
        "Outputs": [{"Id": "next", "Type": "Flow"}],
        "Schema": {"Value": "Value", "Next": {"Pin": "next"}}
    })
}

/// The workspace configuration of the terrain fixture.
///
/// Every density node sits behind the `DensityNode` variant, selected by `Type`.
#[allow(dead_code)]
pub fn terrain_config() -> Value {
    json!({
        "WorkspaceName": "Terrain",
        "Roots": {
            "Terrain": {"RootNodeType": "DensityNode", "MenuName": "Terrain Density"},
            "Biome": {"RootNodeType": "Biome", "MenuName": "Biome"}
        },
        "NodeCategories": {
            "Math": ["Sum", "Constant"],
            "Blending": ["Mix"]
        },
        "Variants": {
            "DensityNode": {
                "VariantFieldName": "Type",
                "Variants": {
                    "Constant": "Constant",
                    "Sum": "Sum",
                    "Mix": "Mix",
                    "Noise": "Noise"
                }
            }
        }
    })
}

#[allow(dead_code)]
pub fn terrain_definitions() -> Vec<(&'static str, Value)> {
    vec![
        (
            "Constant.json",
            json!({
                "Id": "Constant",
                "Title": "Constant",
                "Content": [{"Id": "Value", "Type": "Float", "Options": {"Default": 0.5}}],
                "Inputs": [{"Id": "in", "Type": "Density"}],
                "Schema": {"Type": "Constant", "Value": "Value"}
            }),
        ),
        (
            "Sum.json",
            json!({
                "Id": "Sum",
                "Title": "Sum",
                "Inputs": [{"Id": "in", "Type": "Density"}],
                "Outputs": [{"Id": "inputs", "Type": "Density", "Multiple": true}],
                "Schema": {
                    "Type": "Sum",
                    "Mode": "Additive",
                    "Inputs": {"Pin": "inputs", "Node": "DensityNode"}
                }
            }),
        ),
        (
            "Mix.json",
            json!({
                "Id": "Mix",
                "Title": "Mix",
                "Content": [
                    {"Id": "Fallback", "Type": "Float"},
                    {"Id": "Blend", "Type": "Enum", "Options": {"Values": ["Linear", "Smooth"]}}
                ],
                "Inputs": [{"Id": "in", "Type": "Density"}],
                "Outputs": [
                    {"Id": "layers", "Type": "Density", "IsMap": true},
                    {"Id": "fallback", "Type": "Density"}
                ],
                "Schema": {
                    "Type": "Mix",
                    "Blend": "Blend",
                    "Layers": {"Pin": "layers", "Node": "DensityNode"},
                    "Fallback$Pin": {"Pin": "fallback", "Node": "DensityNode"},
                    "Fallback": "Fallback"
                }
            }),
        ),
        (
            "Biome.json",
            json!({
                "Id": "Biome",
                "Title": "Biome",
                "Content": [{"Id": "Name", "Type": "String"}],
                "Outputs": [{"Id": "terrain", "Type": "Density"}],
                "Schema": {
                    "Name": "Name",
                    "Terrain": {"Pin": "terrain", "Node": "DensityNode"}
                }
            }),
        ),
    ]
}

#[allow(dead_code)]
pub fn terrain_catalog() -> TemplateCatalog {
    TemplateCatalog::builder(terrain_config())
        .with_definitions(terrain_definitions())
        .build()
}

/// A sum of a constant and a mix whose layers hold another constant and an
/// unknown `Warp` payload.
#[allow(dead_code)]
pub fn terrain_document() -> Value {
    json!({
        "$NodeId": "Sum-root",
        "Type": "Sum",
        "Mode": "Additive",
        "Inputs": [
            {"$NodeId": "Constant-a", "Type": "Constant", "Value": 0.25},
            {
                "$NodeId": "Mix-b",
                "Type": "Mix",
                "Blend": "Smooth",
                "Layers": {
                    "Ground": {"$NodeId": "Constant-c", "Type": "Constant", "Value": 2},
                    "Warp": {"$NodeId": "Warp-d", "Type": "Warp", "Strength": [1, 2, 3]}
                }
            }
        ],
        "Seed": 42
    })
}

/// Removes the editor side channel so tree-only comparisons stay readable.
#[allow(dead_code)]
pub fn without_metadata(mut document: Value) -> Value {
    if let Some(object) = document.as_object_mut() {
        object.shift_remove("$NodeEditorMetadata");
    }
    document
}

#[allow(dead_code)]
pub fn parse(catalog: &TemplateCatalog, document: &Value, selector: Option<&str>) -> ParsedGraph {
    DocumentParser::new(catalog)
        .parse(document, selector)
        .expect("document should parse")
}

#[allow(dead_code)]
pub fn serialize(catalog: &TemplateCatalog, graph: &ParsedGraph) -> Value {
    DocumentSerializer::new(catalog)
        .serialize(graph)
        .expect("graph should serialize")
}

/// Edges as `(source, source_handle, target)` triples, sorted.
#[allow(dead_code)]
pub fn edge_triples(edges: &[GraphEdge]) -> Vec<(String, String, String)> {
    let mut triples: Vec<_> = edges
        .iter()
        .map(|edge| {
            (
                edge.source.clone(),
                edge.source_handle.clone(),
                edge.target.clone(),
            )
        })
        .collect();
    triples.sort();
    triples
}
