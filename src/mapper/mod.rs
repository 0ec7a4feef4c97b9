//! Keeps pin-based graph edges and schema-key child references in sync.
//!
//! Node payloads embed their children under schema keys. The mapper reads
//! those references out as edges ([`extract_schema_edges`]) and writes an edge
//! list back into the payloads ([`apply_schema_edges`]) without a full reparse
//! of the document.

pub mod payload;

pub use payload::{
    PayloadMap, collect_node_ids, collect_payloads_by_id, read_node_id, rewrite_payload_tree,
};

use crate::catalog::{Multiplicity, NodeTemplate, Pin, SchemaConnection, TemplateCatalog};
use crate::document::ids::EdgeIdAllocator;
use crate::document::{GraphEdge, NodeData, ParsedGraph};
use crate::keys;
use crate::resolver::VariantResolver;
use ahash::{AHashMap, AHashSet};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Fallback base for map keys when nothing better is known.
const DEFAULT_MAP_KEY: &str = "Node";

/// Decides which template governs a payload.
pub trait TemplateSource {
    fn template_for(&self, node_id: &str, payload: &Map<String, Value>) -> Option<&NodeTemplate>;
}

impl TemplateSource for TemplateCatalog {
    fn template_for(&self, node_id: &str, payload: &Map<String, Value>) -> Option<&NodeTemplate> {
        VariantResolver::new(self).resolve(payload, Some(node_id)).template
    }
}

/// Templates already assigned to node ids, as a parsed graph knows them.
pub struct AssignedTemplates<'c> {
    catalog: &'c TemplateCatalog,
    by_node: AHashMap<String, String>,
}

impl<'c> AssignedTemplates<'c> {
    pub fn new(catalog: &'c TemplateCatalog) -> Self {
        Self {
            catalog,
            by_node: AHashMap::new(),
        }
    }

    pub fn from_graph(catalog: &'c TemplateCatalog, graph: &ParsedGraph) -> Self {
        let mut assigned = Self::new(catalog);
        for node in &graph.nodes {
            if let NodeData::Data(data) = &node.data {
                assigned.assign(&node.id, &data.template_id);
            }
        }
        assigned
    }

    pub fn assign(&mut self, node_id: &str, template_id: &str) {
        self.by_node
            .insert(node_id.to_string(), template_id.to_string());
    }
}

impl TemplateSource for AssignedTemplates<'_> {
    fn template_for(&self, node_id: &str, _payload: &Map<String, Value>) -> Option<&NodeTemplate> {
        self.by_node
            .get(node_id)
            .and_then(|template_id| self.catalog.template(template_id))
    }
}

/// First input pin whose type equals the source pin type, else the first input pin.
pub fn choose_compatible_input_handle(
    source_pin_type: Option<&str>,
    input_pins: &[Pin],
) -> Option<String> {
    source_pin_type
        .and_then(|pin_type| {
            input_pins
                .iter()
                .find(|pin| pin.pin_type.as_deref() == Some(pin_type))
        })
        .or_else(|| input_pins.first())
        .map(|pin| pin.id.clone())
}

/// Whether a connection value holds child payloads laid out the way the
/// multiplicity expects: one object, an array of objects, or an object of
/// objects. Anything else is opaque data the mapper never rewrites.
pub fn holds_children(value: &Value, multiplicity: Multiplicity) -> bool {
    fn is_node(value: &Value) -> bool {
        value.as_object().is_some_and(|payload| !payload.is_empty())
    }
    match (multiplicity, value) {
        (Multiplicity::Single, value) => is_node(value),
        (Multiplicity::Multiple, Value::Array(items)) => {
            !items.is_empty() && items.iter().all(is_node)
        }
        (Multiplicity::Map, Value::Object(entries)) => {
            !entries.is_empty()
                && !entries.contains_key(keys::NODE_ID)
                && entries.values().all(is_node)
        }
        _ => false,
    }
}

/// A child reference stored under a connection key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedEntry {
    pub node_id: String,
    pub map_key: Option<String>,
}

/// Reads the child ids stored in a connection value.
///
/// Arrays yield their elements, an object with its own `$NodeId` is a single
/// child, and any other object yields its values (keyed for map connections).
pub fn read_linked_entries(value: &Value, multiplicity: Multiplicity) -> Vec<LinkedEntry> {
    let entry = |node_id: &str, map_key: Option<&String>| LinkedEntry {
        node_id: node_id.to_string(),
        map_key: map_key.cloned(),
    };
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(read_node_id)
            .map(|node_id| entry(node_id, None))
            .collect(),
        Value::Object(_) if read_node_id(value).is_some() => {
            read_node_id(value).map(|node_id| entry(node_id, None)).into_iter().collect()
        }
        Value::Object(object) => object
            .iter()
            .filter_map(|(key, child)| {
                let node_id = read_node_id(child)?;
                let map_key = (multiplicity == Multiplicity::Map).then_some(key);
                Some(entry(node_id, map_key))
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Reads every child reference of every payload as an edge.
///
/// Payloads are visited in id order and references to payloads missing from
/// the map are skipped.
pub fn extract_schema_edges(payloads: &PayloadMap, templates: &impl TemplateSource) -> Vec<GraphEdge> {
    let mut edge_ids = EdgeIdAllocator::default();
    let mut edges = Vec::new();
    for (node_id, payload) in payloads {
        let Some(template) = templates.template_for(node_id, payload) else {
            continue;
        };
        for connection in template.connections() {
            let Some(value) = payload
                .get(&connection.schema_key)
                .filter(|value| holds_children(value, connection.multiplicity))
            else {
                continue;
            };
            let entries = read_linked_entries(value, connection.multiplicity);
            for (item_index, entry) in entries.into_iter().enumerate() {
                let Some(target_payload) = payloads.get(&entry.node_id) else {
                    continue;
                };
                let target_handle = templates
                    .template_for(&entry.node_id, target_payload)
                    .and_then(|target| {
                        choose_compatible_input_handle(
                            connection.pin_type.as_deref(),
                            &target.input_pins,
                        )
                    });
                let item = match connection.multiplicity {
                    Multiplicity::Map => format!(
                        "{item_index}:{}",
                        entry.map_key.as_deref().unwrap_or("map")
                    ),
                    _ => item_index.to_string(),
                };
                let id = edge_ids.unique(format!(
                    "{node_id}:{}:{}:{item}->{}:{}",
                    connection.output_pin_id,
                    connection.schema_key,
                    entry.node_id,
                    target_handle.as_deref().unwrap_or("target")
                ));
                edges.push(GraphEdge {
                    id,
                    source: node_id.clone(),
                    source_handle: connection.output_pin_id.clone(),
                    target: entry.node_id,
                    target_handle,
                    schema_key: Some(connection.schema_key.clone()),
                    map_key: match connection.multiplicity {
                        Multiplicity::Map => entry.map_key,
                        _ => None,
                    },
                    index: (connection.multiplicity == Multiplicity::Multiple)
                        .then_some(item_index),
                });
            }
        }
    }
    edges
}

/// A prospective child handed to the caller's map-key and ordering hooks.
pub struct TargetRef<'a> {
    pub source_node_id: &'a str,
    pub connection: &'a SchemaConnection,
    pub target_node_id: &'a str,
    pub target_payload: &'a Map<String, Value>,
    /// Map key carried by the edge that asked for this child.
    pub map_key: Option<&'a str>,
    /// Array index carried by the edge that asked for this child.
    pub index: Option<usize>,
}

type MapKeyResolver<'a> = Box<dyn Fn(&TargetRef<'_>) -> Option<String> + 'a>;
type TargetOrder<'a> = Box<dyn Fn(&TargetRef<'_>, &TargetRef<'_>) -> Ordering + 'a>;

/// Caller hooks for [`apply_schema_edges`].
#[derive(Default)]
pub struct ApplyOptions<'a> {
    map_key_resolver: Option<MapKeyResolver<'a>>,
    target_order: Option<TargetOrder<'a>>,
}

impl<'a> ApplyOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names children newly added to a map connection.
    pub fn with_map_key_resolver(
        mut self,
        resolver: impl Fn(&TargetRef<'_>) -> Option<String> + 'a,
    ) -> Self {
        self.map_key_resolver = Some(Box::new(resolver));
        self
    }

    /// Orders the children of multiple connections. The sort is stable.
    pub fn with_target_order(
        mut self,
        order: impl Fn(&TargetRef<'_>, &TargetRef<'_>) -> Ordering + 'a,
    ) -> Self {
        self.target_order = Some(Box::new(order));
        self
    }
}

/// What to write under one connection key.
#[derive(Debug)]
enum Plan<'e> {
    Remove,
    Single(&'e str),
    Multiple(Vec<&'e str>),
    Map(Vec<(String, &'e str)>),
}

/// Writes an edge list into the payloads' connection keys.
///
/// `edges` is the complete desired state: a connection with no edge loses the
/// children it held. Each edge is one child slot, so the same target may be
/// embedded more than once. Edges whose source or target payload is missing
/// are ignored, and a connection value that does not hold children is left
/// alone unless an edge asks for that connection. Every payload in the result
/// has its children embedded in full.
pub fn apply_schema_edges(
    payloads: &PayloadMap,
    edges: &[GraphEdge],
    templates: &impl TemplateSource,
    options: &ApplyOptions<'_>,
) -> PayloadMap {
    let mut desired: AHashMap<(&str, &str), Vec<&GraphEdge>> = AHashMap::new();
    for edge in edges {
        if edge.source.is_empty() || edge.source_handle.is_empty() || edge.target.is_empty() {
            continue;
        }
        if !payloads.contains_key(&edge.source) || !payloads.contains_key(&edge.target) {
            continue;
        }
        desired
            .entry((edge.source.as_str(), edge.source_handle.as_str()))
            .or_default()
            .push(edge);
    }

    let mut plans: AHashMap<&str, Vec<(&str, Plan<'_>)>> = AHashMap::new();
    for (node_id, payload) in payloads {
        let Some(template) = templates.template_for(node_id, payload) else {
            continue;
        };
        for connection in template.connections() {
            let wanted = desired
                .get(&(node_id.as_str(), connection.output_pin_id.as_str()))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let existing = payload
                .get(&connection.schema_key)
                .filter(|value| holds_children(value, connection.multiplicity))
                .map(|value| read_linked_entries(value, connection.multiplicity))
                .unwrap_or_default();
            if wanted.is_empty() && existing.is_empty() {
                continue;
            }
            let order = merge_linked_order(&existing, wanted);

            let plan = match connection.multiplicity {
                _ if order.is_empty() => Plan::Remove,
                Multiplicity::Single => Plan::Single(order[0].target.as_str()),
                Multiplicity::Multiple => {
                    let mut slots = order;
                    if let Some(compare) = &options.target_order {
                        slots.sort_by(|a, b| {
                            compare(
                                &target_ref(payloads, node_id, connection, a),
                                &target_ref(payloads, node_id, connection, b),
                            )
                        });
                    }
                    Plan::Multiple(slots.into_iter().map(|edge| edge.target.as_str()).collect())
                }
                Multiplicity::Map => {
                    let mut used: AHashSet<String> = AHashSet::new();
                    let mut keyed = Vec::with_capacity(order.len());
                    for edge in order {
                        let kept = existing
                            .iter()
                            .filter(|entry| entry.node_id == edge.target)
                            .filter_map(|entry| entry.map_key.clone())
                            .find(|key| !used.contains(key));
                        let base = kept
                            .or_else(|| {
                                options.map_key_resolver.as_ref().and_then(|resolve| {
                                    resolve(&target_ref(payloads, node_id, connection, edge))
                                })
                            })
                            .unwrap_or_else(|| edge.target.clone());
                        let key = unique_map_key(&base, &used);
                        used.insert(key.clone());
                        keyed.push((key, edge.target.as_str()));
                    }
                    Plan::Map(keyed)
                }
            };
            plans
                .entry(node_id.as_str())
                .or_default()
                .push((connection.schema_key.as_str(), plan));
        }
    }

    let mut materializer = Materializer {
        payloads,
        plans: &plans,
        done: AHashMap::new(),
        ancestors: Vec::new(),
    };
    payloads
        .keys()
        .map(|node_id| (node_id.clone(), materializer.materialize(node_id)))
        .collect()
}

fn target_ref<'a>(
    payloads: &'a PayloadMap,
    source_node_id: &'a str,
    connection: &'a SchemaConnection,
    edge: &'a GraphEdge,
) -> TargetRef<'a> {
    TargetRef {
        source_node_id,
        connection,
        target_node_id: &edge.target,
        target_payload: &payloads[edge.target.as_str()],
        map_key: edge.map_key.as_deref(),
        index: edge.index,
    }
}

/// Wanted slots matching an existing child keep that child's place, one slot
/// per stored entry; the remaining slots are appended in edge order.
fn merge_linked_order<'e>(existing: &[LinkedEntry], wanted: &[&'e GraphEdge]) -> Vec<&'e GraphEdge> {
    let mut taken = vec![false; wanted.len()];
    let mut merged = Vec::with_capacity(wanted.len());
    for entry in existing {
        let slot = wanted
            .iter()
            .enumerate()
            .find(|(slot, edge)| !taken[*slot] && edge.target == entry.node_id)
            .map(|(slot, _)| slot);
        if let Some(slot) = slot {
            taken[slot] = true;
            merged.push(wanted[slot]);
        }
    }
    merged.extend(
        wanted
            .iter()
            .zip(&taken)
            .filter(|(_, taken)| !**taken)
            .map(|(edge, _)| *edge),
    );
    merged
}

/// `base`, else `base_2`, `base_3`... whichever is free.
fn unique_map_key(base: &str, used: &AHashSet<String>) -> String {
    let base = match base.trim() {
        "" => DEFAULT_MAP_KEY,
        trimmed => trimmed,
    };
    if !used.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|suffix| format!("{base}_{suffix}"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Builds payloads with their planned children embedded, bottom-up.
struct Materializer<'p, 'e> {
    payloads: &'p PayloadMap,
    plans: &'p AHashMap<&'e str, Vec<(&'e str, Plan<'e>)>>,
    done: AHashMap<String, Map<String, Value>>,
    ancestors: Vec<String>,
}

impl Materializer<'_, '_> {
    fn materialize(&mut self, node_id: &str) -> Map<String, Value> {
        if let Some(done) = self.done.get(node_id) {
            return done.clone();
        }
        let mut payload = self.payloads.get(node_id).cloned().unwrap_or_default();
        if self.ancestors.iter().any(|ancestor| ancestor == node_id) {
            tracing::warn!("Edges form a cycle through '{}'; embedding it unchanged", node_id);
            return payload;
        }
        let plans = self.plans;
        let Some(node_plans) = plans.get(node_id) else {
            self.done.insert(node_id.to_string(), payload.clone());
            return payload;
        };

        self.ancestors.push(node_id.to_string());
        for (schema_key, plan) in node_plans {
            match plan {
                Plan::Remove => {
                    payload.shift_remove(*schema_key);
                }
                Plan::Single(target) => {
                    let child = self.materialize(target);
                    payload.insert(schema_key.to_string(), Value::Object(child));
                }
                Plan::Multiple(targets) => {
                    let children = targets
                        .iter()
                        .map(|target| Value::Object(self.materialize(target)))
                        .collect();
                    payload.insert(schema_key.to_string(), Value::Array(children));
                }
                Plan::Map(entries) => {
                    let children = entries
                        .iter()
                        .map(|(key, target)| (key.clone(), Value::Object(self.materialize(target))))
                        .collect();
                    payload.insert(schema_key.to_string(), Value::Object(children));
                }
            }
        }
        self.ancestors.pop();

        self.done.insert(node_id.to_string(), payload.clone());
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn edge_to(target: &str) -> GraphEdge {
        GraphEdge {
            id: format!("Sum-1:inputs->{target}"),
            source: "Sum-1".to_string(),
            source_handle: "inputs".to_string(),
            target: target.to_string(),
            target_handle: None,
            schema_key: None,
            map_key: None,
            index: None,
        }
    }

    fn stored(ids: &[&str]) -> Vec<LinkedEntry> {
        ids.iter()
            .map(|id| LinkedEntry {
                node_id: id.to_string(),
                map_key: None,
            })
            .collect()
    }

    fn targets(edges: Vec<&GraphEdge>) -> Vec<&str> {
        edges.iter().map(|edge| edge.target.as_str()).collect()
    }

    #[test]
    fn merge_keeps_existing_order_then_appends() {
        let (a, b, d) = (edge_to("a"), edge_to("b"), edge_to("d"));
        let merged = merge_linked_order(&stored(&["b", "a", "c"]), &[&a, &d, &b]);
        assert_eq!(targets(merged), vec!["b", "a", "d"]);
    }

    #[test]
    fn merge_keeps_one_slot_per_edge() {
        let (x, y) = (edge_to("x"), edge_to("y"));
        let merged = merge_linked_order(&stored(&["x", "x"]), &[&x, &y, &x]);
        assert_eq!(targets(merged), vec!["x", "x", "y"]);

        let merged = merge_linked_order(&stored(&["x", "x"]), &[&x]);
        assert_eq!(targets(merged), vec!["x"]);
    }

    #[test]
    fn only_child_payloads_count_as_children() {
        assert!(holds_children(&json!({"$NodeId": "a"}), Multiplicity::Single));
        assert!(!holds_children(&json!({}), Multiplicity::Single));
        assert!(holds_children(&json!([{"$NodeId": "a"}, {"Type": "b"}]), Multiplicity::Multiple));
        assert!(!holds_children(&json!([{"$NodeId": "a"}, 5]), Multiplicity::Multiple));
        assert!(!holds_children(&json!([]), Multiplicity::Multiple));
        assert!(holds_children(&json!({"A": {"$NodeId": "a"}}), Multiplicity::Map));
        assert!(!holds_children(&json!({"A": {"$NodeId": "a"}, "B": "b"}), Multiplicity::Map));
        assert!(!holds_children(&json!({"$NodeId": "a", "A": {}}), Multiplicity::Map));
    }

    #[test]
    fn map_keys_get_numeric_suffixes() {
        let used: AHashSet<String> = ["Node".to_string(), "Node_2".to_string()].into_iter().collect();
        assert_eq!(unique_map_key("Node", &used), "Node_3");
        assert_eq!(unique_map_key("  ", &AHashSet::new()), "Node");
        assert_eq!(unique_map_key("Other", &used), "Other");
    }

    #[test]
    fn input_handle_prefers_matching_type() {
        let pin = |id: &str, pin_type: &str| Pin {
            id: id.to_string(),
            pin_type: Some(pin_type.to_string()),
            multiplicity: Multiplicity::Single,
            label: id.to_string(),
            color: None,
        };
        let pins = vec![pin("in", "Density"), pin("flow", "Flow")];
        assert_eq!(choose_compatible_input_handle(Some("Flow"), &pins).as_deref(), Some("flow"));
        assert_eq!(choose_compatible_input_handle(Some("Other"), &pins).as_deref(), Some("in"));
        assert_eq!(choose_compatible_input_handle(None, &[]), None);
    }
}
