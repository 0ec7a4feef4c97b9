//! Variant identity resolution.
//!
//! Polymorphic slots in an asset document carry their concrete type in a
//! discriminator field (usually `Type`). The resolver maps a payload to the
//! template that governs it and, in the other direction, decides which
//! discriminator value a template instance is written out with.

use crate::catalog::{Matching, NodeTemplate, TYPE_FIELD, TemplateCatalog, VariantIdentity};
use crate::keys::{self, non_empty, non_empty_str};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Where an identity candidate was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IdentitySource {
    /// The baseline `Type` field.
    TypeField,
    /// A discriminator field declared by a workspace variant.
    WorkspaceField,
    /// The prefix of a persisted node id.
    NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityCandidate {
    pub field_name: String,
    pub value: String,
    pub source: IdentitySource,
}

/// Outcome of forward resolution.
///
/// On a miss `template` is `None` and `identity` holds the first candidate
/// tried, so callers can say what was not found.
#[derive(Debug, Clone)]
pub struct Resolution<'c> {
    pub template: Option<&'c NodeTemplate>,
    pub identity: Option<IdentityCandidate>,
}

pub struct VariantResolver<'c> {
    catalog: &'c TemplateCatalog,
}

impl<'c> VariantResolver<'c> {
    pub fn new(catalog: &'c TemplateCatalog) -> Self {
        Self { catalog }
    }

    /// Identity candidates of a payload, most explicit first.
    ///
    /// The id-prefix candidate is only offered when the payload carries no
    /// discriminator field at all.
    pub fn candidates(
        &self,
        payload: &Map<String, Value>,
        node_id: Option<&str>,
    ) -> Vec<IdentityCandidate> {
        let mut candidates: Vec<IdentityCandidate> = self
            .catalog
            .variant_field_names()
            .iter()
            .filter_map(|field_name| {
                let value = payload.get(field_name).and_then(non_empty_str)?;
                Some(IdentityCandidate {
                    field_name: field_name.clone(),
                    value: value.to_string(),
                    source: if field_name == TYPE_FIELD {
                        IdentitySource::TypeField
                    } else {
                        IdentitySource::WorkspaceField
                    },
                })
            })
            .collect();

        if candidates.is_empty() {
            let persisted = node_id.or_else(|| payload.get(keys::NODE_ID).and_then(Value::as_str));
            if let Some(tag) = persisted.and_then(type_tag_from_node_id) {
                candidates.push(IdentityCandidate {
                    field_name: TYPE_FIELD.to_string(),
                    value: tag.to_string(),
                    source: IdentitySource::NodeId,
                });
            }
        }
        candidates
    }

    /// The first identity candidate of a payload, if any.
    pub fn read_identity(
        &self,
        payload: &Map<String, Value>,
        node_id: Option<&str>,
    ) -> Option<IdentityCandidate> {
        self.candidates(payload, node_id).into_iter().next()
    }

    /// Payload to template.
    ///
    /// Each stage runs over every candidate before the next stage starts:
    /// the candidate's own field, any field, the declared value maps, and
    /// finally the value taken as a template id.
    pub fn resolve(&self, payload: &Map<String, Value>, node_id: Option<&str>) -> Resolution<'c> {
        let candidates = self.candidates(payload, node_id);
        let index = self.catalog.variants();
        let existing = |template_id: Option<&str>| template_id.and_then(|id| self.catalog.template(id));
        let both = [Matching::Exact, Matching::IgnoreCase];

        let found = candidates
            .iter()
            .find_map(|candidate| {
                both.iter().find_map(|&matching| {
                    existing(index.lookup_field_value(
                        &candidate.field_name,
                        &candidate.value,
                        matching,
                    ))
                })
            })
            .or_else(|| {
                candidates.iter().find_map(|candidate| {
                    both.iter().find_map(|&matching| {
                        existing(index.lookup_any_field(&candidate.value, matching))
                    })
                })
            })
            .or_else(|| {
                candidates.iter().find_map(|candidate| {
                    both.iter().find_map(|&matching| {
                        existing(index.lookup_declared(&candidate.value, matching))
                    })
                })
            })
            // Templates no variant declares are still reachable by their own id.
            .or_else(|| {
                candidates
                    .iter()
                    .find_map(|candidate| self.catalog.template(&candidate.value))
            });

        let identity = found
            .and_then(|template| {
                candidates
                    .iter()
                    .find(|candidate| is_identity_of(template, candidate, self.catalog))
            })
            .or_else(|| candidates.first())
            .cloned();
        Resolution {
            template: found,
            identity,
        }
    }

    /// Template to the identity it should be written with.
    pub fn canonical_identity(
        &self,
        template: &NodeTemplate,
        payload: Option<&Map<String, Value>>,
    ) -> VariantIdentity {
        let current = |field_name: &str| {
            payload
                .and_then(|payload| payload.get(field_name))
                .and_then(non_empty_str)
        };
        let declared = self
            .catalog
            .variants()
            .identities_for(&template.template_id);

        if let Some(identity) = declared.iter().find(|identity| {
            current(&identity.field_name).is_some_and(|value| value.eq_ignore_ascii_case(&identity.value))
        }) {
            return identity.clone();
        }
        if let Some(identity) = declared.first() {
            return identity.clone();
        }

        let per_field = template
            .variant_values
            .iter()
            .find(|entry| {
                current(&entry.field_name).is_some_and(|value| value.eq_ignore_ascii_case(&entry.value))
            })
            .or_else(|| template.variant_values.first());
        match per_field {
            Some(entry) => VariantIdentity {
                variant_id: None,
                field_name: entry.field_name.clone(),
                value: entry.value.clone(),
            },
            None => VariantIdentity {
                variant_id: None,
                field_name: TYPE_FIELD.to_string(),
                value: template.schema_type.clone(),
            },
        }
    }

    /// Stamps the canonical identity of `template` onto a payload.
    ///
    /// Other discriminator fields are removed unless the template itself reads
    /// or writes them.
    pub fn write_identity(
        &self,
        payload: &mut Map<String, Value>,
        template: &NodeTemplate,
    ) -> VariantIdentity {
        let identity = self.canonical_identity(template, Some(payload));
        payload.insert(
            identity.field_name.clone(),
            Value::String(identity.value.clone()),
        );

        let runtime_keys = template.runtime_keys();
        for field_name in self.catalog.variant_field_names() {
            if *field_name != identity.field_name && !runtime_keys.contains(field_name.as_str()) {
                payload.shift_remove(field_name);
            }
        }
        identity
    }
}

fn is_identity_of(
    template: &NodeTemplate,
    candidate: &IdentityCandidate,
    catalog: &TemplateCatalog,
) -> bool {
    let value = candidate.value.as_str();
    template.schema_type.eq_ignore_ascii_case(value)
        || template.template_id.eq_ignore_ascii_case(value)
        || template
            .variant_values
            .iter()
            .any(|entry| entry.value.eq_ignore_ascii_case(value))
        || catalog
            .variants()
            .identities_for(&template.template_id)
            .iter()
            .any(|identity| identity.value.eq_ignore_ascii_case(value))
}

const UUID_TEXT_LEN: usize = 36;

/// The type tag a persisted node id carries.
///
/// `Density-0b6e...-uuid` yields `Density` (the tag may itself contain dashes);
/// any other id yields the text before its first `-`.
pub fn type_tag_from_node_id(node_id: &str) -> Option<&str> {
    let node_id = node_id.trim();
    if node_id.len() > UUID_TEXT_LEN + 1 {
        let split = node_id.len() - UUID_TEXT_LEN - 1;
        if node_id.is_char_boundary(split)
            && node_id.as_bytes()[split] == b'-'
            && Uuid::try_parse(&node_id[split + 1..]).is_ok()
        {
            return non_empty(&node_id[..split]);
        }
    }
    node_id.split_once('-').and_then(|(tag, _)| non_empty(tag))
}
