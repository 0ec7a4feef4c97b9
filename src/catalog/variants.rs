use crate::error::CatalogDiagnostic;
use ahash::AHashMap;
use serde::Serialize;
use std::sync::OnceLock;

/// The field name every workspace treats as a variant identity field.
pub const TYPE_FIELD: &str = "Type";

/// How string values are compared during a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matching {
    Exact,
    IgnoreCase,
}

/// A `(fieldName, value[, variantId])` triple identifying a polymorphic node type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VariantIdentity {
    pub variant_id: Option<String>,
    pub field_name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantOption {
    pub value: String,
    pub template_id: String,
}

/// A declared polymorphic slot: one discriminator field and the templates it selects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantDefinition {
    pub variant_id: String,
    pub field_name: String,
    pub options: Vec<VariantOption>,
}

impl VariantDefinition {
    pub fn template_for(&self, value: &str) -> Option<&str> {
        self.lookup(value, Matching::Exact)
            .or_else(|| self.lookup(value, Matching::IgnoreCase))
    }

    pub fn lookup(&self, value: &str, matching: Matching) -> Option<&str> {
        self.options
            .iter()
            .find(|option| match matching {
                Matching::Exact => option.value == value,
                Matching::IgnoreCase => option.value.eq_ignore_ascii_case(value),
            })
            .map(|option| option.template_id.as_str())
    }
}

/// Value to template id for one variant field, across every variant using it.
#[derive(Debug, Default)]
struct ValueTable {
    field_name: String,
    exact: AHashMap<String, String>,
    ordered: Vec<(String, String)>,
    folded: OnceLock<AHashMap<String, String>>,
}

impl ValueTable {
    fn lookup(&self, value: &str, matching: Matching) -> Option<&str> {
        match matching {
            Matching::Exact => self.exact.get(value).map(String::as_str),
            Matching::IgnoreCase => self
                .folded()
                .get(&value.to_lowercase())
                .map(String::as_str),
        }
    }

    fn folded(&self) -> &AHashMap<String, String> {
        self.folded.get_or_init(|| {
            let mut folded = AHashMap::with_capacity(self.ordered.len());
            for (value, template_id) in &self.ordered {
                folded
                    .entry(value.to_lowercase())
                    .or_insert_with(|| template_id.clone());
            }
            folded
        })
    }
}

/// Derived variant lookups of a catalog.
#[derive(Debug, Default)]
pub struct VariantIndex {
    variants: Vec<VariantDefinition>,
    field_names: Vec<String>,
    tables: Vec<ValueTable>,
    identities_by_template: AHashMap<String, Vec<VariantIdentity>>,
}

impl VariantIndex {
    pub(crate) fn build(
        variants: Vec<VariantDefinition>,
        template_exists: impl Fn(&str) -> bool,
        diagnostics: &mut Vec<CatalogDiagnostic>,
    ) -> Self {
        let mut field_names: Vec<String> = Vec::new();
        for name in variants
            .iter()
            .map(|variant| variant.field_name.as_str())
            .chain(std::iter::once(TYPE_FIELD))
        {
            if !field_names.iter().any(|known| known == name) {
                field_names.push(name.to_string());
            }
        }

        let mut tables: Vec<ValueTable> = field_names
            .iter()
            .map(|name| ValueTable {
                field_name: name.clone(),
                ..ValueTable::default()
            })
            .collect();
        let mut identities_by_template: AHashMap<String, Vec<VariantIdentity>> = AHashMap::new();

        for variant in &variants {
            let Some(table) = tables
                .iter_mut()
                .find(|table| table.field_name == variant.field_name)
            else {
                continue;
            };
            for option in &variant.options {
                if !template_exists(&option.template_id) {
                    diagnostics.push(CatalogDiagnostic::UnknownVariantTemplate {
                        variant_id: variant.variant_id.clone(),
                        value: option.value.clone(),
                        template_id: option.template_id.clone(),
                    });
                    continue;
                }
                match table.exact.get(&option.value) {
                    Some(kept) if kept != &option.template_id => {
                        diagnostics.push(CatalogDiagnostic::ConflictingVariantValue {
                            field_name: variant.field_name.clone(),
                            value: option.value.clone(),
                            kept: kept.clone(),
                            ignored: option.template_id.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        table
                            .exact
                            .insert(option.value.clone(), option.template_id.clone());
                        table
                            .ordered
                            .push((option.value.clone(), option.template_id.clone()));
                    }
                }
                identities_by_template
                    .entry(option.template_id.clone())
                    .or_default()
                    .push(VariantIdentity {
                        variant_id: Some(variant.variant_id.clone()),
                        field_name: variant.field_name.clone(),
                        value: option.value.clone(),
                    });
            }
        }

        for identities in identities_by_template.values_mut() {
            identities.sort();
            identities.dedup();
        }

        Self {
            variants,
            field_names,
            tables,
            identities_by_template,
        }
    }

    pub fn variants(&self) -> &[VariantDefinition] {
        &self.variants
    }

    pub fn variant(&self, variant_id: &str) -> Option<&VariantDefinition> {
        self.variants
            .iter()
            .find(|variant| variant.variant_id == variant_id)
            .or_else(|| {
                self.variants
                    .iter()
                    .find(|variant| variant.variant_id.eq_ignore_ascii_case(variant_id))
            })
    }

    /// Every variant discriminator field, in declaration order, ending with `Type`.
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn is_variant_field(&self, name: &str) -> bool {
        self.field_names.iter().any(|known| known == name)
    }

    /// Declared identities of a template, sorted by variant id, field name then value.
    pub fn identities_for(&self, template_id: &str) -> &[VariantIdentity] {
        self.identities_by_template
            .get(template_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Looks a value up in one field's table.
    pub fn lookup_field_value(
        &self,
        field_name: &str,
        value: &str,
        matching: Matching,
    ) -> Option<&str> {
        self.tables
            .iter()
            .find(|table| table.field_name == field_name)
            .and_then(|table| table.lookup(value, matching))
    }

    /// Looks a value up in every field's table, in field order.
    pub fn lookup_any_field(&self, value: &str, matching: Matching) -> Option<&str> {
        self.tables
            .iter()
            .find_map(|table| table.lookup(value, matching))
    }

    /// Looks a value up in the raw per-variant maps, including options whose
    /// template is unknown.
    pub fn lookup_declared(&self, value: &str, matching: Matching) -> Option<&str> {
        self.variants
            .iter()
            .find_map(|variant| variant.lookup(value, matching))
    }
}
