//! The immutable per-workspace template catalog.
//!
//! A catalog is built once through [`CatalogBuilder`] and then shared
//! read-only by the resolver, the document parser and the connection mapper.

mod builder;
pub mod definition;
pub mod template;
pub mod variants;

pub use builder::CatalogBuilder;
pub use template::{
    FieldDefinition, FieldKind, FieldMapping, Multiplicity, NodeTemplate, Pin, SchemaConnection,
    SchemaConstant, SchemaValue, VariantFieldValue,
};
pub use variants::{
    Matching, TYPE_FIELD, VariantDefinition, VariantIdentity, VariantIndex, VariantOption,
};

use crate::error::CatalogDiagnostic;
use ahash::AHashMap;
use itertools::Itertools;
use serde::Serialize;
use serde_json::Value;

/// Category assigned to templates no `NodeCategories` entry lists.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// A root node type a workspace can open documents with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Root {
    pub root_id: String,
    /// Template id or variant id used as the selector of the document root.
    pub root_node_type: String,
    pub menu_name: Option<String>,
}

#[derive(Debug, Default)]
pub struct TemplateCatalog {
    workspace_name: Option<String>,
    templates: Vec<NodeTemplate>,
    index_by_id: AHashMap<String, usize>,
    index_by_folded_id: AHashMap<String, usize>,
    roots: Vec<Root>,
    variants: VariantIndex,
    diagnostics: Vec<CatalogDiagnostic>,
}

impl TemplateCatalog {
    pub fn builder(config: Value) -> CatalogBuilder {
        CatalogBuilder::new(config)
    }

    /// A catalog without any template. Callers treat it as "use your defaults".
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        workspace_name: Option<String>,
        templates: Vec<NodeTemplate>,
        roots: Vec<Root>,
        variants: VariantIndex,
        diagnostics: Vec<CatalogDiagnostic>,
    ) -> Self {
        let mut index_by_id = AHashMap::with_capacity(templates.len());
        let mut index_by_folded_id = AHashMap::with_capacity(templates.len());
        for (index, template) in templates.iter().enumerate() {
            index_by_id.insert(template.template_id.clone(), index);
            index_by_folded_id
                .entry(template.template_id.to_lowercase())
                .or_insert(index);
        }
        Self {
            workspace_name,
            templates,
            index_by_id,
            index_by_folded_id,
            roots,
            variants,
            diagnostics,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn workspace_name(&self) -> Option<&str> {
        self.workspace_name.as_deref()
    }

    /// Templates in presentation order: categorized first, then `Uncategorized`.
    pub fn templates(&self) -> &[NodeTemplate] {
        &self.templates
    }

    /// Template by id, exact match first, then case-insensitive.
    pub fn template(&self, template_id: &str) -> Option<&NodeTemplate> {
        self.index_by_id
            .get(template_id)
            .or_else(|| self.index_by_folded_id.get(&template_id.to_lowercase()))
            .map(|&index| &self.templates[index])
    }

    /// Templates whose schema type, declared variant value or id equals `type_name`,
    /// ignoring case.
    pub fn templates_by_type_name(&self, type_name: &str) -> Vec<&NodeTemplate> {
        self.templates
            .iter()
            .filter(|template| {
                template.schema_type.eq_ignore_ascii_case(type_name)
                    || template.template_id.eq_ignore_ascii_case(type_name)
                    || template
                        .variant_values
                        .iter()
                        .any(|entry| entry.value.eq_ignore_ascii_case(type_name))
            })
            .collect()
    }

    /// Templates a child slot accepts: the named template, every option of the
    /// named variant, or the whole catalog when there is no selector.
    pub fn templates_for_selector(&self, selector: Option<&str>) -> Vec<&NodeTemplate> {
        let Some(selector) = selector else {
            return self.templates.iter().collect();
        };
        if let Some(template) = self.template(selector) {
            return vec![template];
        }
        match self.variants.variant(selector) {
            Some(variant) => variant
                .options
                .iter()
                .filter_map(|option| self.template(&option.template_id))
                .unique_by(|template| template.template_id.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn roots(&self) -> &[Root] {
        &self.roots
    }

    pub fn root(&self, root_id: &str) -> Option<&Root> {
        self.roots.iter().find(|root| root.root_id == root_id)
    }

    /// Roots are persisted in documents under their menu name (`$WorkspaceID`).
    pub fn root_by_menu_name(&self, menu_name: &str) -> Option<&Root> {
        self.roots
            .iter()
            .find(|root| root.menu_name.as_deref() == Some(menu_name))
            .or_else(|| self.root(menu_name))
    }

    /// The template a new document starts from: the first root's node type
    /// (or the first option of the variant it names), else the first template.
    pub fn default_template(&self) -> Option<&NodeTemplate> {
        self.roots
            .iter()
            .find_map(|root| {
                self.templates_for_selector(Some(&root.root_node_type))
                    .into_iter()
                    .next()
            })
            .or_else(|| self.templates.first())
    }

    pub fn variants(&self) -> &VariantIndex {
        &self.variants
    }

    pub fn variant(&self, variant_id: &str) -> Option<&VariantDefinition> {
        self.variants.variant(variant_id)
    }

    pub fn variant_field_names(&self) -> &[String] {
        self.variants.field_names()
    }

    pub fn diagnostics(&self) -> &[CatalogDiagnostic] {
        &self.diagnostics
    }

    pub fn diagnostic_messages(&self) -> Vec<String> {
        self.diagnostics.iter().map(ToString::to_string).collect()
    }
}
