//! Template and block data model.
//!
//! A [`Template`] is a persisted unit of component source plus compiled
//! artifacts and metadata. Templates owned by a tenant are scoped to that
//! tenant; templates with no owner are shared "core" templates visible to
//! everyone and immutable.
//!
//! Compiled artifacts always reflect the last successfully compiled
//! `source_code`, never the draft. A failed publish records `compile_error`
//! and leaves the previous artifacts in place, so live pages keep rendering
//! the last good version while the author fixes the source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Coarse grouping used by the template picker UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateCategory {
    Layout,
    Section,
    Component,
    Custom,
}

impl Default for TemplateCategory {
    fn default() -> Self {
        Self::Section
    }
}

/// One field definition in a template schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Property key, unique within the schema, identifier-shaped
    pub key: String,
    /// Field type tag ("text", "image", "list", ...)
    #[serde(rename = "type")]
    pub field_type: String,
    /// Human-readable label shown in the editor
    pub label: String,
    /// Whether the editor requires a value
    #[serde(default)]
    pub required: bool,
}

/// Ordered list of field definitions describing a template's props.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSchema {
    #[serde(default)]
    pub fields: Vec<SchemaField>,
}

/// Lifecycle state derived from a template's artifacts and error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateState {
    /// Never successfully published, or only a draft exists
    DraftOnly,
    /// Compiled artifacts present, no error
    PublishedClean,
    /// Last publish failed; `compile_error` is set
    PublishedBroken,
}

/// A persisted template with source, draft, and compiled artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    /// Owning tenant; `None` marks a globally shared core template
    pub tenant_id: Option<String>,
    /// Unique within the owner scope
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub category: TemplateCategory,
    /// Published source the compiled artifacts were produced from
    pub source_code: String,
    /// Work-in-progress source, never compiled until publish
    pub draft_source_code: Option<String>,
    /// Self-contained server bundle, ready for sandbox execution
    pub compiled_server_module: Option<String>,
    /// Client bundle for hydration, when client bundling succeeded
    pub compiled_client_module: Option<String>,
    pub compiled_css: Option<String>,
    pub compile_error: Option<String>,
    pub schema: TemplateSchema,
    /// Property bag used for editor previews
    pub sample_data: Value,
    /// Snapshot of referenced slugs, recomputed at compile time
    pub dependencies: Vec<String>,
    pub is_core: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    /// Create an empty template shell with a fresh id and timestamps.
    #[must_use]
    pub fn new(
        tenant_id: Option<String>,
        slug: impl Into<String>,
        name: impl Into<String>,
        category: TemplateCategory,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            slug: slug.into(),
            name: name.into(),
            description: None,
            category,
            source_code: String::new(),
            draft_source_code: None,
            compiled_server_module: None,
            compiled_client_module: None,
            compiled_css: None,
            compile_error: None,
            schema: TemplateSchema::default(),
            sample_data: Value::Object(serde_json::Map::new()),
            dependencies: Vec::new(),
            is_core: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derive the lifecycle state from artifacts and error.
    #[must_use]
    pub fn state(&self) -> TemplateState {
        if self.compile_error.is_some() {
            TemplateState::PublishedBroken
        } else if self.compiled_server_module.is_some() {
            TemplateState::PublishedClean
        } else {
            TemplateState::DraftOnly
        }
    }

    /// Bump the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn default_props() -> Value {
    Value::Object(serde_json::Map::new())
}

/// An ordered reference from a page or layout region to a template, plus a
/// property bag. The `template_id` may be the reserved form sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub template_id: String,
    #[serde(default = "default_props")]
    pub props: Value,
}

impl Block {
    /// Create a block with a fresh id.
    #[must_use]
    pub fn new(template_id: impl Into<String>, props: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            template_id: template_id.into(),
            props,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_template_is_draft_only() {
        let template = Template::new(None, "hero", "Hero", TemplateCategory::Section);
        assert_eq!(template.state(), TemplateState::DraftOnly);
        assert!(template.tenant_id.is_none());
        assert!(!template.is_core);
    }

    #[test]
    fn test_state_transitions_from_artifacts() {
        let mut template = Template::new(None, "hero", "Hero", TemplateCategory::Section);

        template.compiled_server_module = Some("__component = nil".to_string());
        assert_eq!(template.state(), TemplateState::PublishedClean);

        template.compile_error = Some("boom".to_string());
        assert_eq!(template.state(), TemplateState::PublishedBroken);
    }

    #[test]
    fn test_block_deserializes_without_props() {
        let block: Block = serde_json::from_str(r#"{"id": "b1", "template_id": "t1"}"#).unwrap();
        assert!(block.props.is_object());
    }
}
