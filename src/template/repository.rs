//! Template lifecycle: create, draft, publish, fork, delete.
//!
//! The repository enforces ownership rules and drives the compiler service
//! on publish. Saving a draft never compiles anything; publishing copies
//! the draft (or directly supplied source) into the published source and
//! triggers compile plus bundle, leaving the template Published-Clean or
//! Published-Broken.
//!
//! Core templates (no owning tenant, `is_core` set) are shared across
//! tenants: they reject edits and deletes outright. Tenants customize them
//! by forking, which copies the current published state into a new
//! tenant-owned template.

use crate::compiler::CompilerService;
use crate::core::PagewrightError;
use crate::template::model::{Template, TemplateCategory, TemplateSchema};
use crate::template::schema::validate_schema;
use crate::template::starter::{STARTER_SOURCE, starter_sample_data, starter_schema};
use crate::template::store::TemplateStore;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Input for creating a template.
#[derive(Debug, Clone, Default)]
pub struct NewTemplate {
    pub tenant_id: Option<String>,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub category: TemplateCategory,
    /// Starting source; the seeded starter is used when absent
    pub source_code: Option<String>,
    /// Field schema; the starter schema is used when absent
    pub schema: Option<TemplateSchema>,
    pub sample_data: Option<Value>,
    pub is_core: bool,
}

/// Manages stored templates and their publish lifecycle.
pub struct TemplateRepository {
    store: Arc<dyn TemplateStore>,
    compiler: Arc<CompilerService>,
}

impl TemplateRepository {
    #[must_use]
    pub fn new(store: Arc<dyn TemplateStore>, compiler: Arc<CompilerService>) -> Self {
        Self {
            store,
            compiler,
        }
    }

    /// The underlying store, for read paths.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TemplateStore> {
        &self.store
    }

    /// Create a template seeded with starter source and schema.
    ///
    /// The template starts Draft-only; nothing is compiled until publish.
    pub fn create(&self, new: NewTemplate) -> Result<Template, PagewrightError> {
        let schema = new.schema.unwrap_or_else(starter_schema);
        validate_schema(&schema)?;

        let mut template =
            Template::new(new.tenant_id, new.slug, new.name, new.category);
        template.description = new.description;
        template.source_code = new.source_code.unwrap_or_else(|| STARTER_SOURCE.to_string());
        template.schema = schema;
        template.sample_data = new.sample_data.unwrap_or_else(starter_sample_data);
        template.is_core = new.is_core;

        self.store.insert(template.clone())?;
        debug!(slug = %template.slug, "template created");
        Ok(template)
    }

    /// Save work-in-progress source without touching the published version.
    pub fn save_draft(
        &self,
        id: &str,
        acting_tenant: Option<&str>,
        draft: String,
    ) -> Result<Template, PagewrightError> {
        let mut template = self.require(id)?;
        ensure_editable(&template, acting_tenant)?;

        template.draft_source_code = Some(draft);
        template.touch();
        self.store.update(template.clone())?;
        Ok(template)
    }

    /// Publish a template: copy the draft (or directly supplied source)
    /// into the published source, clear the draft, and compile.
    ///
    /// Returns the stored template, which is Published-Clean on success or
    /// Published-Broken with `compile_error` set on failure.
    pub async fn publish(
        &self,
        id: &str,
        acting_tenant: Option<&str>,
        source: Option<String>,
    ) -> Result<Template, PagewrightError> {
        let mut template = self.require(id)?;
        ensure_editable(&template, acting_tenant)?;

        let source = source
            .or_else(|| template.draft_source_code.take())
            .unwrap_or_else(|| template.source_code.clone());
        template.source_code = source;
        template.draft_source_code = None;
        template.touch();
        self.store.update(template)?;

        self.compiler.compile_and_persist(id).await
    }

    /// Fork a template into a tenant-owned copy of its current published
    /// state. The forked slug gets a `-custom` suffix, extended with a
    /// timestamp when that slug is already taken.
    pub fn fork(&self, id: &str, tenant_id: &str) -> Result<Template, PagewrightError> {
        let original = self.require(id)?;

        let base = format!("{}-custom", original.slug);
        let taken = self
            .store
            .find_by_slug(&base, Some(tenant_id))
            .is_some_and(|existing| existing.tenant_id.as_deref() == Some(tenant_id));
        let slug = if taken {
            format!("{base}-{}", Utc::now().timestamp())
        } else {
            base
        };

        let mut copy = Template::new(
            Some(tenant_id.to_string()),
            slug,
            format!("{} (Custom)", original.name),
            original.category,
        );
        copy.description = original.description.clone();
        copy.source_code = original.source_code.clone();
        copy.compiled_server_module = original.compiled_server_module.clone();
        copy.compiled_client_module = original.compiled_client_module.clone();
        copy.compiled_css = original.compiled_css.clone();
        copy.compile_error = original.compile_error.clone();
        copy.schema = original.schema.clone();
        copy.sample_data = original.sample_data.clone();
        copy.dependencies = original.dependencies.clone();

        self.store.insert(copy.clone())?;
        debug!(from = %original.slug, to = %copy.slug, "template forked");
        Ok(copy)
    }

    /// Delete a template. Core templates cannot be deleted.
    pub fn delete(&self, id: &str, acting_tenant: Option<&str>) -> Result<(), PagewrightError> {
        let template = self.require(id)?;
        if template.is_core {
            return Err(PagewrightError::CoreTemplateImmutable {
                slug: template.slug,
            });
        }
        ensure_owner(&template, acting_tenant)?;
        self.store.remove(id)
    }

    fn require(&self, id: &str) -> Result<Template, PagewrightError> {
        self.store.get(id).ok_or_else(|| PagewrightError::TemplateNotFound {
            id: id.to_string(),
        })
    }
}

fn ensure_editable(
    template: &Template,
    acting_tenant: Option<&str>,
) -> Result<(), PagewrightError> {
    if template.is_core {
        return Err(PagewrightError::CoreTemplateImmutable {
            slug: template.slug.clone(),
        });
    }
    ensure_owner(template, acting_tenant)
}

fn ensure_owner(template: &Template, acting_tenant: Option<&str>) -> Result<(), PagewrightError> {
    if template.tenant_id.as_deref() != acting_tenant {
        return Err(PagewrightError::NotTemplateOwner {
            slug: template.slug.clone(),
        });
    }
    Ok(())
}
