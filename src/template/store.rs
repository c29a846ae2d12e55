//! Template persistence behind a storage trait.
//!
//! The pipeline only needs a handful of lookups: by id, by slug within a
//! tenant-or-core scope, batch by ids, and listings. [`TemplateStore`]
//! captures exactly that surface so a database-backed implementation can be
//! swapped in; [`MemoryStore`] is the concurrent in-memory implementation
//! used by the CLI and tests.

use crate::core::PagewrightError;
use crate::template::model::Template;
use dashmap::DashMap;

/// Storage abstraction for templates.
///
/// Slug lookups follow tenant scoping rules: a tenant sees its own templates
/// plus the shared core set, with its own templates taking precedence when a
/// slug exists in both.
pub trait TemplateStore: Send + Sync {
    /// Insert a new template. Fails if the slug is taken in the owner scope.
    fn insert(&self, template: Template) -> Result<(), PagewrightError>;

    /// Fetch a template by id.
    fn get(&self, id: &str) -> Option<Template>;

    /// Fetch a template by slug, visible to the given tenant.
    fn find_by_slug(&self, slug: &str, tenant_id: Option<&str>) -> Option<Template>;

    /// Batch-fetch templates by id, in one pass. Missing ids are skipped.
    fn get_many(&self, ids: &[String]) -> Vec<Template>;

    /// All templates visible to the tenant (own plus core), sorted by name.
    fn list(&self, tenant_id: Option<&str>) -> Vec<Template>;

    /// Templates owned by exactly this tenant (`None` lists the core set).
    fn list_owned(&self, tenant_id: Option<&str>) -> Vec<Template>;

    /// Replace a stored template.
    fn update(&self, template: Template) -> Result<(), PagewrightError>;

    /// Delete a template by id.
    fn remove(&self, id: &str) -> Result<(), PagewrightError>;
}

/// Concurrent in-memory template store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    templates: DashMap<String, Template>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateStore for MemoryStore {
    fn insert(&self, template: Template) -> Result<(), PagewrightError> {
        let conflict = self.templates.iter().any(|entry| {
            entry.slug == template.slug && entry.tenant_id == template.tenant_id
        });
        if conflict {
            return Err(PagewrightError::SlugInUse {
                slug: template.slug,
            });
        }
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<Template> {
        self.templates.get(id).map(|entry| entry.clone())
    }

    fn find_by_slug(&self, slug: &str, tenant_id: Option<&str>) -> Option<Template> {
        let mut core_match = None;
        for entry in self.templates.iter() {
            if entry.slug != slug {
                continue;
            }
            match (&entry.tenant_id, tenant_id) {
                (Some(owner), Some(tenant)) if owner == tenant => {
                    // Tenant-owned match wins over a core template of the same slug.
                    return Some(entry.clone());
                }
                (None, _) => core_match = Some(entry.clone()),
                _ => {}
            }
        }
        core_match
    }

    fn get_many(&self, ids: &[String]) -> Vec<Template> {
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    fn list(&self, tenant_id: Option<&str>) -> Vec<Template> {
        let mut out: Vec<Template> = self
            .templates
            .iter()
            .filter(|entry| {
                entry.tenant_id.is_none() || entry.tenant_id.as_deref() == tenant_id
            })
            .map(|entry| entry.clone())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    fn list_owned(&self, tenant_id: Option<&str>) -> Vec<Template> {
        let mut out: Vec<Template> = self
            .templates
            .iter()
            .filter(|entry| entry.tenant_id.as_deref() == tenant_id)
            .map(|entry| entry.clone())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    fn update(&self, template: Template) -> Result<(), PagewrightError> {
        if !self.templates.contains_key(&template.id) {
            return Err(PagewrightError::TemplateNotFound {
                id: template.id,
            });
        }
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<(), PagewrightError> {
        self.templates
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PagewrightError::TemplateNotFound {
                id: id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::model::TemplateCategory;

    fn template(slug: &str, tenant: Option<&str>) -> Template {
        Template::new(tenant.map(String::from), slug, slug, TemplateCategory::Section)
    }

    #[test]
    fn test_insert_and_get() {
        let store = MemoryStore::new();
        let t = template("hero", None);
        let id = t.id.clone();
        store.insert(t).unwrap();
        assert_eq!(store.get(&id).unwrap().slug, "hero");
    }

    #[test]
    fn test_slug_conflict_within_scope() {
        let store = MemoryStore::new();
        store.insert(template("hero", Some("a"))).unwrap();

        let err = store.insert(template("hero", Some("a"))).unwrap_err();
        assert!(matches!(err, PagewrightError::SlugInUse { .. }));

        // Same slug in a different scope is fine.
        store.insert(template("hero", Some("b"))).unwrap();
        store.insert(template("hero", None)).unwrap();
    }

    #[test]
    fn test_find_by_slug_prefers_tenant_over_core() {
        let store = MemoryStore::new();
        let core = template("hero", None);
        let core_id = core.id.clone();
        store.insert(core).unwrap();
        let owned = template("hero", Some("a"));
        let owned_id = owned.id.clone();
        store.insert(owned).unwrap();

        assert_eq!(store.find_by_slug("hero", Some("a")).unwrap().id, owned_id);
        assert_eq!(store.find_by_slug("hero", Some("b")).unwrap().id, core_id);
        assert_eq!(store.find_by_slug("hero", None).unwrap().id, core_id);
    }

    #[test]
    fn test_list_scoping() {
        let store = MemoryStore::new();
        store.insert(template("a-core", None)).unwrap();
        store.insert(template("b-own", Some("t1"))).unwrap();
        store.insert(template("c-other", Some("t2"))).unwrap();

        let visible: Vec<String> =
            store.list(Some("t1")).into_iter().map(|t| t.slug).collect();
        assert_eq!(visible, vec!["a-core", "b-own"]);

        let owned: Vec<String> =
            store.list_owned(Some("t1")).into_iter().map(|t| t.slug).collect();
        assert_eq!(owned, vec!["b-own"]);
    }

    #[test]
    fn test_update_missing_fails() {
        let store = MemoryStore::new();
        let err = store.update(template("x", None)).unwrap_err();
        assert!(matches!(err, PagewrightError::TemplateNotFound { .. }));
    }

    #[test]
    fn test_get_many_skips_missing() {
        let store = MemoryStore::new();
        let t = template("hero", None);
        let id = t.id.clone();
        store.insert(t).unwrap();

        let found = store.get_many(&[id, "missing".to_string()]);
        assert_eq!(found.len(), 1);
    }
}
