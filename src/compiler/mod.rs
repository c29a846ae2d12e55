//! Template compilation orchestration.
//!
//! [`CompilerService`] drives the external compiler and bundler
//! collaborators for three workflows:
//!
//! - **Preview**: an ephemeral compile, bundle, sandbox render, and sanitize
//!   pass used by the editor; nothing is persisted.
//! - **Publish**: compile a template's published source, bundle it, and
//!   store the artifacts. Failures are recorded on the template as
//!   `compile_error` and never thrown past this service.
//! - **Batch recompile**: compile a tenant's templates in dependency order,
//!   so each template's cross-template imports resolve against modules that
//!   were just compiled.
//!
//! On a failed compile the previously good artifacts are retained. Live
//! pages keep serving the last published version that worked while the
//! author sees the error in the editor.

pub mod codegen;
pub mod component;
pub mod parse;

use crate::bundler::BundlerService;
use crate::core::PagewrightError;
use crate::render::sanitize::sanitize_rendered_html;
use crate::resolver::{DependencyGraph, extract_dependencies};
use crate::sandbox::SandboxExecutor;
use crate::template::model::{Template, TemplateSchema};
use crate::template::store::TemplateStore;
use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub use component::{
    CompiledComponent, ComponentCompiler, DependencyLookup, MarkupCompiler, NoDependencies,
};

/// Failure reported by a component compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The source was rejected, with an optional 1-based line
    Source {
        message: String,
        line: Option<usize>,
    },
    /// A referenced template could not be resolved
    MissingDependency {
        slug: String,
    },
}

impl CompileError {
    pub(crate) fn source(message: impl Into<String>, line: Option<usize>) -> Self {
        Self::Source {
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source {
                message,
                line: Some(line),
            } => write!(f, "{message} (line {line})"),
            Self::Source {
                message, ..
            } => write!(f, "{message}"),
            Self::MissingDependency {
                slug,
            } => {
                write!(f, "missing dependency '{slug}': no compiled source available")
            }
        }
    }
}

impl std::error::Error for CompileError {}

impl From<CompileError> for PagewrightError {
    fn from(err: CompileError) -> Self {
        match err {
            CompileError::Source {
                message,
                line,
            } => Self::Compile {
                message,
                line,
            },
            CompileError::MissingDependency {
                slug,
            } => Self::MissingDependency {
                slug,
            },
        }
    }
}

/// Result of an ephemeral preview compile and render.
#[derive(Debug, Clone)]
pub struct PreviewRender {
    /// Sanitized markup rendered from the sample data
    pub html: String,
    /// Scoped CSS for the preview
    pub css: String,
    /// Compiler warnings surfaced to the author
    pub warnings: Vec<String>,
}

/// Outcome of a batch recompile.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Slugs compiled cleanly
    pub compiled: Vec<String>,
    /// Slugs whose compile or bundle failed, with the recorded error
    pub failed: Vec<(String, String)>,
    /// Slugs skipped, with the reason
    pub skipped: Vec<(String, String)>,
}

/// Orchestrates compilation, bundling, and artifact persistence.
pub struct CompilerService {
    store: Arc<dyn TemplateStore>,
    compiler: Arc<dyn ComponentCompiler>,
    bundler: Arc<BundlerService>,
    sandbox: Arc<SandboxExecutor>,
}

impl CompilerService {
    #[must_use]
    pub fn new(
        store: Arc<dyn TemplateStore>,
        compiler: Arc<dyn ComponentCompiler>,
        bundler: Arc<BundlerService>,
        sandbox: Arc<SandboxExecutor>,
    ) -> Self {
        Self {
            store,
            compiler,
            bundler,
            sandbox,
        }
    }

    /// Compile, bundle, and render source with sample data, persisting
    /// nothing. Used for live editing previews.
    pub async fn compile_for_preview(
        &self,
        tenant_id: Option<&str>,
        source: &str,
        schema: &TemplateSchema,
        sample_data: &Value,
    ) -> Result<PreviewRender, PagewrightError> {
        let lookup = ModuleCache::new(self, tenant_id.map(String::from));
        let compiled = self.compiler.compile(source, schema, &lookup)?;
        let bundle = self.bundler.bundle_component(&compiled)?;

        let rendered = self.sandbox.render(&bundle.server, sample_data).await;
        if let Some(error) = rendered.error {
            return Err(PagewrightError::SandboxRuntime {
                message: error,
            });
        }

        Ok(PreviewRender {
            html: sanitize_rendered_html(&rendered.markup),
            css: if compiled.css.is_empty() {
                rendered.styles
            } else {
                compiled.css
            },
            warnings: compiled.warnings,
        })
    }

    /// Compile a template's published source and store the outcome.
    ///
    /// On success the artifacts are replaced and `compile_error` cleared; on
    /// failure the error is recorded and previous artifacts are retained.
    /// The dependency snapshot is recomputed either way.
    pub async fn compile_and_persist(
        &self,
        template_id: &str,
    ) -> Result<Template, PagewrightError> {
        let template =
            self.store.get(template_id).ok_or_else(|| PagewrightError::TemplateNotFound {
                id: template_id.to_string(),
            })?;
        let lookup = ModuleCache::new(self, template.tenant_id.clone());
        self.compile_and_persist_with(&lookup, template).await
    }

    async fn compile_and_persist_with(
        &self,
        lookup: &ModuleCache<'_>,
        mut template: Template,
    ) -> Result<Template, PagewrightError> {
        let dependencies = extract_dependencies(&template.source_code);
        debug!(slug = %template.slug, dependencies = dependencies.len(), "compiling template");

        match self.compiler.compile(&template.source_code, &template.schema, lookup) {
            Ok(compiled) => {
                lookup.prime(&template.slug, Some(compiled.server_module.clone()));
                match self.bundler.bundle_component(&compiled) {
                    Ok(bundle) => {
                        template.compiled_server_module = Some(bundle.server);
                        template.compiled_client_module = bundle.client;
                        template.compiled_css =
                            (!compiled.css.is_empty()).then(|| compiled.css.clone());
                        template.compile_error = None;
                    }
                    Err(err) => {
                        warn!(slug = %template.slug, error = %err, "bundling failed");
                        template.compile_error = Some(err.to_string());
                    }
                }
            }
            Err(err) => {
                warn!(slug = %template.slug, error = %err, "compilation failed");
                lookup.prime(&template.slug, None);
                template.compile_error = Some(err.to_string());
            }
        }

        template.dependencies = dependencies;
        template.touch();
        self.store.update(template.clone())?;
        Ok(template)
    }

    /// Recompile a tenant's templates in dependency order.
    ///
    /// A slug with no resolvable source is skipped with a logged reason; one
    /// template's failure never aborts the batch.
    pub async fn compile_all_for_tenant(
        &self,
        tenant_id: Option<&str>,
    ) -> Result<BatchSummary, PagewrightError> {
        let templates = self.store.list_owned(tenant_id);

        let mut graph = DependencyGraph::new();
        for template in &templates {
            graph.add_template(&template.slug, &extract_dependencies(&template.source_code));
        }
        let topo = graph.topological_order();

        let lookup = ModuleCache::new(self, tenant_id.map(String::from));
        let mut summary = BatchSummary::default();

        for slug in &topo.order {
            let Some(template) = templates.iter().find(|t| &t.slug == slug) else {
                // A dependency outside this batch: visible core templates
                // resolve through the lookup; anything else has no source.
                if self.store.find_by_slug(slug, tenant_id).is_none() {
                    debug!(slug = %slug, "referenced template has no resolvable source; skipping");
                    summary.skipped.push((slug.clone(), "no resolvable source".to_string()));
                }
                continue;
            };

            if template.source_code.trim().is_empty() {
                debug!(slug = %slug, "template has no published source; skipping");
                summary.skipped.push((slug.clone(), "no published source".to_string()));
                continue;
            }

            let updated = self.compile_and_persist_with(&lookup, template.clone()).await?;
            match updated.compile_error {
                None => summary.compiled.push(slug.clone()),
                Some(error) => summary.failed.push((slug.clone(), error)),
            }
        }

        Ok(summary)
    }
}

/// Dependency lookup backed by the template store with per-batch memoization.
///
/// Batch compilation walks templates in dependency order, so by the time a
/// dependent asks for a slug the module is normally already cached from the
/// dependency's own compile. Outside a batch, or for visible core
/// templates, the module is compiled from stored source on demand. A cycle
/// reached during on-demand compilation resolves to `None`, which surfaces
/// as a missing dependency on the template that closed the cycle.
struct ModuleCache<'a> {
    service: &'a CompilerService,
    tenant_id: Option<String>,
    modules: DashMap<String, Option<String>>,
    in_progress: DashMap<String, ()>,
}

impl<'a> ModuleCache<'a> {
    fn new(service: &'a CompilerService, tenant_id: Option<String>) -> Self {
        Self {
            service,
            tenant_id,
            modules: DashMap::new(),
            in_progress: DashMap::new(),
        }
    }

    /// Record a compile outcome so later resolutions reuse it. Batch
    /// compilation calls this as it walks the dependency order.
    fn prime(&self, slug: &str, module: Option<String>) {
        self.modules.insert(slug.to_string(), module);
    }
}

impl DependencyLookup for ModuleCache<'_> {
    fn resolve(&self, slug: &str) -> Option<String> {
        if let Some(cached) = self.modules.get(slug) {
            return cached.clone();
        }

        if self.in_progress.insert(slug.to_string(), ()).is_some() {
            warn!(slug = %slug, "cycle encountered while resolving dependency; treating as missing");
            return None;
        }

        let module = self
            .service
            .store
            .find_by_slug(slug, self.tenant_id.as_deref())
            .filter(|template| !template.source_code.trim().is_empty())
            .and_then(|template| {
                match self.service.compiler.compile(&template.source_code, &template.schema, self)
                {
                    Ok(compiled) => Some(compiled.server_module),
                    Err(err) => {
                        warn!(slug = %slug, error = %err, "dependency failed to compile");
                        None
                    }
                }
            });

        self.in_progress.remove(slug);
        self.modules.insert(slug.to_string(), module.clone());
        module
    }
}
