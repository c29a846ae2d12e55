//! The component compiler collaborator.
//!
//! [`ComponentCompiler`] is the abstract interface the pipeline drives:
//! source text in, compiled server and client modules plus CSS out. The
//! reference implementation, [`MarkupCompiler`], compiles the pagewright
//! component language to Lua modules. Any toolchain with the same contract
//! can be plugged in.
//!
//! Cross-template references are resolved during compilation through a
//! [`DependencyLookup`] callback that returns the referenced template's
//! already-compiled server module. The compiler inlines the dependency and
//! rewrites the import, so compiled modules are self-contained apart from
//! `@lib/` and runtime imports, which the bundler handles.

use super::codegen::generate_module;
use super::parse::{normalize_source, parse_markup, split_source, validate_source};
use super::CompileError;
use crate::constants::TEMPLATE_IMPORT_PREFIX;
use crate::template::model::TemplateSchema;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Resolves a referenced slug to its compiled server module source.
pub trait DependencyLookup {
    fn resolve(&self, slug: &str) -> Option<String>;
}

/// Lookup that resolves nothing; for compiling standalone templates.
pub struct NoDependencies;

impl DependencyLookup for NoDependencies {
    fn resolve(&self, _slug: &str) -> Option<String> {
        None
    }
}

/// Artifacts produced by a successful compile.
#[derive(Debug, Clone, Default)]
pub struct CompiledComponent {
    /// Lua module of shape `return function(props) ... end`
    pub server_module: String,
    /// Client-side module for hydration, when the target supports it
    pub client_module: Option<String>,
    /// Scoped CSS extracted from the style section
    pub css: String,
    /// Non-fatal findings surfaced to the author
    pub warnings: Vec<String>,
}

/// Turns one template's source text into compiled artifacts.
pub trait ComponentCompiler: Send + Sync {
    fn compile(
        &self,
        source: &str,
        schema: &TemplateSchema,
        deps: &dyn DependencyLookup,
    ) -> Result<CompiledComponent, CompileError>;
}

/// Reference compiler for the pagewright component language.
#[derive(Debug, Default)]
pub struct MarkupCompiler;

impl MarkupCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ComponentCompiler for MarkupCompiler {
    fn compile(
        &self,
        source: &str,
        schema: &TemplateSchema,
        deps: &dyn DependencyLookup,
    ) -> Result<CompiledComponent, CompileError> {
        let normalized = normalize_source(source, schema);

        let validation = validate_source(&normalized);
        if !validation.is_valid() {
            return Err(CompileError::source(validation.errors.join("\n"), None));
        }

        let parts = split_source(&normalized);
        let nodes = parse_markup(&parts.markup)?;
        let module = generate_module(parts.script.as_deref(), &nodes);
        let module = resolve_template_imports(&module, deps)?;

        Ok(CompiledComponent {
            // The component language is target agnostic, so the client module
            // shares the server codegen and differs only in how it is linked.
            client_module: Some(module.clone()),
            server_module: module,
            css: parts.style.map(|s| s.trim().to_string()).unwrap_or_default(),
            warnings: validation.warnings,
        })
    }
}

fn template_import_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(
            r#"require\s*\(\s*["']{}([A-Za-z0-9][A-Za-z0-9_-]*)["']\s*\)"#,
            regex::escape(TEMPLATE_IMPORT_PREFIX)
        ))
        .expect("template import pattern is valid")
    })
}

fn dependency_ident(slug: &str) -> String {
    let safe: String =
        slug.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect();
    format!("__dep_{safe}")
}

/// Inline each referenced template's compiled module and rewrite its import.
///
/// A slug the lookup cannot resolve fails the compile with a missing
/// dependency error rather than producing a module that renders blank.
fn resolve_template_imports(
    module: &str,
    deps: &dyn DependencyLookup,
) -> Result<String, CompileError> {
    let pattern = template_import_pattern();

    let mut preludes = String::new();
    let mut idents: HashMap<String, String> = HashMap::new();

    for caps in pattern.captures_iter(module) {
        let slug = caps[1].to_string();
        if idents.contains_key(&slug) {
            continue;
        }
        let dep_module = deps.resolve(&slug).ok_or_else(|| CompileError::MissingDependency {
            slug: slug.clone(),
        })?;
        let ident = dependency_ident(&slug);
        preludes.push_str(&format!("local {ident} = (function()\n{dep_module}\nend)()\n"));
        idents.insert(slug, ident);
    }

    if idents.is_empty() {
        return Ok(module.to_string());
    }

    let rewritten = pattern.replace_all(module, |caps: &regex::Captures<'_>| {
        idents[&caps[1]].clone()
    });

    Ok(format!("{preludes}{rewritten}"))
}
