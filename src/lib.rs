//! Pagewright - server-side template pipeline for a multi-tenant page
//! builder.
//!
//! Non-engineers author UI templates (script logic, markup, and scoped
//! styles) that are compiled, bundled, and rendered server-side. This crate
//! implements the whole path from source text to safe HTML:
//!
//! - [`resolver`] - extracts cross-template references and computes a safe
//!   compile order, tolerating cycles deterministically
//! - [`compiler`] - drives the component compiler collaborator; single,
//!   preview, and dependency-ordered batch compilation
//! - [`bundler`] - links compiled modules into small self-contained
//!   bundles against a process-wide cached shared runtime
//! - [`sandbox`] - executes bundles in a fresh, capability-restricted Lua
//!   state with per-step deadlines
//! - [`render`] - sanitizes rendered output and composes page block lists
//!   into render plans
//! - [`template`] - the template model, validation, persistence trait, and
//!   the draft/publish/fork lifecycle
//!
//! # Pipeline
//!
//! Authoring: `saveDraft` stores source without compiling. Publish copies
//! the draft into the published source and runs compile then bundle; the
//! outcome is recorded on the template. Request time: block lists resolve
//! through a cheap markup-extraction path, or through the sandbox when a
//! context needs fully dynamic props, and every fragment is sanitized
//! before it reaches a viewer.
//!
//! ```no_run
//! use pagewright::bundler::{BundlerService, LuaBundler};
//! use pagewright::compiler::{CompilerService, MarkupCompiler};
//! use pagewright::sandbox::{SandboxExecutor, WorkerPool};
//! use pagewright::template::{MemoryStore, TemplateStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store: Arc<dyn TemplateStore> = Arc::new(MemoryStore::new());
//! let bundler = Arc::new(BundlerService::new(Arc::new(LuaBundler::new("lib"))));
//! let pool = Arc::new(WorkerPool::new(4));
//! let sandbox = Arc::new(SandboxExecutor::new(
//!     bundler.clone(),
//!     pool,
//!     Duration::from_millis(2000),
//! ));
//! let compiler = Arc::new(CompilerService::new(
//!     store.clone(),
//!     Arc::new(MarkupCompiler::new()),
//!     bundler,
//!     sandbox,
//! ));
//!
//! let preview = compiler
//!     .compile_for_preview(
//!         None,
//!         "<h1>{props.title}</h1>",
//!         &Default::default(),
//!         &serde_json::json!({"title": "Hello"}),
//!     )
//!     .await?;
//! assert!(preview.html.contains("Hello"));
//! # Ok(())
//! # }
//! ```

pub mod bundler;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod constants;
pub mod core;
pub mod render;
pub mod resolver;
pub mod sandbox;
pub mod template;
