//! Command-line interface for pagewright.
//!
//! The CLI is a thin driver over the library services, aimed at template
//! authors and operators:
//!
//! - `check` - compile a component source file and report errors and
//!   warnings without rendering anything
//! - `render` - compile, bundle, sandbox-render, and sanitize a component
//!   source file with a property bag
//! - `recompile` - batch-compile a directory of component files in
//!   dependency order, the maintenance pass run after a runtime upgrade

mod check;
mod recompile;
mod render;

use crate::bundler::{BundlerService, LuaBundler};
use crate::compiler::{CompilerService, MarkupCompiler};
use crate::config::Config;
use crate::sandbox::{SandboxExecutor, WorkerPool};
use crate::template::store::{MemoryStore, TemplateStore};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Main CLI application structure.
#[derive(Parser)]
#[command(
    name = "pagewright",
    about = "Template compilation, bundling, and sandboxed rendering",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a pagewright.toml configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a component source file and report errors and warnings
    Check(check::CheckCommand),

    /// Compile, bundle, and render a component source file in the sandbox
    Render(render::RenderCommand),

    /// Batch-compile a directory of component files in dependency order
    Recompile(recompile::RecompileCommand),
}

impl Cli {
    /// Execute the parsed command.
    pub async fn execute(self) -> Result<()> {
        init_logging(self.verbose, self.quiet);
        let config = Config::load(self.config.as_deref())?;

        match self.command {
            Commands::Check(cmd) => cmd.execute(&config).await,
            Commands::Render(cmd) => cmd.execute(&config).await,
            Commands::Recompile(cmd) => cmd.execute(&config).await,
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

/// The wired-up service graph the commands operate on.
pub(crate) struct Services {
    pub store: Arc<dyn TemplateStore>,
    pub compiler: Arc<CompilerService>,
}

pub(crate) fn build_services(config: &Config) -> Services {
    let store: Arc<dyn TemplateStore> = Arc::new(MemoryStore::new());
    let bundler = Arc::new(BundlerService::new(Arc::new(LuaBundler::new(&config.app_root))));
    let pool = Arc::new(WorkerPool::new(config.worker_count()));
    let sandbox =
        Arc::new(SandboxExecutor::new(bundler.clone(), pool, config.sandbox_timeout()));
    let compiler = Arc::new(CompilerService::new(
        store.clone(),
        Arc::new(MarkupCompiler::new()),
        bundler,
        sandbox,
    ));

    Services {
        store,
        compiler,
    }
}
