//! The `recompile` command: batch-compile a directory of component files.
//!
//! Each `.pwt` file becomes a template whose slug is the file stem. The
//! batch runs in dependency order so cross-template references resolve, and
//! one broken file never aborts the rest.

use super::build_services;
use crate::config::Config;
use crate::template::model::{Template, TemplateCategory};
use anyhow::{Context, Result, bail};
use clap::Args;
use colored::Colorize;
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::time::Duration;
use walkdir::WalkDir;

#[derive(Args)]
pub struct RecompileCommand {
    /// Directory of .pwt component files (slug = file stem)
    pub dir: PathBuf,
}

impl RecompileCommand {
    pub async fn execute(self, config: &Config) -> Result<()> {
        let services = build_services(config);

        let mut loaded = 0usize;
        for entry in WalkDir::new(&self.dir).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("pwt") {
                continue;
            }
            let Some(slug) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let mut template =
                Template::new(None, slug, slug, TemplateCategory::Section);
            template.source_code = source;
            services
                .store
                .insert(template)
                .with_context(|| format!("failed to load {}", path.display()))?;
            loaded += 1;
        }

        if loaded == 0 {
            bail!("no .pwt files found under {}", self.dir.display());
        }
        println!("Found {loaded} templates to recompile");

        let spinner = ProgressBar::new_spinner();
        spinner.set_message("compiling in dependency order");
        spinner.enable_steady_tick(Duration::from_millis(80));
        let summary = services.compiler.compile_all_for_tenant(None).await?;
        spinner.finish_and_clear();

        for slug in &summary.compiled {
            println!("  {}   {slug}", "OK".green().bold());
        }
        for (slug, reason) in &summary.skipped {
            println!("  {} {slug} ({reason})", "SKIP".yellow());
        }
        for (slug, error) in &summary.failed {
            println!("  {} {slug}: {error}", "FAIL".red().bold());
        }

        println!(
            "\nDone: {} ok, {} failed, {} skipped",
            summary.compiled.len(),
            summary.failed.len(),
            summary.skipped.len()
        );

        if !summary.failed.is_empty() {
            std::process::exit(1);
        }
        Ok(())
    }
}
