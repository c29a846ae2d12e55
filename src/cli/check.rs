//! The `check` command: compile a source file and report findings.

use crate::compiler::component::{ComponentCompiler, MarkupCompiler, NoDependencies};
use crate::config::Config;
use crate::core::PagewrightError;
use crate::template::model::TemplateSchema;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args)]
pub struct CheckCommand {
    /// Component source file to check
    pub file: PathBuf,

    /// JSON schema file with a top-level "fields" list
    #[arg(long)]
    pub schema: Option<PathBuf>,
}

impl CheckCommand {
    pub async fn execute(self, _config: &Config) -> Result<()> {
        let source = std::fs::read_to_string(&self.file)
            .with_context(|| format!("failed to read {}", self.file.display()))?;
        let schema = load_schema(self.schema.as_deref())?;

        let compiled = MarkupCompiler::new()
            .compile(&source, &schema, &NoDependencies)
            .map_err(PagewrightError::from)?;

        println!(
            "{} {} (module: {:.1}KB, css: {}B)",
            "ok".green().bold(),
            self.file.display(),
            compiled.server_module.len() as f64 / 1024.0,
            compiled.css.len(),
        );
        for warning in &compiled.warnings {
            println!("{}: {warning}", "warning".yellow());
        }

        Ok(())
    }
}

pub(crate) fn load_schema(path: Option<&std::path::Path>) -> Result<TemplateSchema> {
    let Some(path) = path else {
        return Ok(TemplateSchema::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema {}", path.display()))?;
    let schema: TemplateSchema = serde_json::from_str(&text)
        .with_context(|| format!("invalid schema {}", path.display()))?;
    Ok(schema)
}
