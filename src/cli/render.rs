//! The `render` command: run a source file through the full pipeline.

use super::build_services;
use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Args)]
pub struct RenderCommand {
    /// Component source file to render
    pub file: PathBuf,

    /// JSON file with the property bag to render with
    #[arg(long)]
    pub props: Option<PathBuf>,

    /// JSON schema file with a top-level "fields" list
    #[arg(long)]
    pub schema: Option<PathBuf>,
}

impl RenderCommand {
    pub async fn execute(self, config: &Config) -> Result<()> {
        let source = std::fs::read_to_string(&self.file)
            .with_context(|| format!("failed to read {}", self.file.display()))?;
        let schema = super::check::load_schema(self.schema.as_deref())?;
        let props = match &self.props {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read props {}", path.display()))?;
                serde_json::from_str::<Value>(&text)
                    .with_context(|| format!("invalid props {}", path.display()))?
            }
            None => Value::Object(serde_json::Map::new()),
        };

        let services = build_services(config);
        let preview =
            services.compiler.compile_for_preview(None, &source, &schema, &props).await?;

        println!("{}", preview.html);
        if !preview.css.is_empty() {
            println!("\n<style>\n{}\n</style>", preview.css);
        }
        for warning in &preview.warnings {
            eprintln!("warning: {warning}");
        }

        Ok(())
    }
}
