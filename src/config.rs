//! Configuration loading for the pagewright pipeline.
//!
//! Configuration is read from `pagewright.toml` in the working directory,
//! falling back to a per-user config file, then to built-in defaults. All
//! fields are optional in the file; anything not set takes its default.
//!
//! ```toml
//! app_root = "src/lib"
//! sandbox_timeout_ms = 2000
//! max_workers = 4
//! ```

use crate::constants::SANDBOX_STEP_TIMEOUT;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime configuration for the compile, bundle, and sandbox services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory containing the Lua modules reachable through `@lib/`
    /// imports from template source.
    pub app_root: PathBuf,

    /// Execution budget for each sandbox step, in milliseconds.
    pub sandbox_timeout_ms: u64,

    /// Maximum concurrent sandbox executions. Defaults to the number of
    /// available cores.
    pub max_workers: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_root: PathBuf::from("lib"),
            sandbox_timeout_ms: SANDBOX_STEP_TIMEOUT.as_millis() as u64,
            max_workers: None,
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, the working directory, the
    /// user config directory, or defaults, in that order.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        let local = Path::new("pagewright.toml");
        if local.exists() {
            return Self::from_file(local);
        }

        if let Some(dir) = dirs::config_dir() {
            let global = dir.join("pagewright").join("config.toml");
            if global.exists() {
                return Self::from_file(&global);
            }
        }

        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// The per-step sandbox budget as a [`Duration`].
    #[must_use]
    pub fn sandbox_timeout(&self) -> Duration {
        Duration::from_millis(self.sandbox_timeout_ms)
    }

    /// Worker pool size, defaulting to available parallelism.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.max_workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(4)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sandbox_timeout(), SANDBOX_STEP_TIMEOUT);
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn test_parse_partial_file() {
        let config: Config = toml::from_str("app_root = \"modules\"").unwrap();
        assert_eq!(config.app_root, PathBuf::from("modules"));
        assert_eq!(config.sandbox_timeout_ms, 2000);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let parsed: Result<Config, _> = toml::from_str("bogus = 1");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let result = Config::load(Some(Path::new("/nonexistent/pagewright.toml")));
        assert!(result.is_err());
    }
}
