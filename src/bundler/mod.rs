//! Bundling of compiled modules into self-contained executable chunks.
//!
//! The bundler turns a compiled module into a bundle that can be evaluated
//! directly in an isolated context. Two import classes receive special
//! treatment instead of being inlined blindly:
//!
//! - **Virtual internal modules** (`@lib/...`) map to Lua files under the
//!   configured application root and are inlined, recursively.
//! - **Shared runtime references** (`require("runtime")`) are redirected to
//!   the well-known global populated by the shared runtime bundle at
//!   execution time. The runtime stays external, which keeps per-template
//!   bundles small regardless of runtime size.
//!
//! Anything else, including a template reference the compiler failed to
//! resolve, is a bundling error, never a silent omission.

pub mod runtime;

use crate::compiler::component::CompiledComponent;
use crate::constants::{
    CLIENT_COMPONENT_GLOBAL, COMPONENT_GLOBAL, LIB_IMPORT_PREFIX, MAX_BUNDLE_DEPTH,
    RUNTIME_GLOBAL, RUNTIME_IMPORT, TEMPLATE_IMPORT_PREFIX,
};
use crate::core::PagewrightError;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::warn;

pub use runtime::{RUNTIME_MODULE, RuntimeCache};

/// An import the bundler could not resolve.
#[derive(Debug, Clone)]
pub struct BundleError {
    /// The offending import path
    pub import: String,
    /// Why resolution failed
    pub message: String,
}

impl BundleError {
    fn new(import: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            import: import.into(),
            message: message.into(),
        }
    }

    pub(crate) fn into_error(self) -> PagewrightError {
        PagewrightError::from(self)
    }
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot resolve import '{}': {}", self.import, self.message)
    }
}

impl std::error::Error for BundleError {}

impl From<BundleError> for PagewrightError {
    fn from(err: BundleError) -> Self {
        Self::BundleResolution {
            import: err.import,
            reason: err.message,
        }
    }
}

/// Turns entry module code into a self-contained bundle assigning the
/// finished value to `target_global`.
pub trait ModuleBundler: Send + Sync {
    fn bundle(&self, entry_code: &str, target_global: &str) -> Result<String, BundleError>;
}

fn require_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"require\s*\(\s*["']([^"']+)["']\s*\)"#).expect("require pattern is valid")
    })
}

/// Reference bundler linking Lua modules textually.
pub struct LuaBundler {
    app_root: PathBuf,
}

impl LuaBundler {
    #[must_use]
    pub fn new(app_root: impl Into<PathBuf>) -> Self {
        Self {
            app_root: app_root.into(),
        }
    }

    fn resolve_imports(
        &self,
        code: &str,
        inlined: &mut HashMap<String, String>,
        in_progress: &mut HashSet<String>,
        preludes: &mut String,
        depth: usize,
    ) -> Result<String, BundleError> {
        if depth > MAX_BUNDLE_DEPTH {
            return Err(BundleError::new("@lib", "module inlining nested too deeply"));
        }

        let imports: Vec<String> = {
            let mut seen = HashSet::new();
            require_pattern()
                .captures_iter(code)
                .map(|caps| caps[1].to_string())
                .filter(|path| seen.insert(path.clone()))
                .collect()
        };

        for path in imports {
            if path == RUNTIME_IMPORT {
                continue;
            }

            if let Some(rest) = path.strip_prefix(LIB_IMPORT_PREFIX) {
                if inlined.contains_key(&path) {
                    continue;
                }
                if !in_progress.insert(path.clone()) {
                    return Err(BundleError::new(path, "circular virtual module import"));
                }

                let file = self.app_root.join(format!("{rest}.lua"));
                let text = std::fs::read_to_string(&file).map_err(|_| {
                    BundleError::new(
                        path.clone(),
                        format!("module file {} not found", file.display()),
                    )
                })?;

                let ident = module_ident(rest);
                let body =
                    self.resolve_imports(&text, inlined, in_progress, preludes, depth + 1)?;
                preludes.push_str(&format!("local {ident} = (function()\n{body}\nend)()\n"));

                in_progress.remove(&path);
                inlined.insert(path, ident);
            } else if path.starts_with(TEMPLATE_IMPORT_PREFIX) {
                return Err(BundleError::new(
                    path,
                    "template import was not resolved at compile time",
                ));
            } else {
                return Err(BundleError::new(
                    path,
                    "import is neither a virtual module nor the shared runtime",
                ));
            }
        }

        let resolved = require_pattern().replace_all(code, |caps: &regex::Captures<'_>| {
            let path = &caps[1];
            if path == RUNTIME_IMPORT {
                RUNTIME_GLOBAL.to_string()
            } else {
                inlined.get(path).cloned().unwrap_or_else(|| caps[0].to_string())
            }
        });

        Ok(resolved.into_owned())
    }
}

fn module_ident(path: &str) -> String {
    let safe: String =
        path.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect();
    format!("__lib_{safe}")
}

impl ModuleBundler for LuaBundler {
    fn bundle(&self, entry_code: &str, target_global: &str) -> Result<String, BundleError> {
        let mut inlined = HashMap::new();
        let mut in_progress = HashSet::new();
        let mut preludes = String::new();

        let body =
            self.resolve_imports(entry_code, &mut inlined, &mut in_progress, &mut preludes, 0)?;

        Ok(format!("{preludes}{target_global} = (function()\n{body}\nend)()\n"))
    }
}

/// A bundled template ready for storage and execution.
#[derive(Debug, Clone)]
pub struct TemplateBundle {
    /// Server bundle assigning the component to its well-known global
    pub server: String,
    /// Client bundle, when client bundling succeeded
    pub client: Option<String>,
}

/// Orchestrates per-template bundling and the shared runtime cache.
pub struct BundlerService {
    bundler: Arc<dyn ModuleBundler>,
    runtime: RuntimeCache,
}

impl BundlerService {
    #[must_use]
    pub fn new(bundler: Arc<dyn ModuleBundler>) -> Self {
        Self {
            runtime: RuntimeCache::new(bundler.clone()),
            bundler,
        }
    }

    /// Bundle a compiled component's server and client modules.
    ///
    /// Client bundle failure is non-fatal; the server path still renders.
    pub fn bundle_component(
        &self,
        compiled: &CompiledComponent,
    ) -> Result<TemplateBundle, PagewrightError> {
        let server =
            self.bundler.bundle(&compiled.server_module, COMPONENT_GLOBAL).map_err(
                BundleError::into_error,
            )?;

        let client = compiled.client_module.as_deref().and_then(|module| {
            match self.bundler.bundle(module, CLIENT_COMPONENT_GLOBAL) {
                Ok(text) => Some(text),
                Err(err) => {
                    warn!(error = %err, "client bundle failed; continuing with server bundle only");
                    None
                }
            }
        });

        Ok(TemplateBundle {
            server,
            client,
        })
    }

    /// The memoized shared runtime bundle, built on first use.
    pub async fn shared_runtime(&self) -> Result<Arc<str>, PagewrightError> {
        self.runtime.get_or_build().await
    }

    /// Explicitly drop the cached runtime bundle.
    pub async fn invalidate_runtime(&self) {
        self.runtime.invalidate().await;
    }

    /// Fingerprint of the cached runtime bundle, if built.
    pub async fn runtime_fingerprint(&self) -> Option<String> {
        self.runtime.fingerprint().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_module(dir: &std::path::Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_runtime_import_stays_external() {
        let bundler = LuaBundler::new("does-not-matter");
        let bundle = bundler
            .bundle("local rt = require(\"runtime\")\nreturn rt.escape", COMPONENT_GLOBAL)
            .unwrap();

        assert!(bundle.contains("local rt = __runtime"));
        assert!(bundle.contains("__component = (function()"));
        assert!(!bundle.contains("require"));
    }

    #[test]
    fn test_lib_import_inlined() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "format.lua", "return { upper = string.upper }");

        let bundler = LuaBundler::new(dir.path());
        let bundle = bundler
            .bundle("local fmt = require(\"@lib/format\")\nreturn fmt", COMPONENT_GLOBAL)
            .unwrap();

        assert!(bundle.contains("local __lib_format = (function()"));
        assert!(bundle.contains("local fmt = __lib_format"));
    }

    #[test]
    fn test_nested_lib_imports_resolve() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "outer.lua", "local inner = require(\"@lib/inner\")\nreturn inner");
        write_module(dir.path(), "inner.lua", "return 42");

        let bundler = LuaBundler::new(dir.path());
        let bundle = bundler
            .bundle("return require(\"@lib/outer\")", COMPONENT_GLOBAL)
            .unwrap();

        assert!(bundle.contains("__lib_inner"));
        assert!(bundle.contains("__lib_outer"));
        // The inner module's prelude must appear before the outer one uses it.
        assert!(bundle.find("local __lib_inner").unwrap() < bundle.find("local __lib_outer").unwrap());
    }

    #[test]
    fn test_missing_lib_module_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bundler = LuaBundler::new(dir.path());

        let err = bundler
            .bundle("return require(\"@lib/absent\")", COMPONENT_GLOBAL)
            .unwrap_err();
        assert_eq!(err.import, "@lib/absent");
        assert!(err.message.contains("not found"));
    }

    #[test]
    fn test_unresolved_import_errors() {
        let bundler = LuaBundler::new("lib");
        let err = bundler.bundle("return require(\"socket\")", COMPONENT_GLOBAL).unwrap_err();
        assert_eq!(err.import, "socket");
    }

    #[test]
    fn test_leftover_template_import_errors() {
        let bundler = LuaBundler::new("lib");
        let err = bundler
            .bundle("return require(\"@templates/hero\")", COMPONENT_GLOBAL)
            .unwrap_err();
        assert!(err.message.contains("compile time"));
    }

    #[test]
    fn test_circular_lib_imports_error() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "a.lua", "return require(\"@lib/b\")");
        write_module(dir.path(), "b.lua", "return require(\"@lib/a\")");

        let bundler = LuaBundler::new(dir.path());
        let err = bundler.bundle("return require(\"@lib/a\")", COMPONENT_GLOBAL).unwrap_err();
        assert!(err.message.contains("circular"));
    }

    #[test]
    fn test_client_bundle_failure_is_non_fatal() {
        let service = BundlerService::new(Arc::new(LuaBundler::new("lib")));
        let compiled = CompiledComponent {
            server_module: "return function(props) return \"ok\" end".to_string(),
            client_module: Some("return require(\"socket\")".to_string()),
            css: String::new(),
            warnings: Vec::new(),
        };

        let bundle = service.bundle_component(&compiled).unwrap();
        assert!(bundle.server.contains(COMPONENT_GLOBAL));
        assert!(bundle.client.is_none());
    }
}
