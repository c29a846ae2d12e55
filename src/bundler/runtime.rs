//! The shared rendering runtime and its process-wide cache.
//!
//! Every compiled template imports the same small set of rendering
//! primitives. Rather than inlining them into each per-template bundle, the
//! runtime is bundled once per process, assigned to a well-known global, and
//! per-template bundles reference that global. A template change never
//! rebuilds the runtime; the cache is invalidated only explicitly, for
//! example after a runtime upgrade.
//!
//! Concurrent first users collapse onto a single build: the fast path is a
//! read of the memoized bundle, and builders serialize on a lock with a
//! recheck after acquiring it.

use super::{BundleError, ModuleBundler};
use crate::constants::RUNTIME_GLOBAL;
use crate::core::PagewrightError;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Lua source of the shared rendering runtime.
///
/// Exposes escaping, list coercion, head collection, and the render entry
/// point every per-template bundle is invoked through.
pub const RUNTIME_MODULE: &str = r#"local M = {}

function M.text(v)
  if v == nil then
    return ""
  end
  return tostring(v)
end

function M.escape(v)
  if v == nil then
    return ""
  end
  local s = tostring(v)
  s = s:gsub("&", "&amp;")
  s = s:gsub("<", "&lt;")
  s = s:gsub(">", "&gt;")
  s = s:gsub('"', "&quot;")
  return s
end

function M.list(v)
  if type(v) == "table" then
    return v
  end
  return {}
end

M._head = {}

function M.head(fragment)
  M._head[#M._head + 1] = M.text(fragment)
end

function M.render(component, props)
  M._head = {}
  local html = component(props or {})
  return {
    html = html or "",
    head = table.concat(M._head, "\n"),
    css = "",
  }
end

return M
"#;

/// Process-wide memoized shared runtime bundle.
///
/// Injected into the services that need it instead of read from ambient
/// global state, so tests can use isolated instances and the single-flight
/// behavior is an explicit contract.
pub struct RuntimeCache {
    bundler: Arc<dyn ModuleBundler>,
    cached: RwLock<Option<Arc<str>>>,
    build_lock: Mutex<()>,
}

impl RuntimeCache {
    #[must_use]
    pub fn new(bundler: Arc<dyn ModuleBundler>) -> Self {
        Self {
            bundler,
            cached: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    /// Return the runtime bundle, building it on first use.
    pub async fn get_or_build(&self) -> Result<Arc<str>, PagewrightError> {
        if let Some(bundle) = self.cached.read().await.clone() {
            return Ok(bundle);
        }

        let _guard = self.build_lock.lock().await;

        // Another caller may have finished the build while we waited.
        if let Some(bundle) = self.cached.read().await.clone() {
            return Ok(bundle);
        }

        let text = self
            .bundler
            .bundle(RUNTIME_MODULE, RUNTIME_GLOBAL)
            .map_err(BundleError::into_error)?;

        let digest = Sha256::digest(text.as_bytes());
        info!(
            fingerprint = %hex::encode(&digest[..8]),
            bytes = text.len(),
            "shared runtime bundle built"
        );

        let bundle: Arc<str> = Arc::from(text);
        *self.cached.write().await = Some(bundle.clone());
        Ok(bundle)
    }

    /// Drop the memoized bundle so the next use rebuilds it.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
        debug!("shared runtime cache cleared");
    }

    /// Hex fingerprint of the cached bundle, if one is built.
    pub async fn fingerprint(&self) -> Option<String> {
        self.cached
            .read()
            .await
            .as_ref()
            .map(|bundle| hex::encode(Sha256::digest(bundle.as_bytes())))
    }
}
