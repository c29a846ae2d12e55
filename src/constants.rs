//! Global constants used throughout the pagewright codebase.
//!
//! This module centralizes the reserved import prefixes, well-known sandbox
//! globals, and timing constants that several modules must agree on exactly.
//! Defining them in one place keeps the wire conventions between compiler,
//! bundler, and sandbox discoverable.

use std::time::Duration;

/// Reserved virtual import prefix for cross-template references.
///
/// Any occurrence of this prefix followed by a slug in template source text
/// is treated as a dependency edge on that template.
pub const TEMPLATE_IMPORT_PREFIX: &str = "@templates/";

/// Virtual internal module prefix, resolved to Lua files under the
/// configured application root at bundle time.
pub const LIB_IMPORT_PREFIX: &str = "@lib/";

/// Import name redirected to the shared runtime global instead of being
/// inlined into per-template bundles.
pub const RUNTIME_IMPORT: &str = "runtime";

/// Global the shared runtime bundle assigns itself to inside the sandbox.
pub const RUNTIME_GLOBAL: &str = "__runtime";

/// Global a per-template server bundle assigns its component to.
pub const COMPONENT_GLOBAL: &str = "__component";

/// Global a per-template client bundle assigns its component to.
pub const CLIENT_COMPONENT_GLOBAL: &str = "__component_client";

/// Reserved block sentinel for the built-in form renderer.
pub const FORM_BLOCK_SENTINEL: &str = "__form__";

/// Opening hydration group marker emitted in rendered markup.
pub const HYDRATION_OPEN: &str = "<!--[-->";

/// Closing hydration group marker emitted in rendered markup.
pub const HYDRATION_CLOSE: &str = "<!--]-->";

/// Default execution budget for each sandbox step (runtime load, bundle
/// load, render invocation). Each step gets its own slice, not a shared
/// aggregate budget.
pub const SANDBOX_STEP_TIMEOUT: Duration = Duration::from_millis(2000);

/// Instructions executed between sandbox deadline checks.
///
/// Small enough that a runaway script is stopped within a few milliseconds
/// of its deadline, large enough that well-behaved renders pay almost
/// nothing for the check.
pub const SANDBOX_HOOK_INTERVAL: u32 = 4096;

/// Maximum nesting depth for virtual module inlining during bundling.
pub const MAX_BUNDLE_DEPTH: usize = 8;
