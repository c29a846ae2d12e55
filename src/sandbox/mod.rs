//! Isolated execution of bundled templates.
//!
//! Every render gets a brand-new Lua state with a restricted global
//! environment: process, filesystem, network, dynamic code loading, and
//! timer scheduling do not exist inside the sandbox, and console output is
//! swallowed. Only bundle text is shared between renders, never live
//! objects, so one render's failure or mutation cannot affect another's.
//!
//! Execution happens in three steps, each under its own deadline slice
//! rather than one aggregate budget: load the shared runtime bundle, load
//! the per-template bundle, then invoke the runtime's render entry with the
//! component and a property literal. A deadline hook terminates runaway
//! scripts within a bounded number of instructions after expiry.
//!
//! Failures of any kind resolve to a [`SandboxResult`] with `error` set;
//! nothing escapes to the caller as a panic or an `Err`.

pub mod pool;

use crate::bundler::BundlerService;
use crate::constants::SANDBOX_HOOK_INTERVAL;
use crate::core::PagewrightError;
use mlua::{HookTriggers, Lua, LuaSerdeExt, MultiValue, Value as LuaValue, VmState};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

pub use pool::WorkerPool;

use crate::compiler::codegen::lua_quote;

/// Globals removed from the sandbox environment.
///
/// Everything else the default Lua state provides (collection and string
/// libraries, math, utf8, tostring and friends, pcall) stays available; this
/// list plus the host helpers below is the whole capability contract other
/// code depends on.
const DENIED_GLOBALS: &[&str] = &[
    "os",
    "io",
    "package",
    "require",
    "dofile",
    "loadfile",
    "load",
    "collectgarbage",
];

/// Outcome of a sandboxed render.
///
/// When `error` is set the other fields are empty.
#[derive(Debug, Clone, Default)]
pub struct SandboxResult {
    pub markup: String,
    pub head: String,
    pub styles: String,
    pub error: Option<String>,
}

impl SandboxResult {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Executes per-template bundles against the shared runtime bundle.
pub struct SandboxExecutor {
    bundler: Arc<BundlerService>,
    pool: Arc<WorkerPool>,
    step_timeout: Duration,
}

impl SandboxExecutor {
    #[must_use]
    pub fn new(bundler: Arc<BundlerService>, pool: Arc<WorkerPool>, step_timeout: Duration) -> Self {
        Self {
            bundler,
            pool,
            step_timeout,
        }
    }

    /// Render a bundled component with the given properties.
    ///
    /// The result always comes back as a value; errors and timeouts are
    /// reported through [`SandboxResult::error`].
    pub async fn render(&self, bundle: &str, props: &Value) -> SandboxResult {
        let runtime = match self.bundler.shared_runtime().await {
            Ok(runtime) => runtime,
            Err(err) => return SandboxResult::failure(format!("shared runtime unavailable: {err}")),
        };

        let bundle = bundle.to_string();
        let props_literal = lua_literal(props);
        let step_timeout = self.step_timeout;

        match self
            .pool
            .run(move || execute(&runtime, &bundle, &props_literal, step_timeout))
            .await
        {
            Ok(result) => result,
            Err(err) => SandboxResult::failure(err.to_string()),
        }
    }
}

fn execute(runtime: &str, bundle: &str, props_literal: &str, step_timeout: Duration) -> SandboxResult {
    match try_execute(runtime, bundle, props_literal, step_timeout) {
        Ok(result) => result,
        Err(err) => {
            debug!(error = %err, "sandbox execution failed");
            SandboxResult::failure(err.to_string())
        }
    }
}

fn try_execute(
    runtime: &str,
    bundle: &str,
    props_literal: &str,
    step_timeout: Duration,
) -> Result<SandboxResult, PagewrightError> {
    let lua = Lua::new();
    restrict_globals(&lua).map_err(|err| PagewrightError::SandboxRuntime {
        message: format!("failed to prepare sandbox: {err}"),
    })?;

    let deadline = Arc::new(Mutex::new(Instant::now() + step_timeout));
    let timed_out = Arc::new(AtomicBool::new(false));
    install_deadline_hook(&lua, deadline.clone(), timed_out.clone());

    run_step(&lua, runtime, "runtime-load", &deadline, &timed_out, step_timeout)?;
    run_step(&lua, bundle, "bundle-load", &deadline, &timed_out, step_timeout)?;

    let invoke = render_script(props_literal);
    run_step(&lua, &invoke, "render", &deadline, &timed_out, step_timeout)?;

    read_result(&lua)
}

fn run_step(
    lua: &Lua,
    chunk: &str,
    step: &str,
    deadline: &Arc<Mutex<Instant>>,
    timed_out: &Arc<AtomicBool>,
    budget: Duration,
) -> Result<(), PagewrightError> {
    if let Ok(mut slot) = deadline.lock() {
        *slot = Instant::now() + budget;
    }
    timed_out.store(false, Ordering::SeqCst);

    let timeout_error = || PagewrightError::SandboxTimeout {
        step: step.to_string(),
        timeout_ms: budget.as_millis() as u64,
    };

    match lua.load(chunk).set_name(step).exec() {
        Ok(()) if timed_out.load(Ordering::SeqCst) => Err(timeout_error()),
        Ok(()) => Ok(()),
        Err(_) if timed_out.load(Ordering::SeqCst) => Err(timeout_error()),
        Err(err) => Err(PagewrightError::SandboxRuntime {
            message: err.to_string(),
        }),
    }
}

fn install_deadline_hook(lua: &Lua, deadline: Arc<Mutex<Instant>>, timed_out: Arc<AtomicBool>) {
    let triggers = HookTriggers::new().every_nth_instruction(SANDBOX_HOOK_INTERVAL);
    let _ = lua.set_hook(triggers, move |_lua, _debug| {
        let expired = deadline.lock().map(|d| Instant::now() >= *d).unwrap_or(false);
        if expired {
            timed_out.store(true, Ordering::SeqCst);
            Err(mlua::Error::RuntimeError("script execution budget exceeded".to_string()))
        } else {
            Ok(VmState::Continue)
        }
    });
}

fn restrict_globals(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();

    for name in DENIED_GLOBALS {
        globals.set(*name, LuaValue::Nil)?;
    }

    // Console output is swallowed, not forwarded.
    globals.set("print", lua.create_function(|_, _args: MultiValue| Ok(()))?)?;

    let json = lua.create_table()?;
    json.set(
        "encode",
        lua.create_function(|lua, value: LuaValue| {
            let value: Value = lua.from_value(value)?;
            serde_json::to_string(&value).map_err(mlua::Error::external)
        })?,
    )?;
    json.set(
        "decode",
        lua.create_function(|lua, text: String| {
            let value: Value = serde_json::from_str(&text).map_err(mlua::Error::external)?;
            lua.to_value(&value)
        })?,
    )?;
    globals.set("json", json)?;

    // Date helpers, since the os library is denied.
    let date = lua.create_table()?;
    date.set(
        "now",
        lua.create_function(|_, ()| Ok(chrono::Utc::now().timestamp_millis()))?,
    )?;
    date.set(
        "iso",
        lua.create_function(|_, millis: i64| {
            Ok(chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
                .map(|d| d.to_rfc3339())
                .unwrap_or_default())
        })?,
    )?;
    globals.set("Date", date)?;

    Ok(())
}

fn render_script(props_literal: &str) -> String {
    format!(
        r#"do
  local ok, out = pcall(function()
    if type(__runtime) ~= "table" or type(__runtime.render) ~= "function" then
      error("shared runtime not loaded")
    end
    if __component == nil then
      error("component not loaded")
    end
    return __runtime.render(__component, {props_literal})
  end)
  if ok and type(out) == "table" then
    __result = {{ html = out.html or "", head = out.head or "", css = out.css or "" }}
  elseif ok then
    __result = {{ error = "render returned " .. type(out) }}
  else
    __result = {{ error = tostring(out) }}
  end
end
"#
    )
}

fn read_result(lua: &Lua) -> Result<SandboxResult, PagewrightError> {
    let value: LuaValue =
        lua.globals().get("__result").map_err(|err| PagewrightError::SandboxRuntime {
            message: err.to_string(),
        })?;

    let LuaValue::Table(table) = value else {
        return Ok(SandboxResult::failure("no render result"));
    };

    let error: Option<String> = table.get::<Option<String>>("error").ok().flatten();
    if let Some(error) = error {
        return Ok(SandboxResult::failure(error));
    }

    Ok(SandboxResult {
        markup: table.get::<Option<String>>("html").ok().flatten().unwrap_or_default(),
        head: table.get::<Option<String>>("head").ok().flatten().unwrap_or_default(),
        styles: table.get::<Option<String>>("css").ok().flatten().unwrap_or_default(),
        error: None,
    })
}

/// Serialize a JSON value as a Lua value literal.
///
/// Properties cross into the sandbox as source text, never as live host
/// objects.
#[must_use]
pub(crate) fn lua_literal(value: &Value) -> String {
    match value {
        Value::Null => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => lua_quote(s),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(lua_literal).collect();
            format!("{{{}}}", parts.join(", "))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("[{}] = {}", lua_quote(key), lua_literal(value)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
    }
}
