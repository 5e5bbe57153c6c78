//! Engine handle: the single Lua state, the lock that serializes access to
//! it, and construction of the script-visible global surface.
//!
//! Every call into script code happens inside `EngineHandle::with`, from the
//! drawing thread (tick, host calls) or the event thread. Nothing else holds a
//! `Lua` value; host closures registered into the engine capture only the
//! scheduler, loader, console and host hooks, so dropping the state at
//! teardown releases everything.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mlua::{Function, HookTriggers, Lua, MultiValue, Table, Value, VmState};
use parking_lot::Mutex;

use crate::bindings::{BindingProvider, DiagnosticBindings, Overlays};
use crate::console::{Console, ConsoleBindings};
use crate::error::QueueError;
use crate::host::{Host, ProcessInfo};
use crate::modules::ModuleLoader;
use crate::persistent::{PersistentSlot, DRAW_CALLBACK, EVENT_CALLBACK, PROCESS};
use crate::scheduler::Scheduler;

/// How often the watchdog hook runs (every N VM instructions).
pub const WATCHDOG_HOOK_INTERVAL: u32 = 10_000;

/// Default per-dispatch time limit.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Globals removed when sandboxing. `require` comes back from bootstrap,
/// routed through `process.nativeBinding`.
const SANDBOX_REMOVED: [&str; 8] = [
    "os", "io", "debug", "package", "require", "loadfile", "dofile", "load",
];

// =============================================================================
// Watchdog
// =============================================================================

/// Wall-clock limit on a single dispatch.
///
/// One instruction hook is installed for the life of the engine; it only
/// fails a call while a `DeadlineGuard` is alive and its deadline has passed.
pub(crate) struct Watchdog {
    base: Instant,
    /// Microseconds after `base`; 0 means disarmed.
    deadline_us: AtomicU64,
    limit: Option<Duration>,
}

impl Watchdog {
    pub fn new(limit: Option<Duration>) -> Self {
        Self { base: Instant::now(), deadline_us: AtomicU64::new(0), limit }
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    /// Arm for one dispatch. The previous deadline is restored on drop.
    pub fn arm(&self) -> DeadlineGuard<'_> {
        let deadline = match self.limit {
            Some(limit) => {
                let at = self.base.elapsed() + limit;
                (at.as_micros() as u64).max(1)
            }
            None => 0,
        };
        let previous = self.deadline_us.swap(deadline, Ordering::SeqCst);
        DeadlineGuard { watchdog: self, previous }
    }

    pub fn expired(&self) -> bool {
        let deadline = self.deadline_us.load(Ordering::Relaxed);
        deadline != 0 && self.base.elapsed().as_micros() as u64 > deadline
    }

    fn install(self: &Arc<Self>, lua: &Lua) {
        let Some(limit) = self.limit else {
            return;
        };
        let watchdog = Arc::clone(self);
        lua.set_hook(
            HookTriggers::new().every_nth_instruction(WATCHDOG_HOOK_INTERVAL),
            move |_lua, _debug| {
                if watchdog.expired() {
                    return Err(mlua::Error::RuntimeError(format!(
                        "callback exceeded time limit ({}ms)",
                        limit.as_millis()
                    )));
                }
                Ok(VmState::Continue)
            },
        );
    }
}

/// Keeps the watchdog armed for the current dispatch.
pub(crate) struct DeadlineGuard<'a> {
    watchdog: &'a Watchdog,
    previous: u64,
}

impl Drop for DeadlineGuard<'_> {
    fn drop(&mut self) {
        self.watchdog.deadline_us.store(self.previous, Ordering::SeqCst);
    }
}

// =============================================================================
// Engine handle
// =============================================================================

/// Exclusive access to the script engine.
pub(crate) struct EngineHandle {
    lua: Mutex<Option<Lua>>,
    watchdog: Arc<Watchdog>,
}

impl EngineHandle {
    pub fn new(lua: Lua, watchdog: Arc<Watchdog>) -> Self {
        Self { lua: Mutex::new(Some(lua)), watchdog }
    }

    /// Run `f` with the engine locked. `None` once the engine is torn down.
    pub fn with<R>(&self, f: impl FnOnce(&Lua) -> R) -> Option<R> {
        let guard = self.lua.lock();
        guard.as_ref().map(f)
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Release persistent references and drop the engine. Waits for any
    /// in-flight dispatch to finish first.
    pub fn teardown(&self) -> bool {
        let mut guard = self.lua.lock();
        match guard.take() {
            Some(lua) => {
                lua.remove_hook();
                PersistentSlot::clear_all(&lua);
                drop(lua);
                log::debug!(target: "luma::engine", "engine torn down");
                true
            }
            None => false,
        }
    }
}

// =============================================================================
// Engine construction
// =============================================================================

/// Everything the global surface is built from.
pub(crate) struct EngineSetup<'a> {
    pub process: &'a ProcessInfo,
    pub scheduler: Arc<Scheduler>,
    pub loader: Arc<ModuleLoader>,
    pub console: Arc<Console>,
    pub overlays: Arc<Overlays>,
    pub host: Arc<dyn Host>,
    pub globals: &'a [Arc<dyn BindingProvider>],
    pub watchdog: Arc<Watchdog>,
    pub sandbox: bool,
}

/// Create a Lua state with the full global surface installed, ready for
/// bootstrap.
pub(crate) fn create_engine(setup: EngineSetup<'_>) -> mlua::Result<Lua> {
    let lua = Lua::new();
    let globals = lua.globals();

    if setup.sandbox {
        for name in SANDBOX_REMOVED {
            globals.set(name, Value::Nil)?;
        }
    }

    setup.watchdog.install(&lua);

    ConsoleBindings { console: setup.console.clone() }.install(&lua, &globals)?;
    DiagnosticBindings {
        overlays: setup.overlays.clone(),
        host: setup.host.clone(),
    }
    .install(&lua, &globals)?;

    let register_draw = register_callback_fn(&lua, DRAW_CALLBACK, "registerDrawCallback")?;
    let register_event = register_callback_fn(&lua, EVENT_CALLBACK, "registerEventCallback")?;
    globals.set("registerDrawCallback", register_draw.clone())?;
    globals.set("registerEventCallback", register_event.clone())?;
    globals.set("setTimer", set_timer_fn(&lua, setup.scheduler.clone())?)?;

    let process = build_process(&lua, &setup)?;
    process.set("registerDrawCallback", register_draw)?;
    process.set("registerEventCallback", register_event)?;
    globals.set("process", process.clone())?;
    PROCESS.set(&lua, process)?;

    for provider in setup.globals {
        provider.install(&lua, &globals)?;
        log::debug!(target: "luma::engine", "installed global bindings '{}'", provider.name());
    }

    Ok(lua)
}

fn build_process(lua: &Lua, setup: &EngineSetup<'_>) -> mlua::Result<Table> {
    let process = lua.create_table()?;
    let info = setup.process;

    process.set("argv", lua.create_sequence_from(info.argv.iter().map(|a| a.as_str()))?)?;
    process.set("cwd", info.cwd.as_str())?;
    process.set("execPath", info.exec_path.as_str())?;
    process.set("env", lua.create_table()?)?;
    process.set("platform", std::env::consts::OS)?;

    let versions = lua.create_table()?;
    versions.set("luma", env!("CARGO_PKG_VERSION"))?;
    versions.set("lua", "5.4")?;
    process.set("versions", versions)?;

    let handles = setup.loader.install(lua)?;
    process.set("modules", handles.list)?;
    process.set("_moduleCache", handles.cache)?;
    process.set("nativeBinding", handles.native_binding)?;

    let scheduler = setup.scheduler.clone();
    process.set(
        "nextFrame",
        lua.create_function(move |_, (callback, front): (Value, Value)| {
            let callback = expect_function(callback, "process.nextFrame")?;
            scheduler
                .next_frame(callback, truthy(&front))
                .map_err(queue_error)
        })?,
    )?;

    let host = setup.host.clone();
    process.set(
        "quit",
        lua.create_function(move |_, ()| {
            host.request_quit();
            Ok(())
        })?,
    )?;

    Ok(process)
}

fn register_callback_fn(lua: &Lua, slot: PersistentSlot, fn_name: &'static str) -> mlua::Result<Function> {
    lua.create_function(move |lua, callback: Value| {
        let callback = expect_function(callback, fn_name)?;
        slot.set(lua, callback)?;
        log::debug!(target: "luma::engine", "{} callback registered", slot.what());
        Ok(())
    })
}

/// `setTimer(fn, delayMs, repeat) -> id` or `setTimer(id)` to clear.
fn set_timer_fn(lua: &Lua, scheduler: Arc<Scheduler>) -> mlua::Result<Function> {
    lua.create_function(move |_, args: MultiValue| {
        let mut args = args.into_iter();
        let first = args.next().unwrap_or(Value::Nil);
        let delay = args.next().unwrap_or(Value::Nil);
        let repeat = args.next().unwrap_or(Value::Nil);

        match first {
            Value::Integer(id) => {
                if id > 0 {
                    scheduler.clear_timer(id as u64);
                }
                Ok(Value::Nil)
            }
            Value::Number(id) => {
                // Only whole ids name a timer; 1.5 must not clear timer 1.
                if id.fract() == 0.0 && id >= 1.0 {
                    scheduler.clear_timer(id as u64);
                }
                Ok(Value::Nil)
            }
            Value::Function(callback) => {
                let delay_ms = match delay {
                    Value::Nil => 0.0,
                    Value::Integer(ms) => ms as f64,
                    Value::Number(ms) => ms,
                    other => {
                        return Err(mlua::Error::RuntimeError(format!(
                            "setTimer: delay must be a number, got {}",
                            other.type_name()
                        )))
                    }
                };
                let id = scheduler
                    .set_timer(delay_ms, truthy(&repeat), callback)
                    .map_err(queue_error)?;
                Ok(Value::Integer(id as i64))
            }
            other => Err(mlua::Error::RuntimeError(format!(
                "setTimer: expected a function or timer id, got {}",
                other.type_name()
            ))),
        }
    })
}

fn expect_function(value: Value, fn_name: &str) -> mlua::Result<Function> {
    match value {
        Value::Function(f) => Ok(f),
        other => Err(mlua::Error::RuntimeError(format!(
            "{}: expected a function, got {}",
            fn_name,
            other.type_name()
        ))),
    }
}

fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Nil | Value::Boolean(false))
}

fn queue_error(e: QueueError) -> mlua::Error {
    match e {
        QueueError::Full => mlua::Error::RuntimeError("execution queue is full".to_string()),
        QueueError::Canceled => mlua::Error::RuntimeError("runtime is shutting down".to_string()),
    }
}
