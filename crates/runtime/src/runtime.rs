//! Host-facing runtime context.
//!
//! A `Runtime` owns the engine, both queues, the timer table and the event
//! thread. The host constructs it, calls `initialize` once, then `tick` once
//! per frame from its drawing thread; host input threads send events through
//! cloned `EventSender`s. `shutdown` (or drop) tears everything down in order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use mlua::{Function, Lua, MultiValue, Table, Value};

use crate::bindings::{BindingProvider, Overlays};
use crate::console::{Console, ConsoleOutput, DEFAULT_CONSOLE_LINES};
use crate::engine::{create_engine, EngineHandle, EngineSetup, Watchdog, DEFAULT_CALLBACK_TIMEOUT};
use crate::error::RuntimeError;
use crate::event::{EventQueue, EventSender};
use crate::event_thread;
use crate::format::{format_lua_error, lua_value_to_string};
use crate::host::{Host, ProcessInfo, QuitFlag};
use crate::modules::{ModuleLoader, ModuleTable};
use crate::persistent::{MODULE_LIST, PROCESS};
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::scheduler::Scheduler;
use crate::tick::{run_tick, FrameClock, FrameStats, TickReport};

/// Construction parameters for a `Runtime`.
pub struct RuntimeOptions {
    pub process: ProcessInfo,
    pub modules: ModuleTable,
    pub exec_queue_capacity: usize,
    pub event_queue_capacity: usize,
    /// Wall-clock limit for one dispatch; `None` disables the watchdog.
    pub callback_timeout: Option<Duration>,
    pub sandbox: bool,
    pub console_lines: usize,
    pub host: Arc<dyn Host>,
    /// Installed onto the globals before bootstrap.
    pub globals: Vec<Arc<dyn BindingProvider>>,
    /// Installed into the environment of the native module they are named for.
    pub capabilities: Vec<Arc<dyn BindingProvider>>,
    pub overlays: Overlays,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            process: ProcessInfo::from_env(),
            modules: ModuleTable::builtin(),
            exec_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            event_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            callback_timeout: Some(DEFAULT_CALLBACK_TIMEOUT),
            sandbox: true,
            console_lines: DEFAULT_CONSOLE_LINES,
            host: Arc::new(QuitFlag::new()),
            globals: Vec::new(),
            capabilities: Vec::new(),
            overlays: Overlays::default(),
        }
    }
}

impl RuntimeOptions {
    /// Builtin modules plus `source` registered as the `main` module.
    pub fn with_main(source: impl Into<String>) -> Self {
        let mut options = Self::default();
        options.modules = options.modules.with_module(crate::modules::MAIN_MODULE, source.into());
        options
    }
}

/// The runtime context.
pub struct Runtime {
    engine: Arc<EngineHandle>,
    scheduler: Arc<Scheduler>,
    events: Arc<EventQueue>,
    loader: Arc<ModuleLoader>,
    console: Arc<Console>,
    overlays: Arc<Overlays>,
    host: Arc<dyn Host>,
    shutdown: Arc<AtomicBool>,
    event_thread: Option<JoinHandle<()>>,
    clock: FrameClock,
    cursor: (f64, f64),
    initialized: bool,
}

impl Runtime {
    /// Boot the engine and build the global surface. Does not run bootstrap.
    pub fn new(options: RuntimeOptions) -> Result<Self, RuntimeError> {
        let scheduler = Arc::new(Scheduler::new(options.exec_queue_capacity));
        let events = Arc::new(EventQueue::new(options.event_queue_capacity));
        let loader = Arc::new(ModuleLoader::new(options.modules, options.capabilities));
        let console = Arc::new(Console::new(options.console_lines));
        let overlays = Arc::new(options.overlays);
        let watchdog = Arc::new(Watchdog::new(options.callback_timeout));

        let lua = create_engine(EngineSetup {
            process: &options.process,
            scheduler: scheduler.clone(),
            loader: loader.clone(),
            console: console.clone(),
            overlays: overlays.clone(),
            host: options.host.clone(),
            globals: &options.globals,
            watchdog: watchdog.clone(),
            sandbox: options.sandbox,
        })
        .map_err(|e| RuntimeError::Bootstrap(format!("engine setup failed: {}", format_lua_error(&e))))?;

        log::debug!(
            target: "luma::engine",
            "engine ready (exec queue {}, event queue {}, timeout {:?})",
            options.exec_queue_capacity,
            options.event_queue_capacity,
            watchdog.limit()
        );

        Ok(Self {
            engine: Arc::new(EngineHandle::new(lua, watchdog)),
            scheduler,
            events,
            loader,
            console,
            overlays,
            host: options.host,
            shutdown: Arc::new(AtomicBool::new(false)),
            event_thread: None,
            clock: FrameClock::default(),
            cursor: (0.0, 0.0),
            initialized: false,
        })
    }

    /// Run the bootstrap module, then start the event thread.
    ///
    /// `entry` replaces the module table's bootstrap source when given. A
    /// missing entry, or one that does not evaluate to a function, is fatal
    /// (`RuntimeError::Bootstrap`). An error thrown while the bootstrap
    /// function runs is returned as `RuntimeError::Script` and the event
    /// thread is not started.
    pub fn initialize(&mut self, entry: Option<&str>) -> Result<(), RuntimeError> {
        if self.initialized {
            return Ok(());
        }
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(RuntimeError::ShutDown);
        }

        let source = match entry {
            Some(source) => source.to_string(),
            None => self.loader.table().bootstrap().unwrap_or_default().to_string(),
        };
        if source.trim().is_empty() {
            return Err(RuntimeError::Bootstrap("no bootstrap source".to_string()));
        }

        let engine = self.engine.clone();
        engine
            .with(|lua| run_bootstrap(lua, engine.watchdog(), &source))
            .ok_or(RuntimeError::ShutDown)??;

        let handle = event_thread::spawn(
            self.engine.clone(),
            self.events.clone(),
            self.host.clone(),
            self.shutdown.clone(),
        )?;
        self.event_thread = Some(handle);
        self.initialized = true;
        log::info!(target: "luma::engine", "runtime initialized");
        Ok(())
    }

    /// One render tick. Script errors are logged and counted in the report;
    /// the only error is calling after shutdown.
    pub fn tick(&mut self) -> Result<TickReport, RuntimeError> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Result<TickReport, RuntimeError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(RuntimeError::ShutDown);
        }
        let interval_closed = self.clock.advance(now);
        let stats = self.clock.stats();
        let cursor = self.cursor;

        let report = self
            .engine
            .with(|lua| run_tick(lua, &self.scheduler, self.engine.watchdog(), stats, cursor, now))
            .ok_or(RuntimeError::ShutDown)?;

        if interval_closed && (self.overlays.frame_rate() || self.overlays.stats()) {
            log::info!(
                target: "luma::tick",
                "{} fps, frame {}, {} queued, {} timers",
                stats.frame_rate,
                stats.total_frames,
                self.scheduler.queued(),
                self.scheduler.pending_timers()
            );
        }
        Ok(report)
    }

    /// Cursor position passed to the draw callback.
    pub fn set_cursor(&mut self, x: f64, y: f64) {
        self.cursor = (x, y);
    }

    /// Handle for host threads to post events.
    pub fn event_sender(&self) -> EventSender {
        EventSender::new(self.events.clone())
    }

    pub fn overlays(&self) -> &Overlays {
        &self.overlays
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.clock.stats()
    }

    /// Script output written since the last call.
    pub fn take_console(&self) -> ConsoleOutput {
        self.console.take()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Number of callbacks waiting for the next tick.
    pub fn queued_callbacks(&self) -> usize {
        self.scheduler.queued()
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending_timers()
    }

    /// Run host code with engine access held and the watchdog armed.
    pub fn with_lua<R>(&self, f: impl FnOnce(&Lua) -> mlua::Result<R>) -> Result<R, RuntimeError> {
        self.engine
            .with(|lua| {
                let _deadline = self.engine.watchdog().arm();
                f(lua)
            })
            .ok_or(RuntimeError::ShutDown)?
            .map_err(RuntimeError::from)
    }

    /// Evaluate a chunk and render its results (expression or statements).
    pub fn eval(&self, source: &str) -> Result<String, RuntimeError> {
        self.with_lua(|lua| {
            let values: MultiValue = lua.load(source).set_name("eval").eval()?;
            Ok(values
                .iter()
                .map(lua_value_to_string)
                .collect::<Vec<_>>()
                .join("\t"))
        })
    }

    /// Resolve a native module from the host side. Failures come back as
    /// `RuntimeError::Module`.
    pub fn require(&self, name: &str) -> Result<(), RuntimeError> {
        let loader = self.loader.clone();
        self.engine
            .with(|lua| {
                let _deadline = self.engine.watchdog().arm();
                loader.resolve(lua, name, false).map(|_| ())
            })
            .ok_or(RuntimeError::ShutDown)?
            .map_err(|e| RuntimeError::Module {
                name: name.to_string(),
                message: format_lua_error(&e),
            })
    }

    /// Display names in `process.modules`, in load order.
    pub fn loaded_modules(&self) -> Result<Vec<String>, RuntimeError> {
        self.with_lua(|lua| {
            let list: Table = MODULE_LIST.get(lua)?;
            list.sequence_values::<String>().collect()
        })
    }

    /// Tear down: flag, cancel both queues, join the event thread, drop
    /// timers and persistent references, drop the engine. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!(target: "luma::engine", "shutting down");

        let dropped_events = self.events.cancel().len();
        let (dropped_callbacks, dropped_timers) = self.scheduler.shutdown();
        if dropped_events + dropped_callbacks + dropped_timers > 0 {
            log::debug!(
                target: "luma::engine",
                "dropped {} events, {} callbacks, {} timers",
                dropped_events,
                dropped_callbacks,
                dropped_timers
            );
        }

        if let Some(handle) = self.event_thread.take() {
            if handle.join().is_err() {
                log::error!(target: "luma::engine", "event thread panicked");
            }
        }

        self.engine.teardown();
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Evaluate the entry source to a function and call it with `process`.
fn run_bootstrap(lua: &Lua, watchdog: &Watchdog, source: &str) -> Result<(), RuntimeError> {
    let _deadline = watchdog.arm();

    let entry: Value = lua
        .load(source)
        .set_name("bootstrap")
        .eval()
        .map_err(|e| RuntimeError::Bootstrap(format_lua_error(&e)))?;
    let entry: Function = match entry {
        Value::Function(f) => f,
        other => {
            return Err(RuntimeError::Bootstrap(format!(
                "entry evaluated to {}, expected a function",
                other.type_name()
            )))
        }
    };

    let process: Table = PROCESS.get(lua)?;
    entry.call::<()>(process).map_err(|e| {
        let message = format_lua_error(&e);
        log::error!(target: "luma::engine", "bootstrap failed: {}", message);
        RuntimeError::Script(message)
    })
}
