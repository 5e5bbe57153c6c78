//! Luma script runtime.
//!
//! Embeds a single Lua 5.4 state and serializes every call into it behind one
//! lock. Two consumers take turns:
//!
//! - the host's drawing thread, which calls [`Runtime::tick`] once per frame
//!   to fire due timers, drain the execution queue and invoke the draw
//!   callback;
//! - a dedicated event thread, which drains the event queue in batches and
//!   hands each event to the registered event callback.
//!
//! Scripts see a small global surface: `registerDrawCallback`,
//! `registerEventCallback`, `setTimer`, `print`/`log`, and a `process` table
//! whose `nativeBinding` resolves compiled-in native modules.
//!
//! ```no_run
//! use luma_runtime::{Runtime, RuntimeOptions};
//!
//! let mut rt = Runtime::new(RuntimeOptions::with_main(
//!     "local frames = 0 app.draw(function() frames = frames + 1 end)",
//! ))?;
//! rt.initialize(None)?;
//! rt.event_sender().resize(800, 600)?;
//! for _ in 0..60 {
//!     rt.tick()?;
//! }
//! rt.shutdown();
//! # Ok::<(), luma_runtime::RuntimeError>(())
//! ```

pub mod bindings;
pub mod console;
mod engine;
pub mod error;
pub mod event;
mod event_thread;
pub mod format;
pub mod host;
pub mod modules;
mod persistent;
pub mod queue;
mod runtime;
mod scheduler;
pub mod tick;
pub mod timers;
pub mod token;

pub use bindings::{bindings, BindingProvider, Overlays};
pub use console::ConsoleOutput;
pub use engine::{DEFAULT_CALLBACK_TIMEOUT, WATCHDOG_HOOK_INTERVAL};
pub use error::{QueueError, RuntimeError};
pub use event::{Event, EventSender};
pub use host::{Host, ProcessInfo, QuitFlag};
pub use modules::{ModuleTable, NativeModule};
pub use runtime::{Runtime, RuntimeOptions};
pub use tick::{FrameStats, TickReport};

/// Re-exported so hosts can write binding providers without a direct
/// dependency.
pub use mlua;
