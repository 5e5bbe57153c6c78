//! Event thread: waits on the event queue and dispatches whole batches to the
//! registered event callback under one engine acquisition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mlua::{Function, Lua};

use crate::engine::{EngineHandle, Watchdog};
use crate::error::RuntimeError;
use crate::event::{Event, EventQueue};
use crate::format::format_lua_error;
use crate::host::Host;
use crate::persistent::EVENT_CALLBACK;

pub(crate) const EVENT_THREAD_NAME: &str = "luma-events";

/// Counts for one dispatched batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchReport {
    pub dispatched: usize,
    pub errors: usize,
}

pub(crate) fn spawn(
    engine: Arc<EngineHandle>,
    events: Arc<EventQueue>,
    host: Arc<dyn Host>,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, RuntimeError> {
    thread::Builder::new()
        .name(EVENT_THREAD_NAME.to_string())
        .spawn(move || run(&engine, &events, host.as_ref(), &shutdown))
        .map_err(|e| RuntimeError::Thread(format!("failed to spawn event thread: {}", e)))
}

fn run(engine: &EngineHandle, events: &EventQueue, host: &dyn Host, shutdown: &AtomicBool) {
    log::debug!(target: "luma::events", "event thread started");
    // pop() blocks until an event arrives or the queue is canceled.
    while let Some(first) = events.pop() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let dispatched = engine.with(|lua| {
            dispatch_batch(lua, engine.watchdog(), first, events, host, shutdown)
        });
        match dispatched {
            Some(report) if report.errors > 0 => {
                log::debug!(
                    target: "luma::events",
                    "batch of {} events had {} errors",
                    report.dispatched,
                    report.errors
                );
            }
            Some(_) => {}
            None => break,
        }
    }
    log::debug!(target: "luma::events", "event thread exiting");
}

/// Dispatch `first` plus everything queued behind it, in order.
pub(crate) fn dispatch_batch(
    lua: &Lua,
    watchdog: &Watchdog,
    first: Event,
    events: &EventQueue,
    host: &dyn Host,
    shutdown: &AtomicBool,
) -> BatchReport {
    let mut report = BatchReport::default();
    let batch = std::iter::once(first).chain(events.take_all());
    for event in batch {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        report.dispatched += 1;
        if let Err(e) = dispatch_one(lua, watchdog, &event, host) {
            report.errors += 1;
            log::error!(
                target: "luma::events",
                "event:{} callback failed: {}",
                event.tag(),
                format_lua_error(&e)
            );
        }
    }
    report
}

/// The callback is looked up per event, so a re-registration made while
/// handling one event applies to the next one in the same batch.
fn dispatch_one(
    lua: &Lua,
    watchdog: &Watchdog,
    event: &Event,
    host: &dyn Host,
) -> mlua::Result<()> {
    let args = match event {
        Event::ShutdownRequest => {
            log::info!(target: "luma::events", "shutdown requested by host");
            host.request_quit();
            return Ok(());
        }
        _ => event.to_args(lua)?,
    };
    let callback: Option<Function> = EVENT_CALLBACK.get(lua)?;
    let (Some(callback), Some(args)) = (callback, args) else {
        return Ok(());
    };
    let _deadline = watchdog.arm();
    callback.call::<()>(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::QuitFlag;

    fn recorder(lua: &Lua) {
        let f: Function = lua
            .load(
                "seen = {}
                 return function(kind, a, b)
                   seen[#seen + 1] = kind .. ':' .. tostring(a) .. ':' .. tostring(b)
                 end",
            )
            .call(())
            .unwrap();
        EVENT_CALLBACK.set(lua, f).unwrap();
    }

    fn seen(lua: &Lua) -> Vec<String> {
        lua.load("return table.concat(seen, '|')")
            .eval::<String>()
            .unwrap()
            .split('|')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_batch_dispatch_in_fifo_order() {
        let lua = Lua::new();
        recorder(&lua);
        let queue = EventQueue::new(8);
        queue.push(Event::KeyDown { code: 65, ch: Some('a') }).unwrap();
        queue.push(Event::MouseUp).unwrap();
        let quit = QuitFlag::new();
        let shutdown = AtomicBool::new(false);

        let report = dispatch_batch(
            &lua,
            &Watchdog::new(None),
            Event::Resize { width: 800, height: 600 },
            &queue,
            &quit,
            &shutdown,
        );
        assert_eq!(report, BatchReport { dispatched: 3, errors: 0 });
        assert_eq!(seen(&lua), vec!["resize:800:600", "keydown:65:a", "mouseup:nil:nil"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_shutdown_request_goes_to_host() {
        let lua = Lua::new();
        recorder(&lua);
        let queue = EventQueue::new(8);
        let quit = QuitFlag::new();
        let shutdown = AtomicBool::new(false);

        dispatch_batch(&lua, &Watchdog::new(None), Event::ShutdownRequest, &queue, &quit, &shutdown);
        assert!(quit.is_set());
        assert!(seen(&lua).is_empty());
    }

    #[test]
    fn test_no_callback_is_silent() {
        let lua = Lua::new();
        let queue = EventQueue::new(8);
        let report = dispatch_batch(
            &lua,
            &Watchdog::new(None),
            Event::MouseDown,
            &queue,
            &QuitFlag::new(),
            &AtomicBool::new(false),
        );
        assert_eq!(report, BatchReport { dispatched: 1, errors: 0 });
    }

    #[test]
    fn test_error_does_not_stop_batch() {
        let lua = Lua::new();
        let f: Function = lua
            .load("count = 0 return function(kind) count = count + 1 if kind == 'mousedown' then error('bad') end end")
            .call(())
            .unwrap();
        EVENT_CALLBACK.set(&lua, f).unwrap();
        let queue = EventQueue::new(8);
        queue.push(Event::MouseUp).unwrap();

        let report = dispatch_batch(
            &lua,
            &Watchdog::new(None),
            Event::MouseDown,
            &queue,
            &QuitFlag::new(),
            &AtomicBool::new(false),
        );
        assert_eq!(report, BatchReport { dispatched: 2, errors: 1 });
        assert_eq!(lua.globals().get::<i64>("count").unwrap(), 2);
    }

    #[test]
    fn test_reregistration_applies_within_batch() {
        let lua = Lua::new();
        let register = lua
            .create_function(|lua, f: Function| EVENT_CALLBACK.set(lua, f))
            .unwrap();
        lua.globals().set("registerEventCallback", register).unwrap();
        let f: Function = lua
            .load(
                "seen = {}
                 local function replacement(kind) seen[#seen + 1] = 'new:' .. kind end
                 return function(kind)
                   seen[#seen + 1] = 'old:' .. kind
                   registerEventCallback(replacement)
                 end",
            )
            .call(())
            .unwrap();
        EVENT_CALLBACK.set(&lua, f).unwrap();

        let queue = EventQueue::new(8);
        queue.push(Event::MouseUp).unwrap();
        queue.push(Event::Resize { width: 1, height: 2 }).unwrap();
        let report = dispatch_batch(
            &lua,
            &Watchdog::new(None),
            Event::MouseDown,
            &queue,
            &QuitFlag::new(),
            &AtomicBool::new(false),
        );
        assert_eq!(report, BatchReport { dispatched: 3, errors: 0 });
        assert_eq!(seen(&lua), vec!["old:mousedown", "new:mouseup", "new:resize"]);
    }

    #[test]
    fn test_no_dispatch_after_shutdown_flag() {
        let lua = Lua::new();
        recorder(&lua);
        let queue = EventQueue::new(8);
        let report = dispatch_batch(
            &lua,
            &Watchdog::new(None),
            Event::MouseDown,
            &queue,
            &QuitFlag::new(),
            &AtomicBool::new(true),
        );
        assert_eq!(report.dispatched, 0);
        assert!(seen(&lua).is_empty());
    }
}
