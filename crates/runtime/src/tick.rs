//! Render tick: timers, execution-queue drain, draw callback.

use std::time::{Duration, Instant};

use mlua::{Function, Lua};

use crate::engine::Watchdog;
use crate::format::format_lua_error;
use crate::persistent::DRAW_CALLBACK;
use crate::scheduler::Scheduler;

/// Length of one frame-rate counting window.
pub const STATS_INTERVAL: Duration = Duration::from_millis(1000);

/// Timing figures for the most recent tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// Milliseconds since the previous tick (0 on the first).
    pub elapsed_ms: f64,
    /// Frames counted in the last complete interval.
    pub frame_rate: u32,
    pub total_frames: u64,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickReport {
    pub stats: FrameStats,
    /// Due timers moved onto the execution queue this tick.
    pub timers_fired: usize,
    /// Queued callbacks invoked (including ones that failed).
    pub callbacks_run: usize,
    /// Whether a draw callback was registered and invoked.
    pub drew: bool,
    /// Script errors caught and logged during this tick.
    pub errors: usize,
}

/// Elapsed-time and frame-rate bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct FrameClock {
    last: Option<Instant>,
    interval_start: Option<Instant>,
    frames_in_interval: u32,
    stats: FrameStats,
}

impl FrameClock {
    /// Record a tick at `now`. Returns true when a counting interval closed.
    pub fn advance(&mut self, now: Instant) -> bool {
        self.stats.elapsed_ms = match self.last {
            Some(last) => now.saturating_duration_since(last).as_secs_f64() * 1000.0,
            None => 0.0,
        };
        self.last = Some(now);
        self.stats.total_frames += 1;
        self.frames_in_interval += 1;

        let start = *self.interval_start.get_or_insert(now);
        if now.saturating_duration_since(start) >= STATS_INTERVAL {
            self.stats.frame_rate = self.frames_in_interval;
            self.frames_in_interval = 0;
            self.interval_start = Some(now);
            return true;
        }
        false
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}

/// One tick's work, run with engine access held.
///
/// Tokens queued while the drain runs are left for the next tick.
pub(crate) fn run_tick(
    lua: &Lua,
    scheduler: &Scheduler,
    watchdog: &Watchdog,
    stats: FrameStats,
    cursor: (f64, f64),
    now: Instant,
) -> TickReport {
    let mut report = TickReport { stats, ..TickReport::default() };

    report.timers_fired = scheduler.sweep_timers(now);

    for token in scheduler.take_queued() {
        report.callbacks_run += 1;
        let _deadline = watchdog.arm();
        if let Err(e) = token.invoke() {
            report.errors += 1;
            log::error!(target: "luma::tick", "queued callback failed: {}", format_lua_error(&e));
        }
    }

    match DRAW_CALLBACK.get::<Option<Function>>(lua) {
        Ok(Some(draw)) => {
            report.drew = true;
            let _deadline = watchdog.arm();
            if let Err(e) = draw.call::<()>((stats.elapsed_ms, cursor.0, cursor.1)) {
                report.errors += 1;
                log::error!(target: "luma::tick", "draw callback failed: {}", format_lua_error(&e));
            }
        }
        Ok(None) => {}
        Err(e) => {
            report.errors += 1;
            log::error!(target: "luma::tick", "draw callback unavailable: {}", e);
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_has_zero_elapsed() {
        let mut clock = FrameClock::default();
        let start = Instant::now();
        clock.advance(start);
        assert_eq!(clock.stats().elapsed_ms, 0.0);
        clock.advance(start + Duration::from_millis(16));
        assert!((clock.stats().elapsed_ms - 16.0).abs() < 1e-6);
        assert_eq!(clock.stats().total_frames, 2);
    }

    #[test]
    fn test_frame_rate_counted_per_interval() {
        let mut clock = FrameClock::default();
        let start = Instant::now();
        let mut closed = 0;
        for i in 0..=60u64 {
            if clock.advance(start + Duration::from_micros(i * 16_667)) {
                closed += 1;
            }
        }
        assert_eq!(closed, 1);
        assert_eq!(clock.stats().frame_rate, 61);
        assert_eq!(clock.stats().total_frames, 61);
    }

    #[test]
    fn test_tick_drains_then_draws() {
        let lua = Lua::new();
        lua.load("trace = ''").exec().unwrap();
        let scheduler = Scheduler::new(8);
        let queued: Function = lua.load("function() trace = trace .. 'q' end").eval().unwrap();
        scheduler.next_frame(queued, false).unwrap();
        let draw: Function = lua
            .load("function(dt, x, y) trace = trace .. 'd' .. x .. ',' .. y end")
            .eval()
            .unwrap();
        DRAW_CALLBACK.set(&lua, draw).unwrap();

        let watchdog = Watchdog::new(None);
        let report = run_tick(&lua, &scheduler, &watchdog, FrameStats::default(), (3.0, 4.0), Instant::now());
        assert_eq!(report.callbacks_run, 1);
        assert!(report.drew);
        assert_eq!(report.errors, 0);
        assert_eq!(lua.globals().get::<String>("trace").unwrap(), "qd3.0,4.0");
    }

    #[test]
    fn test_errors_logged_not_fatal() {
        let lua = Lua::new();
        let scheduler = Scheduler::new(8);
        let bad: Function = lua.load("function() error('queued boom') end").eval().unwrap();
        let good: Function = lua.load("function() ran = true end").eval().unwrap();
        scheduler.next_frame(bad, false).unwrap();
        scheduler.next_frame(good, false).unwrap();
        let draw: Function = lua.load("function() error('draw boom') end").eval().unwrap();
        DRAW_CALLBACK.set(&lua, draw).unwrap();

        let watchdog = Watchdog::new(None);
        let report = run_tick(&lua, &scheduler, &watchdog, FrameStats::default(), (0.0, 0.0), Instant::now());
        assert_eq!(report.callbacks_run, 2);
        assert_eq!(report.errors, 2);
        assert!(lua.globals().get::<bool>("ran").unwrap());
    }

    #[test]
    fn test_no_draw_callback_is_noop() {
        let lua = Lua::new();
        let scheduler = Scheduler::new(8);
        let watchdog = Watchdog::new(None);
        let report = run_tick(&lua, &scheduler, &watchdog, FrameStats::default(), (0.0, 0.0), Instant::now());
        assert!(!report.drew);
        assert_eq!(report.errors, 0);
    }
}
