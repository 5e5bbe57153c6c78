//! Execution queue plus timer table: everything that schedules a script call
//! for a later tick.

use std::time::Instant;

use mlua::Function;
use parking_lot::Mutex;

use crate::error::QueueError;
use crate::queue::BoundedQueue;
use crate::timers::{Scheduled, TimerId, TimerService};
use crate::token::CallbackToken;

pub(crate) struct Scheduler {
    exec: BoundedQueue<CallbackToken>,
    timers: Mutex<TimerService>,
}

impl Scheduler {
    pub fn new(exec_capacity: usize) -> Self {
        Self {
            exec: BoundedQueue::new(exec_capacity),
            timers: Mutex::new(TimerService::new()),
        }
    }

    /// Queue `callback` for the next drain. Called from script, so it never
    /// blocks: a full queue is an error for the caller instead.
    pub fn next_frame(&self, callback: Function, front: bool) -> Result<(), QueueError> {
        let token = CallbackToken::new(callback);
        if front {
            self.exec.try_push_front(token)
        } else {
            self.exec.try_push(token)
        }
    }

    pub fn set_timer(
        &self,
        delay_ms: f64,
        repeat: bool,
        callback: Function,
    ) -> Result<TimerId, QueueError> {
        let scheduled = self.timers.lock().set(delay_ms, repeat, callback, Instant::now());
        match scheduled {
            Scheduled::Immediate(id, token) => {
                self.exec.try_push(token)?;
                Ok(id)
            }
            Scheduled::Pending(id) => Ok(id),
        }
    }

    pub fn clear_timer(&self, id: TimerId) -> bool {
        self.timers.lock().clear(id)
    }

    /// Move due timer tokens onto the execution queue. Only as many as fit are
    /// taken; the rest stay due for the next sweep.
    pub fn sweep_timers(&self, now: Instant) -> usize {
        let room = self.exec.remaining();
        if room == 0 {
            return 0;
        }
        let due = self.timers.lock().take_due(now, room);
        let mut moved = 0;
        for token in due {
            match self.exec.try_push(token) {
                Ok(()) => moved += 1,
                Err(e) => {
                    log::warn!(target: "luma::tick", "dropped due timer: {}", e);
                }
            }
        }
        moved
    }

    /// Snapshot of the queue for one drain pass.
    pub fn take_queued(&self) -> Vec<CallbackToken> {
        self.exec.take_all()
    }

    pub fn queued(&self) -> usize {
        self.exec.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.lock().len()
    }

    /// Cancel the queue and drop every timer. Returns (queued, timers) dropped.
    pub fn shutdown(&self) -> (usize, usize) {
        let queued = self.exec.cancel().len();
        let timers = self.timers.lock().clear_all();
        (queued, timers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::Lua;
    use std::time::Duration;

    fn counter_fn(lua: &Lua, name: &str) -> Function {
        lua.load(format!("function() {name} = ({name} or 0) + 1 end"))
            .eval()
            .unwrap()
    }

    fn drain(scheduler: &Scheduler) -> usize {
        let tokens = scheduler.take_queued();
        let n = tokens.len();
        for token in tokens {
            token.invoke().unwrap();
        }
        n
    }

    #[test]
    fn test_short_timer_matches_next_frame() {
        let lua = Lua::new();
        let scheduler = Scheduler::new(16);
        scheduler.next_frame(counter_fn(&lua, "a"), false).unwrap();
        scheduler.set_timer(1.0, false, counter_fn(&lua, "b")).unwrap();
        scheduler.set_timer(0.0, true, counter_fn(&lua, "c")).unwrap();

        assert_eq!(scheduler.pending_timers(), 0);
        assert_eq!(drain(&scheduler), 3);
        for name in ["a", "b", "c"] {
            assert_eq!(lua.globals().get::<i64>(name).unwrap(), 1);
        }
    }

    #[test]
    fn test_front_insert_runs_first() {
        let lua = Lua::new();
        lua.load("order = ''").exec().unwrap();
        let scheduler = Scheduler::new(4);
        let a: Function = lua.load("function() order = order .. 'a' end").eval().unwrap();
        let b: Function = lua.load("function() order = order .. 'b' end").eval().unwrap();
        scheduler.next_frame(a, false).unwrap();
        scheduler.next_frame(b, true).unwrap();
        drain(&scheduler);
        assert_eq!(lua.globals().get::<String>("order").unwrap(), "ba");
    }

    #[test]
    fn test_full_queue_rejects_script_push() {
        let lua = Lua::new();
        let scheduler = Scheduler::new(1);
        scheduler.next_frame(counter_fn(&lua, "x"), false).unwrap();
        assert_eq!(
            scheduler.next_frame(counter_fn(&lua, "x"), false),
            Err(QueueError::Full)
        );
        assert_eq!(
            scheduler.set_timer(0.0, false, counter_fn(&lua, "x")),
            Err(QueueError::Full)
        );
    }

    #[test]
    fn test_sweep_moves_due_timers() {
        let lua = Lua::new();
        let scheduler = Scheduler::new(8);
        let id = scheduler.set_timer(500.0, false, counter_fn(&lua, "t")).unwrap();

        assert_eq!(scheduler.sweep_timers(Instant::now()), 0);
        let later = Instant::now() + Duration::from_millis(600);
        assert_eq!(scheduler.sweep_timers(later), 1);
        assert_eq!(drain(&scheduler), 1);
        assert!(!scheduler.clear_timer(id));
    }

    #[test]
    fn test_sweep_limited_by_queue_room() {
        let lua = Lua::new();
        let scheduler = Scheduler::new(2);
        for _ in 0..3 {
            scheduler.set_timer(2.0, false, counter_fn(&lua, "t")).unwrap();
        }
        let later = Instant::now() + Duration::from_millis(10);
        assert_eq!(scheduler.sweep_timers(later), 2);
        assert_eq!(scheduler.pending_timers(), 1);
        assert_eq!(scheduler.sweep_timers(later), 0);
        drain(&scheduler);
        assert_eq!(scheduler.sweep_timers(later), 1);
    }

    #[test]
    fn test_shutdown_drops_everything() {
        let lua = Lua::new();
        let scheduler = Scheduler::new(8);
        scheduler.next_frame(counter_fn(&lua, "x"), false).unwrap();
        scheduler.set_timer(100.0, true, counter_fn(&lua, "y")).unwrap();
        assert_eq!(scheduler.shutdown(), (1, 1));
        assert!(scheduler.take_queued().is_empty());
        assert_eq!(
            scheduler.next_frame(counter_fn(&lua, "x"), false),
            Err(QueueError::Canceled)
        );
    }
}
