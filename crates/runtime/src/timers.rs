//! Timer table.
//!
//! Timers never call script code. When an entry is due the tick driver takes
//! its token and pushes it onto the execution queue, so every script call
//! still goes through the single engine-access path.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use mlua::Function;

use crate::token::CallbackToken;

/// Opaque timer handle handed to scripts. Never reused.
pub type TimerId = u64;

/// Requests at or below this delay skip the table and run next tick.
pub const IMMEDIATE_DELAY_MS: f64 = 1.0;

/// Longer delays are clamped (about 24.8 days).
pub const MAX_DELAY_MS: f64 = i32::MAX as f64;

/// Outcome of `TimerService::set`.
#[derive(Debug)]
pub enum Scheduled {
    /// Delay was at most `IMMEDIATE_DELAY_MS`; the caller must push the token
    /// straight onto the execution queue.
    Immediate(TimerId, CallbackToken),
    /// Entry stored in the table.
    Pending(TimerId),
}

struct TimerEntry {
    delay: Duration,
    token: CallbackToken,
    due: Instant,
}

/// Maps timer ids to delay/repeat/callback entries.
pub struct TimerService {
    entries: BTreeMap<TimerId, TimerEntry>,
    next_id: TimerId,
}

impl TimerService {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register a callback to fire after `delay_ms`.
    pub fn set(&mut self, delay_ms: f64, repeat: bool, callback: Function, now: Instant) -> Scheduled {
        let id = self.next_id;
        self.next_id += 1;

        if delay_ms.is_nan() || delay_ms <= IMMEDIATE_DELAY_MS {
            return Scheduled::Immediate(id, CallbackToken::new(callback));
        }

        let delay = Duration::from_micros((delay_ms.min(MAX_DELAY_MS) * 1000.0).round() as u64);
        let token = if repeat {
            CallbackToken::repeating(callback)
        } else {
            CallbackToken::new(callback)
        };
        self.entries.insert(id, TimerEntry { delay, token, due: now + delay });
        Scheduled::Pending(id)
    }

    /// Remove a pending entry. Unknown or already-fired ids are ignored.
    pub fn clear(&mut self, id: TimerId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Take tokens for up to `limit` due entries, earliest first.
    ///
    /// Repeating entries are rescheduled for `now + delay`; the rest are removed.
    pub fn take_due(&mut self, now: Instant, limit: usize) -> Vec<CallbackToken> {
        let mut due: Vec<(Instant, TimerId)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.due <= now)
            .map(|(id, e)| (e.due, *id))
            .collect();
        due.sort();
        due.truncate(limit);

        let mut fired = Vec::with_capacity(due.len());
        for (_, id) in due {
            let repeat = match self.entries.get(&id) {
                Some(entry) => entry.token.is_repeat(),
                None => continue,
            };
            if repeat {
                if let Some(entry) = self.entries.get_mut(&id) {
                    entry.due = now + entry.delay;
                    fired.push(entry.token.fire_copy());
                }
            } else if let Some(entry) = self.entries.remove(&id) {
                fired.push(entry.token);
            }
        }
        fired
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry (teardown). Returns how many were pending.
    pub fn clear_all(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}
