//! Bounded, cancelable FIFO used for both the execution queue and the event
//! queue.
//!
//! Producers block while the queue is full (back-pressure, nothing is dropped)
//! and consumers block while it is empty. `cancel()` wakes every waiter; from
//! then on pushes fail with `QueueError::Canceled` and pops return `None`.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::error::QueueError;

/// Default capacity for both runtime queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

struct Inner<T> {
    items: VecDeque<T>,
    canceled: bool,
}

/// Thread-safe bounded queue with blocking push/pop and a cancel state.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY)),
                canceled: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Free slots right now.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.inner.lock().items.len())
    }

    /// Append, blocking while the queue is full.
    pub fn push(&self, item: T) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        loop {
            if inner.canceled {
                return Err(QueueError::Canceled);
            }
            if inner.items.len() < self.capacity {
                break;
            }
            self.not_full.wait(&mut inner);
        }
        inner.items.push_back(item);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Append without blocking.
    pub fn try_push(&self, item: T) -> Result<(), QueueError> {
        self.push_nonblocking(item, false)
    }

    /// Insert at the front without blocking.
    pub fn try_push_front(&self, item: T) -> Result<(), QueueError> {
        self.push_nonblocking(item, true)
    }

    fn push_nonblocking(&self, item: T, front: bool) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        if inner.canceled {
            return Err(QueueError::Canceled);
        }
        if inner.items.len() >= self.capacity {
            return Err(QueueError::Full);
        }
        if front {
            inner.items.push_front(item);
        } else {
            inner.items.push_back(item);
        }
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pop the oldest item, blocking while empty. `None` once canceled.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if inner.canceled {
                return None;
            }
            if let Some(item) = inner.items.pop_front() {
                drop(inner);
                self.not_full.notify_one();
                return Some(item);
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Remove everything queued right now, oldest first.
    ///
    /// Items pushed after this returns are left for the next call.
    pub fn take_all(&self) -> Vec<T> {
        let mut inner = self.inner.lock();
        if inner.canceled {
            return Vec::new();
        }
        let items: Vec<T> = inner.items.drain(..).collect();
        drop(inner);
        if !items.is_empty() {
            self.not_full.notify_all();
        }
        items
    }

    /// Cancel the queue, wake all waiters and hand back whatever was pending.
    pub fn cancel(&self) -> Vec<T> {
        let mut inner = self.inner.lock();
        inner.canceled = true;
        let leftovers: Vec<T> = inner.items.drain(..).collect();
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        leftovers
    }
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
