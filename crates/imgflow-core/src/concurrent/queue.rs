//! Bounded blocking FIFO shared between producers and consumers.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Thread-safe FIFO with a capacity limit.
///
/// `put` blocks while the queue holds `limit` or more items; `get` blocks
/// while it is empty. A single condition variable serves both directions and
/// every occupancy change wakes all waiters, so a waiter can never miss the
/// transition it is waiting for.
///
/// [`close`](Self::close) makes [`put_open`](Self::put_open) refuse new items,
/// including callers already blocked on a full queue. Plain `put` and the
/// `get` family ignore the flag.
pub struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    cond: Condvar,
}

struct QueueState<T> {
    items: VecDeque<T>,
    limit: usize,
    closed: bool,
}

impl<T> QueueState<T> {
    fn is_full(&self) -> bool {
        self.items.len() >= self.limit
    }
}

impl<T> BoundedQueue<T> {
    /// Create a queue that holds at most `limit` items.
    pub fn new(limit: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                limit,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    // No user code runs under this lock, so a poisoned guard still holds a
    // consistent deque.
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the capacity.
    ///
    /// Items already queued above a lowered limit stay; only later `put`
    /// calls see the new bound. Blocked putters are woken to re-check.
    pub fn set_limit(&self, limit: usize) {
        self.lock().limit = limit;
        self.cond.notify_all();
    }

    pub fn limit(&self) -> usize {
        self.lock().limit
    }

    /// Append an item, blocking until there is room.
    pub fn put(&self, item: T) {
        let guard = self.lock();
        let mut guard = self
            .cond
            .wait_while(guard, |s| s.is_full())
            .unwrap_or_else(PoisonError::into_inner);
        guard.items.push_back(item);
        drop(guard);
        self.cond.notify_all();
    }

    /// Append an item unless the queue is closed, blocking until there is room.
    ///
    /// Hands the item back if the queue is closed before or while waiting.
    pub fn put_open(&self, item: T) -> Result<(), T> {
        let guard = self.lock();
        let mut guard = self
            .cond
            .wait_while(guard, |s| s.is_full() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        if guard.closed {
            return Err(item);
        }
        guard.items.push_back(item);
        drop(guard);
        self.cond.notify_all();
        Ok(())
    }

    /// Refuse further `put_open` calls and wake any that are blocked.
    pub fn close(&self) {
        self.lock().closed = true;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Remove the front item, blocking until one is available.
    pub fn get(&self) -> T {
        let mut guard = self.lock();
        loop {
            if let Some(item) = guard.items.pop_front() {
                drop(guard);
                self.cond.notify_all();
                return item;
            }
            guard = self
                .cond
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Remove the front item, waiting at most `timeout`.
    ///
    /// Returns `None` if the queue stayed empty for the whole interval.
    pub fn get_timeout(&self, timeout: Duration) -> Option<T> {
        let guard = self.lock();
        let (mut guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |s| s.items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        let item = guard.items.pop_front();
        drop(guard);
        if item.is_some() {
            self.cond.notify_all();
        }
        item
    }

    /// Remove the front item without waiting.
    pub fn try_get(&self) -> Option<T> {
        let item = self.lock().items.pop_front();
        if item.is_some() {
            self.cond.notify_all();
        }
        item
    }

    /// Remove every queued item at once.
    pub fn drain(&self) -> Vec<T> {
        let items: Vec<T> = self.lock().items.drain(..).collect();
        if !items.is_empty() {
            self.cond.notify_all();
        }
        items
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.lock().is_full()
    }
}
