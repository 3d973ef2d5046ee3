//! Bounded drop-oldest FIFO between the producer and the delivery worker.
//!
//! Uses `Mutex + Condvar` from std. The same condition variable wakes the
//! worker for new samples, for `finish`/`close`, and cuts its timed waits
//! short on `close`.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    /// No more input; remaining items are still handed out
    Draining,
    /// Stopped; remaining items are abandoned
    Closed,
}

struct Inner<T> {
    items: VecDeque<T>,
    state: State,
    evicted: u64,
}

/// Result of [`Backlog::submit`]
#[derive(Debug, PartialEq, Eq)]
pub enum Submit<T> {
    Queued,
    /// Queued after evicting this oldest entry
    Evicted(T),
    /// Backlog no longer accepts input; the item is handed back
    Refused(T),
}

/// Thread-safe bounded queue with drop-oldest overflow.
///
/// Invariant: `len() <= capacity()` at all times.
pub struct Backlog<T> {
    inner: Mutex<Inner<T>>,
    cond: Condvar,
    capacity: usize,
}

impl<T> Backlog<T> {
    /// Create a backlog holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                state: State::Open,
                evicted: 0,
            }),
            cond: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Effectively unbounded backlog
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append without blocking. At capacity the oldest entry is evicted first.
    pub fn submit(&self, item: T) -> Submit<T> {
        let mut inner = self.lock();
        if inner.state != State::Open {
            return Submit::Refused(item);
        }
        let evicted = if inner.items.len() >= self.capacity {
            inner.evicted += 1;
            inner.items.pop_front()
        } else {
            None
        };
        inner.items.push_back(item);
        drop(inner);
        self.cond.notify_all();
        evicted.map_or(Submit::Queued, Submit::Evicted)
    }

    /// Block until an item is available and return it in FIFO order.
    ///
    /// Returns `None` once the backlog is closed, or finished and empty.
    pub fn take(&self) -> Option<T> {
        let mut inner = self.lock();
        loop {
            match inner.state {
                State::Closed => return None,
                State::Draining if inner.items.is_empty() => return None,
                _ => {}
            }
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            inner = self.cond.wait(inner).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wait for `duration` unless the backlog is closed first.
    ///
    /// Returns `true` if the full duration elapsed, `false` on close.
    pub fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        let mut inner = self.lock();
        loop {
            if inner.state == State::Closed {
                return false;
            }
            let Some(deadline) = deadline else {
                inner = self.cond.wait(inner).unwrap_or_else(PoisonError::into_inner);
                continue;
            };
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            inner = self
                .cond
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Stop accepting input; `take` drains what is left, then returns `None`.
    pub fn finish(&self) {
        let mut inner = self.lock();
        if inner.state == State::Open {
            inner.state = State::Draining;
        }
        drop(inner);
        self.cond.notify_all();
    }

    /// Stop immediately: waiters wake up, pending items are dropped.
    ///
    /// Returns how many pending items were abandoned.
    pub fn close(&self) -> usize {
        let mut inner = self.lock();
        inner.state = State::Closed;
        let dropped = inner.items.len();
        inner.items.clear();
        drop(inner);
        self.cond.notify_all();
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.lock().state == State::Closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total entries evicted by overflow since creation
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }
}
