//! Bounded blocking queues and background task tracking.
//!
//! [`PacketQueue`] carries outbound frames to the write loop and application
//! events out of the read loop. [`TaskTracker`] lets `stop` wait for both
//! loops to exit.

mod tracker;

pub use tracker::TaskTracker;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::{RecvTimeoutError, SendError, TryRecvError, TrySendError};

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Bounded FIFO with blocking, non-blocking and timed operations and an
/// explicit closed state.
///
/// Closing fails every later send immediately and wakes all waiters.
/// Receivers keep getting queued items until the queue is drained, and only
/// then see `Closed`.
#[derive(Debug)]
pub struct PacketQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    /// Notified with `notify_all`: batch senders wait for more than one slot.
    not_full: Condvar,
    capacity: usize,
}

impl<T> PacketQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue `item`, waiting while the queue is full.
    pub fn send(&self, item: T) -> Result<(), SendError<T>> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(SendError(item));
            }
            if state.items.len() < self.capacity {
                break;
            }
            self.not_full.wait(&mut state);
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Enqueue `item` without waiting.
    pub fn try_send(&self, item: T) -> Result<(), TrySendError<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TrySendError::Closed(item));
        }
        if state.items.len() >= self.capacity {
            return Err(TrySendError::Full(item));
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Enqueue every item of `items` back to back, or none of them.
    ///
    /// Fails with `Full` unless the queue has room for all of them. No other
    /// producer can slip an item in between.
    pub fn try_send_all<I>(&self, items: I) -> Result<(), TrySendError<I>>
    where
        I: ExactSizeIterator<Item = T>,
    {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TrySendError::Closed(items));
        }
        if self.capacity - state.items.len() < items.len() {
            return Err(TrySendError::Full(items));
        }
        state.items.extend(items);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Enqueue every item of `items` back to back, waiting for room.
    ///
    /// Waits until all of them fit and pushes them under one lock. A batch
    /// larger than the capacity is sent item by item instead and may be
    /// interleaved with other producers. On close, the error holds the items
    /// not yet queued.
    pub fn send_all<I>(&self, mut items: I) -> Result<(), SendError<I>>
    where
        I: ExactSizeIterator<Item = T>,
    {
        let needed = items.len();
        if needed > self.capacity {
            while items.len() > 0 {
                let mut state = self.state.lock();
                loop {
                    if state.closed {
                        return Err(SendError(items));
                    }
                    if state.items.len() < self.capacity {
                        break;
                    }
                    self.not_full.wait(&mut state);
                }
                let room = self.capacity - state.items.len();
                state.items.extend(items.by_ref().take(room));
                drop(state);
                self.not_empty.notify_one();
            }
            return Ok(());
        }

        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(SendError(items));
            }
            if self.capacity - state.items.len() >= needed {
                break;
            }
            self.not_full.wait(&mut state);
        }
        state.items.extend(items);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue, waiting for an item. `None` once closed and drained.
    pub fn recv(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_all();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Dequeue without waiting.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut state = self.state.lock();
        match state.items.pop_front() {
            Some(item) => {
                drop(state);
                self.not_full.notify_all();
                Ok(item)
            }
            None if state.closed => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Dequeue, waiting at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_all();
                return Ok(item);
            }
            if state.closed {
                return Err(RecvTimeoutError::Closed);
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                return match state.items.pop_front() {
                    Some(item) => {
                        drop(state);
                        self.not_full.notify_all();
                        Ok(item)
                    }
                    None if state.closed => Err(RecvTimeoutError::Closed),
                    None => Err(RecvTimeoutError::Timeout),
                };
            }
        }
    }

    /// Close the queue and wake every waiter. Returns `false` if it was
    /// already closed.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        let was_open = !state.closed;
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        was_open
    }

    /// Check if the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
