//! Background task tracking.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Counter {
    active: Mutex<usize>,
    idle: Condvar,
}

/// Decrements the counter when the task body returns or unwinds.
struct Guard(Arc<Counter>);

impl Drop for Guard {
    fn drop(&mut self) {
        let mut active = self.0.active.lock();
        *active = active.saturating_sub(1);
        if *active == 0 {
            self.0.idle.notify_all();
        }
    }
}

/// Counts running background threads and waits for them to finish.
#[derive(Debug, Default)]
pub struct TaskTracker {
    counter: Arc<Counter>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskTracker {
    /// Create a tracker with nothing running.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `f` on a named thread and track it.
    pub fn spawn<F>(&self, name: &str, f: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        *self.counter.active.lock() += 1;
        let guard = Guard(Arc::clone(&self.counter));

        let handle = thread::Builder::new().name(name.to_owned()).spawn(move || {
            let _guard = guard;
            f();
        });
        // On failure the closure, and with it the guard, has been dropped.
        let handle = handle?;

        debug!(task = name, "spawned");
        self.handles.lock().push(handle);
        Ok(())
    }

    /// Number of tracked threads still running.
    pub fn active(&self) -> usize {
        *self.counter.active.lock()
    }

    /// Block until every tracked thread has exited, then join them.
    pub fn wait(&self) {
        {
            let mut active = self.counter.active.lock();
            while *active > 0 {
                self.counter.idle.wait(&mut active);
            }
        }
        self.join_finished();
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`. Returns `true`
    /// if everything exited.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        {
            let mut active = self.counter.active.lock();
            while *active > 0 {
                if self.counter.idle.wait_until(&mut active, deadline).timed_out() {
                    return *active == 0;
                }
            }
        }
        self.join_finished();
        true
    }

    fn join_finished(&self) {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let name = handle.thread().name().unwrap_or("<unnamed>").to_owned();
            if handle.join().is_err() {
                warn!(task = %name, "task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_wait_for_tasks() {
        let tracker = TaskTracker::new();
        let done = Arc::new(AtomicUsize::new(0));

        for i in 0..2 {
            let done = Arc::clone(&done);
            tracker
                .spawn(&format!("task-{i}"), move || {
                    thread::sleep(Duration::from_millis(20));
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        tracker.wait();
        assert_eq!(tracker.active(), 0);
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wait_timeout() {
        let tracker = TaskTracker::new();
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        tracker
            .spawn("blocked", move || {
                let _ = rx.recv();
            })
            .unwrap();

        assert!(!tracker.wait_timeout(Duration::from_millis(20)));
        assert_eq!(tracker.active(), 1);

        drop(tx);
        assert!(tracker.wait_timeout(Duration::from_secs(1)));
    }

    #[test]
    fn test_panicking_task_is_counted_out() {
        let tracker = TaskTracker::new();
        tracker.spawn("boom", || panic!("boom")).unwrap();
        tracker.wait();
        assert_eq!(tracker.active(), 0);
    }

    #[test]
    fn test_wait_with_nothing_running() {
        let tracker = TaskTracker::new();
        tracker.wait();
        assert!(tracker.wait_timeout(Duration::ZERO));
    }
}
