//! Helpers for testing code that runs on engine and scheduler threads

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Repeatedly evaluate the provided function upto
/// a specified limit, sleeping for 10ms between
/// executions.
///
/// If the function doesn't return true within the
/// limit, this panics and thus fails the test.
///
/// This is useful for testing asynchronous behavior
/// from different threads in a polling fashion.
pub fn eventually<F: FnMut() -> bool>(limit: Duration, mut f: F) {
    let start = Instant::now();

    while !f() {
        if start.elapsed() > limit {
            panic!("provided function hasn't returned true within {:?}", limit);
        }

        thread::sleep(Duration::from_millis(10));
    }
}

/// A cloneable, thread-safe log of values.
///
/// Clones share the same log, so a clone can be moved into a task
/// and the test can later inspect what was recorded and in which order.
pub struct Recorder<T> {
    entries: Arc<Mutex<Vec<T>>>,
}

impl<T> Recorder<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn record(&self, value: T) {
        self.entries.lock().push(value);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<T: Clone> Recorder<T> {
    /// A snapshot of everything recorded so far.
    pub fn entries(&self) -> Vec<T> {
        self.entries.lock().clone()
    }
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self::new()
    }
}
