//! Dispatch engines execute submitted closures in submission order

mod driven;
mod worker;

pub use self::driven::DrivenDispatchEngine;
pub use self::worker::WorkerDispatchEngine;

use crate::queue::{FifoWorkQueue, WorkItem};
use crate::util::Latch;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// A boxed closure that is executed at most once.
pub type Thunk = Box<dyn FnOnce() + Send + 'static>;

/// A `Dispatch` is a service that executes closures in the order they are
/// submitted.
///
/// Two engines implement it:
///
/// * `WorkerDispatchEngine` owns a work thread and a timer thread and
///   executes everything itself.
/// * `DrivenDispatchEngine` owns no threads; work is executed only while
///   some caller is inside its `run` method.
///
/// Both engines also provide generic inherent versions of these methods
/// that box the closure for you. The trait exists so that code can submit
/// work without knowing which engine is behind a `&dyn Dispatch`.
///
/// A panic in a submitted closure is contained and logged, and the engine
/// continues with the next closure.
pub trait Dispatch {
    /// Queue a thunk for execution and return immediately.
    fn submit_async(&self, thunk: Thunk);

    /// Queue a thunk and block until it has executed.
    ///
    /// This must not be called from the thread that executes this
    /// engine's work, as it would wait for itself forever.
    fn submit_sync(&self, thunk: Thunk);
}

/// The FIFO and the condition variable that signals it became non-empty.
/// Both engines are built on this.
pub(crate) struct WorkQueue {
    queue: Mutex<FifoWorkQueue>,
    cond: Condvar,
}

impl WorkQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(FifoWorkQueue::new()),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn push(&self, item: WorkItem) {
        let mut queue = self.queue.lock();
        queue.push(item);
        self.cond.notify_one();
    }

    /// Append several items under a single acquisition of the lock,
    /// preserving their order.
    pub(crate) fn push_all(&self, items: Vec<WorkItem>) {
        if items.is_empty() {
            return;
        }

        let mut queue = self.queue.lock();

        for item in items {
            queue.push(item);
        }

        self.cond.notify_one();
    }

    /// Enqueue `thunk` followed by a completion signal, atomically, and
    /// block until the signal has executed.
    pub(crate) fn push_sync(&self, thunk: Thunk) {
        let latch = Arc::new(Latch::new());

        {
            let latch = latch.clone();
            let mut queue = self.queue.lock();
            queue.push(WorkItem::new(thunk));
            queue.push(WorkItem::new(Box::new(move || latch.open())));
            self.cond.notify_one();
        }

        latch.wait();
    }

    /// Execute items until `done` returns true after an item ran. Blocks
    /// while the queue is empty. The lock is released while each item
    /// executes.
    pub(crate) fn drain_until<F: FnMut() -> bool>(&self, mut done: F) {
        let mut queue = self.queue.lock();

        loop {
            while let Some(item) = queue.pop() {
                parking_lot::MutexGuard::unlocked(&mut queue, || {
                    item.run();
                });

                if done() {
                    return;
                }
            }

            self.cond.wait(&mut queue);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Drop every queued item without running it, returning how many
    /// there were.
    pub(crate) fn discard(&self) -> usize {
        let (items, discarded) = self.queue.lock().take_all();

        if discarded.total() > 0 {
            debug!(
                "discarding {} plain and {} timer items without running them",
                discarded.plain, discarded.timer
            );
        }

        // dropped here, after the lock was released
        drop(items);

        discarded.total()
    }
}
