use super::{Dispatch, Thunk, WorkQueue};
use crate::queue::WorkItem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A dispatch engine that owns no threads.
///
/// Work submitted from any thread is queued, and executed only while some
/// thread is inside `run`. This allows the engine to be embedded in a
/// thread whose lifecycle is owned by something else, e.g. a UI event
/// loop or the process's main thread.
///
/// `stop` queues a sentinel, so everything submitted before it is executed
/// before `run` returns. Work submitted after it stays queued until the
/// next call to `run`.
pub struct DrivenDispatchEngine {
    work: WorkQueue,
    stopped: Arc<AtomicBool>,
}

impl DrivenDispatchEngine {
    pub fn new() -> Self {
        Self {
            work: WorkQueue::new(),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue a closure for execution and return immediately.
    pub fn submit_async<F: FnOnce()>(&self, f: F)
    where
        F: 'static + Send,
    {
        self.work.push(WorkItem::new(Box::new(f)));
    }

    /// Queue a closure and block until the driving thread has executed it.
    ///
    /// Must not be called from the thread that calls `run`.
    pub fn submit_sync<F: FnOnce()>(&self, f: F)
    where
        F: 'static + Send,
    {
        self.work.push_sync(Box::new(f));
    }

    /// Execute queued work on the calling thread, blocking whenever the
    /// queue is empty, until a stop requested with `stop` is reached.
    pub fn run(&self) {
        trace!("driven engine running");

        self.work
            .drain_until(|| self.stopped.swap(false, Ordering::AcqRel));

        trace!("driven engine stopped");
    }

    /// Request that `run` returns once everything submitted so far has been
    /// executed. This does not block, and may be called from any thread,
    /// including from a closure executing on this engine.
    pub fn stop(&self) {
        let stopped = self.stopped.clone();

        self.work.push(WorkItem::new(Box::new(move || {
            stopped.store(true, Ordering::Release);
        })));
    }

    /// The number of items waiting to be executed.
    pub fn queued(&self) -> usize {
        self.work.len()
    }
}

impl Default for DrivenDispatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatch for DrivenDispatchEngine {
    fn submit_async(&self, thunk: Thunk) {
        self.work.push(WorkItem::new(thunk));
    }

    fn submit_sync(&self, thunk: Thunk) {
        self.work.push_sync(thunk);
    }
}

impl Drop for DrivenDispatchEngine {
    fn drop(&mut self) {
        self.work.discard();
    }
}
