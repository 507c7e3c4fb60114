//! Work items and the structures that hold them until they run

mod deadline_heap;
mod fifo;

pub use self::deadline_heap::DeadlineHeap;
pub(crate) use self::fifo::FifoWorkQueue;

use crate::dispatcher::Thunk;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

/// Where a `WorkItem` came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Submitted directly with `submit_async` or `submit_sync`.
    Plain,

    /// Submitted with `submit_after` and migrated once its deadline passed.
    Timer,
}

/// A unit of work: the thunk, its deadline if it was deferred, and its
/// origin. Running it consumes it, so it executes at most once.
pub(crate) struct WorkItem {
    thunk: Thunk,
    deadline: Option<Instant>,
    origin: Origin,
}

impl WorkItem {
    pub(crate) fn new(thunk: Thunk) -> Self {
        Self {
            thunk,
            deadline: None,
            origin: Origin::Plain,
        }
    }

    pub(crate) fn deferred(thunk: Thunk, deadline: Instant) -> Self {
        Self {
            thunk,
            deadline: Some(deadline),
            origin: Origin::Timer,
        }
    }

    pub(crate) fn origin(&self) -> Origin {
        self.origin
    }

    #[cfg(test)]
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Execute the thunk. A panic is contained here and logged so the
    /// calling loop can continue with the next item.
    ///
    /// Returns `false` if the thunk panicked.
    pub(crate) fn run(self) -> bool {
        if let Some(deadline) = self.deadline {
            trace!("deferred item running {:?} after its deadline", deadline.elapsed());
        }

        let thunk = self.thunk;

        match catch_unwind(AssertUnwindSafe(thunk)) {
            Ok(()) => true,

            Err(payload) => {
                error!(
                    "{:?} task panicked: {}",
                    self.origin,
                    panic_message(payload.as_ref())
                );

                false
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
