use super::{Origin, WorkItem};
use std::collections::VecDeque;

/// Items are appended at the tail and executed from the head, so execution
/// order equals insertion order.
///
/// Deferred items migrated by a timer thread are appended like any other
/// item: a migrated item therefore runs after everything that was queued
/// before it, but may run before plain items submitted afterwards.
#[derive(Default)]
pub(crate) struct FifoWorkQueue {
    items: VecDeque<WorkItem>,
}

/// Counts of items that were dropped without running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Discarded {
    pub(crate) plain: usize,
    pub(crate) timer: usize,
}

impl Discarded {
    pub(crate) fn total(&self) -> usize {
        self.plain + self.timer
    }
}

impl FifoWorkQueue {
    pub(crate) fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub(crate) fn push(&mut self, item: WorkItem) {
        self.items.push_back(item);
    }

    pub(crate) fn pop(&mut self) -> Option<WorkItem> {
        self.items.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove every queued item, tallying them by origin. The items are
    /// returned so they can be dropped after the caller releases its lock.
    pub(crate) fn take_all(&mut self) -> (VecDeque<WorkItem>, Discarded) {
        let items = std::mem::take(&mut self.items);

        let mut discarded = Discarded::default();

        for item in items.iter() {
            match item.origin() {
                Origin::Plain => discarded.plain += 1,
                Origin::Timer => discarded.timer += 1,
            }
        }

        (items, discarded)
    }
}
