use std::cmp::Ordering;
use std::time::Instant;

struct Entry<T> {
    deadline: Instant,
    seq: u64,
    item: T,
}

impl<T> Entry<T> {
    #[inline(always)]
    fn key(&self) -> (Instant, u64) {
        (self.deadline, self.seq)
    }
}

/// A binary min-heap of items keyed by deadline.
///
/// Ties between equal deadlines are broken by insertion order, so items
/// that become due together are popped in the order they were pushed.
///
/// In addition to `pop`, arbitrary items can be removed with `remove_where`.
/// Removal scans for the item (O(n)) and then repairs the heap around the
/// vacated slot (O(log n)).
pub struct DeadlineHeap<T> {
    entries: Vec<Entry<T>>,
    next_seq: u64,
}

impl<T> DeadlineHeap<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, deadline: Instant, item: T) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        self.entries.push(Entry {
            deadline,
            seq,
            item,
        });

        let last = self.entries.len() - 1;
        self.sift_up(last);
    }

    pub fn peek_deadline(&self) -> Option<Instant> {
        self.entries.first().map(|e| e.deadline)
    }

    /// Remove and return the item with the earliest deadline.
    pub fn pop(&mut self) -> Option<(Instant, T)> {
        if self.entries.is_empty() {
            return None;
        }

        let entry = self.entries.swap_remove(0);

        if !self.entries.is_empty() {
            self.sift_down(0);
        }

        Some((entry.deadline, entry.item))
    }

    /// Remove and return the item with the earliest deadline if that
    /// deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<(Instant, T)> {
        match self.peek_deadline() {
            Some(deadline) if deadline <= now => self.pop(),
            _ => None,
        }
    }

    /// Remove the first item (in heap layout order) that matches the
    /// predicate.
    pub fn remove_where<F: FnMut(&T) -> bool>(&mut self, mut f: F) -> Option<(Instant, T)> {
        let index = self.entries.iter().position(|e| f(&e.item))?;

        let entry = self.entries.swap_remove(index);

        if index < self.entries.len() {
            // the element moved into the hole may belong above or below it
            self.sift_down(index);
            self.sift_up(index);
        }

        Some((entry.deadline, entry.item))
    }

    /// Remove every item, in no particular order.
    pub fn drain(&mut self) -> impl Iterator<Item = (Instant, T)> + '_ {
        self.entries.drain(..).map(|e| (e.deadline, e.item))
    }

    fn less(&self, a: usize, b: usize) -> bool {
        self.entries[a].key().cmp(&self.entries[b].key()) == Ordering::Less
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;

            if self.less(index, parent) {
                self.entries.swap(index, parent);
                index = parent;
            } else {
                return;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.entries.len();

        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;

            if left < len && self.less(left, smallest) {
                smallest = left;
            }

            if right < len && self.less(right, smallest) {
                smallest = right;
            }

            if smallest == index {
                return;
            }

            self.entries.swap(index, smallest);
            index = smallest;
        }
    }
}

impl<T> Default for DeadlineHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}
