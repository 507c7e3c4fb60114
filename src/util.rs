use parking_lot::{Condvar, Mutex};

/// Runs the supplied function when dropped, including when the
/// owning scope unwinds due to a panic.
pub struct Deferred<F: FnOnce()> {
    f: Option<F>,
}

impl<F: FnOnce()> Deferred<F> {
    pub fn new(f: F) -> Self {
        Self { f: Some(f) }
    }
}

impl<F: FnOnce()> Drop for Deferred<F> {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}

/// A one-shot rendezvous. Any number of threads may `wait` until
/// some thread calls `open`, after which `wait` returns immediately.
pub(crate) struct Latch {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub(crate) fn new() -> Self {
        Self {
            open: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn open(&self) {
        let mut open = self.open.lock();
        *open = true;
        self.cond.notify_all();
    }

    pub(crate) fn wait(&self) {
        let mut open = self.open.lock();

        while !*open {
            self.cond.wait(&mut open);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        *self.open.lock()
    }
}
