use super::{Dispatch, Thunk, WorkQueue};
use crate::cfg::DispatchConfig;
use crate::error::{Error, Result};
use crate::queue::{DeadlineHeap, WorkItem};
use crossbeam::channel::{self, Receiver};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Delays are capped so that `now + delay` cannot overflow `Instant`.
const MAX_DELAY: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

struct Shared {
    work: WorkQueue,
    timers: Mutex<DeadlineHeap<WorkItem>>,
    timer_cond: Condvar,
    quit: AtomicBool,
}

impl Shared {
    fn work_loop(&self) {
        debug!("work thread running");

        self.work.drain_until(|| self.quit.load(Ordering::Acquire));

        debug!("work thread exiting");
    }

    /// Waits for the earliest deadline and moves due items onto the
    /// work queue. Inserting a nearer deadline, or shutting down,
    /// interrupts the wait.
    fn timer_loop(&self) {
        debug!("timer thread running");

        let mut timers = self.timers.lock();

        while !self.quit.load(Ordering::Acquire) {
            match timers.peek_deadline() {
                None => {
                    self.timer_cond.wait(&mut timers);
                }

                Some(deadline) if deadline > Instant::now() => {
                    let _ = self.timer_cond.wait_until(&mut timers, deadline);
                }

                Some(_) => {
                    let now = Instant::now();
                    let mut due = Vec::new();

                    while let Some((_, item)) = timers.pop_due(now) {
                        due.push(item);
                    }

                    trace!("migrating {} due items", due.len());

                    // lock order is always timers, then work
                    self.work.push_all(due);
                }
            }
        }

        debug!("timer thread exiting");
    }
}

/// A dispatch engine that owns two threads: a work thread that executes
/// queued items in FIFO order, and a timer thread that holds deferred
/// items until their deadline and then moves them onto the work queue.
///
/// Construction returns only once both threads have signaled that they
/// are running.
///
/// When dropped, everything queued before the drop is executed, and then
/// both threads are joined. Deferred items whose deadline has not yet
/// passed are dropped without running.
///
/// # Example
///
/// ```
/// use cadence::dispatcher::WorkerDispatchEngine;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let engine = WorkerDispatchEngine::new().unwrap();
/// let counter = Arc::new(AtomicUsize::new(0));
///
/// for _ in 0..10 {
///     let counter = counter.clone();
///     engine.submit_async(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///     });
/// }
///
/// engine.flush();
///
/// assert_eq!(counter.load(Ordering::SeqCst), 10);
/// ```
pub struct WorkerDispatchEngine {
    shared: Arc<Shared>,
    work_thread: Option<JoinHandle<()>>,
    timer_thread: Option<JoinHandle<()>>,
}

impl WorkerDispatchEngine {
    pub fn new() -> Result<Self> {
        Self::with_config(&DispatchConfig::default())
    }

    pub fn with_config(config: &DispatchConfig) -> Result<Self> {
        if config.log_config_on_start {
            info!("configuration: {:?}", config);
        }

        let shared = Arc::new(Shared {
            work: WorkQueue::new(),
            timers: Mutex::new(DeadlineHeap::new()),
            timer_cond: Condvar::new(),
            quit: AtomicBool::new(false),
        });

        // if anything below fails, dropping the partially built engine
        // shuts down whichever thread did start
        let mut engine = Self {
            shared: shared.clone(),
            work_thread: None,
            timer_thread: None,
        };

        let (work_thread, work_started) = {
            let shared = shared.clone();
            spawn_signaled(&config.work_thread_name, move || shared.work_loop())?
        };

        engine.work_thread = Some(work_thread);

        let (timer_thread, timer_started) =
            spawn_signaled(&config.timer_thread_name, move || shared.timer_loop())?;

        engine.timer_thread = Some(timer_thread);

        await_started(&config.work_thread_name, &work_started)?;
        await_started(&config.timer_thread_name, &timer_started)?;

        debug!(
            "engine started with {} and {} threads",
            config.work_thread_name, config.timer_thread_name
        );

        Ok(engine)
    }

    /// Queue a closure for execution and return immediately.
    pub fn submit_async<F: FnOnce()>(&self, f: F)
    where
        F: 'static + Send,
    {
        self.shared.work.push(WorkItem::new(Box::new(f)));
    }

    /// Queue a closure and block until it has executed.
    ///
    /// Must not be called from a closure running on this engine.
    pub fn submit_sync<F: FnOnce()>(&self, f: F)
    where
        F: 'static + Send,
    {
        self.shared.work.push_sync(Box::new(f));
    }

    /// Queue a closure to be executed once `delay` has elapsed.
    ///
    /// The closure is not executed before the delay has passed, but may be
    /// executed later, as it is placed behind whatever work is already
    /// queued when it becomes due.
    pub fn submit_after<F: FnOnce()>(&self, delay: Duration, f: F)
    where
        F: 'static + Send,
    {
        let deadline = Instant::now() + delay.min(MAX_DELAY);

        let mut timers = self.shared.timers.lock();

        let nearest = timers.peek_deadline().map_or(true, |d| deadline < d);

        timers.push(deadline, WorkItem::deferred(Box::new(f), deadline));

        if nearest {
            self.shared.timer_cond.notify_one();
        }
    }

    /// Block until everything submitted so far has executed.
    ///
    /// Deferred items that are not yet due are not waited for.
    pub fn flush(&self) {
        self.shared.work.push_sync(Box::new(|| ()));
    }

    /// The number of deferred items that are not yet due. This may be
    /// stale as soon as it is returned.
    pub fn pending_timers(&self) -> usize {
        self.shared.timers.lock().len()
    }

    /// The number of items waiting on the work queue, not counting an
    /// item that is currently executing.
    pub fn queued(&self) -> usize {
        self.shared.work.len()
    }
}

impl Dispatch for WorkerDispatchEngine {
    fn submit_async(&self, thunk: Thunk) {
        self.shared.work.push(WorkItem::new(thunk));
    }

    fn submit_sync(&self, thunk: Thunk) {
        self.shared.work.push_sync(thunk);
    }
}

impl Drop for WorkerDispatchEngine {
    fn drop(&mut self) {
        {
            let shared = self.shared.clone();

            self.shared.work.push(WorkItem::new(Box::new(move || {
                shared.quit.store(true, Ordering::Release);
            })));
        }

        if let Some(handle) = self.work_thread.take() {
            if handle.join().is_err() {
                error!("work thread panicked");
            }
        }

        // the work thread normally raised this already, but not if it
        // never started
        self.shared.quit.store(true, Ordering::Release);

        {
            let _timers = self.shared.timers.lock();
            self.shared.timer_cond.notify_all();
        }

        if let Some(handle) = self.timer_thread.take() {
            if handle.join().is_err() {
                error!("timer thread panicked");
            }
        }

        let pending: Vec<_> = self
            .shared
            .timers
            .lock()
            .drain()
            .map(|(_, item)| item)
            .collect();

        if !pending.is_empty() {
            debug!("dropping {} deferred items that never became due", pending.len());
        }

        // dropped here, after the lock was released
        drop(pending);

        self.shared.work.discard();

        debug!("engine stopped");
    }
}

/// Spawn a named thread that signals once it is running, before calling
/// `f`. The returned receiver yields that signal.
fn spawn_signaled<F: FnOnce()>(name: &str, f: F) -> Result<(JoinHandle<()>, Receiver<()>)>
where
    F: 'static + Send,
{
    let (started, receiver) = channel::bounded(1);

    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _ = started.send(());
            drop(started);

            f();
        })
        .map_err(|source| Error::Spawn {
            name: name.to_string(),
            source,
        })?;

    Ok((handle, receiver))
}

fn await_started(name: &str, receiver: &Receiver<()>) -> Result<()> {
    receiver.recv().map_err(|_| Error::Startup {
        name: name.to_string(),
    })
}
