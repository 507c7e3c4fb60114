use crate::error::{Error, Result};
use crate::queue::{panic_message, DeadlineHeap};
use crate::util::Deferred;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Identifies a timer created by a `TimerScheduler`. Ids are never reused
/// by the scheduler that issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerMode {
    /// Fire once, then forget the timer.
    Once,

    /// Fire every period until the timer is deleted.
    Repeating,
}

type Callback = Box<dyn FnMut() + Send + 'static>;

struct TimerRecord {
    /// `None` while the callback is executing.
    callback: Option<Callback>,
    period: Duration,
    deadline: Instant,
    mode: TimerMode,
}

#[derive(Default)]
struct TimerTable {
    heap: DeadlineHeap<TimerId>,
    records: HashMap<TimerId, TimerRecord>,
    next_id: u64,
    stop_requested: bool,
}

impl TimerTable {
    /// Pop the earliest timer and take its callback, if its deadline has
    /// passed. A timer that was deleted after being read as due has no
    /// record any more, and is skipped.
    fn take_due(&mut self, now: Instant) -> Option<(TimerId, Callback)> {
        while let Some((_, id)) = self.heap.pop_due(now) {
            if let Some(callback) = self.records.get_mut(&id).and_then(|r| r.callback.take()) {
                return Some((id, callback));
            }
        }

        None
    }

    /// Called after a fired callback returns. Repeating timers are
    /// rescheduled one period after their previous deadline, so time spent
    /// executing does not accumulate as drift.
    ///
    /// Returns the callback if the timer is finished with it. The caller
    /// drops it once the lock is released, as dropping it runs the `Drop`
    /// of whatever it captured.
    #[must_use]
    fn complete(&mut self, id: TimerId, callback: Callback) -> Option<Callback> {
        let record = match self.records.get_mut(&id) {
            Some(record) => record,

            None => {
                // deleted while its callback was executing
                return Some(callback);
            }
        };

        let mode = record.mode;

        match mode {
            TimerMode::Once => {
                self.records.remove(&id);

                Some(callback)
            }

            TimerMode::Repeating => {
                record.deadline += record.period;
                record.callback = Some(callback);

                let deadline = record.deadline;
                self.heap.push(deadline, id);

                None
            }
        }
    }
}

/// Manages one-shot and repeating timers, whose callbacks are executed
/// by whichever thread calls `run`.
///
/// Timers can be created and deleted from any thread, including from
/// within a timer's own callback, as callbacks execute without any lock
/// held.
///
/// `run` waits for the earliest deadline rather than polling, and is woken
/// early when a nearer timer is created. Callbacks fire no earlier than
/// requested, plus whatever scheduling jitter the OS introduces.
///
/// # Example
///
/// ```
/// use cadence::timer::{TimerMode, TimerScheduler};
/// use std::sync::Arc;
/// use std::thread;
/// use std::time::Duration;
///
/// let scheduler = Arc::new(TimerScheduler::new());
///
/// {
///     let stopper = scheduler.clone();
///     scheduler
///         .create_timer(Duration::from_millis(10), move || stopper.stop(), TimerMode::Once)
///         .unwrap();
/// }
///
/// scheduler.run().unwrap();
/// assert_eq!(scheduler.count(), 0);
/// ```
pub struct TimerScheduler {
    table: Mutex<TimerTable>,
    cond: Condvar,
    running: AtomicBool,
}

impl TimerScheduler {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(TimerTable::default()),
            cond: Condvar::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Create a timer that fires `callback` once `delay` has elapsed, and
    /// then every `delay` if `mode` is `TimerMode::Repeating`.
    ///
    /// Returns `Error::InvalidArgument` if the deadline is not representable,
    /// or if a repeating timer has a zero period.
    pub fn create_timer<F: FnMut()>(
        &self,
        delay: Duration,
        callback: F,
        mode: TimerMode,
    ) -> Result<TimerId>
    where
        F: 'static + Send,
    {
        if mode == TimerMode::Repeating && delay == Duration::from_secs(0) {
            return Err(Error::InvalidArgument("repeating timer requires a non-zero period"));
        }

        let deadline = Instant::now()
            .checked_add(delay)
            .ok_or(Error::InvalidArgument("timer delay overflows the clock"))?;

        let mut table = self.table.lock();

        let id = TimerId(table.next_id);
        table.next_id += 1;

        let nearest = table.heap.peek_deadline().map_or(true, |d| deadline < d);

        table.records.insert(
            id,
            TimerRecord {
                callback: Some(Box::new(callback)),
                period: delay,
                deadline,
                mode,
            },
        );

        table.heap.push(deadline, id);

        if nearest {
            self.cond.notify_all();
        }

        trace!("created {} ({:?}, {:?})", id, mode, delay);

        Ok(id)
    }

    /// Delete a timer so it never fires again. A timer whose callback is
    /// executing at this moment finishes that execution.
    ///
    /// Deleting an unknown id, e.g. a one-shot timer that already fired,
    /// is not an error.
    pub fn delete_timer(&self, id: TimerId) -> Result<()> {
        let removed = {
            let mut table = self.table.lock();
            let removed = table.records.remove(&id);

            if removed.is_some() {
                // not in the heap if its callback is executing right now
                let _ = table.heap.remove_where(|t| *t == id);
            }

            removed
        };

        match removed {
            Some(record) => {
                // dropped here, after the lock was released
                drop(record);
            }

            None => {
                debug!("delete_timer: {} not found", id);
            }
        }

        Ok(())
    }

    /// The number of live timers. This may be stale as soon as it is
    /// returned.
    pub fn count(&self) -> usize {
        self.table.lock().records.len()
    }

    /// Fire timers on the calling thread until `stop` is called.
    ///
    /// Returns `Error::AlreadyRunning` if another thread is currently
    /// running this scheduler.
    pub fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyRunning);
        }

        let _running = Deferred::new(|| self.running.store(false, Ordering::Release));

        debug!("timer scheduler running");

        let mut table = self.table.lock();

        loop {
            if table.stop_requested {
                table.stop_requested = false;
                break;
            }

            let now = Instant::now();

            match table.take_due(now) {
                Some((id, callback)) => {
                    let callback = Self::fire(&mut table, id, callback);

                    if let Some(finished) = table.complete(id, callback) {
                        MutexGuard::unlocked(&mut table, || drop(finished));
                    }
                }

                None => match table.heap.peek_deadline() {
                    Some(deadline) => {
                        let _ = self.cond.wait_until(&mut table, deadline);
                    }

                    None => {
                        self.cond.wait(&mut table);
                    }
                },
            }
        }

        debug!("timer scheduler stopped");

        Ok(())
    }

    /// Request that `run` returns. The loop finishes the callback it may be
    /// executing first.
    ///
    /// If no thread is running the scheduler, the next call to `run`
    /// returns immediately.
    pub fn stop(&self) {
        let mut table = self.table.lock();
        table.stop_requested = true;
        self.cond.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn fire(table: &mut MutexGuard<TimerTable>, id: TimerId, mut callback: Callback) -> Callback {
        MutexGuard::unlocked(table, || {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback())) {
                error!("{} panicked: {}", id, panic_message(payload.as_ref()));
            }
        });

        callback
    }
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        let live = self.table.get_mut().records.len();

        if live > 0 {
            debug!("dropping timer scheduler with {} live timers", live);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    fn run_in_background(scheduler: &Arc<TimerScheduler>) -> thread::JoinHandle<Result<()>> {
        let scheduler = scheduler.clone();

        thread::spawn(move || scheduler.run())
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let scheduler = TimerScheduler::new();

        let ids: Vec<_> = (0..100)
            .map(|_| {
                scheduler
                    .create_timer(Duration::from_secs(60), || (), TimerMode::Once)
                    .unwrap()
            })
            .collect();

        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }

        assert_eq!(scheduler.count(), 100);

        for id in ids.iter() {
            scheduler.delete_timer(*id).unwrap();
        }

        assert_eq!(scheduler.count(), 0);

        let next = scheduler
            .create_timer(Duration::from_secs(60), || (), TimerMode::Once)
            .unwrap();

        assert!(next > ids[99]);
    }

    #[test]
    fn test_invalid_arguments() {
        let scheduler = TimerScheduler::new();

        assert!(matches!(
            scheduler.create_timer(Duration::from_secs(0), || (), TimerMode::Repeating),
            Err(Error::InvalidArgument(_))
        ));

        assert!(matches!(
            scheduler.create_timer(Duration::from_secs(u64::MAX), || (), TimerMode::Once),
            Err(Error::InvalidArgument(_))
        ));

        assert_eq!(scheduler.count(), 0);

        // a zero delay is fine for a one-shot
        assert!(scheduler
            .create_timer(Duration::from_secs(0), || (), TimerMode::Once)
            .is_ok());
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let scheduler = Arc::new(TimerScheduler::new());
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler
            .create_timer(Duration::from_secs(60), || (), TimerMode::Once)
            .unwrap();

        let once = {
            let fired = fired.clone();

            scheduler
                .create_timer(
                    Duration::from_millis(0),
                    move || {
                        fired.fetch_add(1, Ordering::SeqCst);
                    },
                    TimerMode::Once,
                )
                .unwrap()
        };

        let runner = run_in_background(&scheduler);

        {
            let fired = fired.clone();
            eventually(Duration::from_secs(5), move || fired.load(Ordering::SeqCst) == 1);
        }

        eventually(Duration::from_secs(5), || scheduler.count() == 1);

        assert!(scheduler.delete_timer(once).is_ok());
        assert!(scheduler.delete_timer(TimerId(12345)).is_ok());
        assert_eq!(scheduler.count(), 1);

        scheduler.stop();
        runner.join().unwrap().unwrap();
    }

    #[test]
    fn test_delete_before_due_never_fires() {
        let scheduler = Arc::new(TimerScheduler::new());
        let fired = Arc::new(AtomicBool::new(false));

        let id = {
            let fired = fired.clone();

            scheduler
                .create_timer(
                    Duration::from_millis(50),
                    move || fired.store(true, Ordering::SeqCst),
                    TimerMode::Once,
                )
                .unwrap()
        };

        let runner = run_in_background(&scheduler);

        scheduler.delete_timer(id).unwrap();
        assert_eq!(scheduler.count(), 0);

        thread::sleep(Duration::from_millis(150));

        assert!(!fired.load(Ordering::SeqCst));

        scheduler.stop();
        runner.join().unwrap().unwrap();
    }

    #[test]
    fn test_one_thousand_one_shots() {
        let scheduler = Arc::new(TimerScheduler::new());
        let recorder = Recorder::new();
        let start = Instant::now();

        for i in 0..1000_u64 {
            let recorder = recorder.clone();

            scheduler
                .create_timer(
                    Duration::from_micros(100 * i),
                    move || recorder.record(i),
                    TimerMode::Once,
                )
                .unwrap();
        }

        let runner = run_in_background(&scheduler);

        {
            let recorder = recorder.clone();
            eventually(Duration::from_secs(10), move || recorder.len() == 1000);
        }

        scheduler.stop();
        runner.join().unwrap().unwrap();

        // each fired once, in deadline order
        assert_eq!(recorder.entries(), (0..1000).collect::<Vec<_>>());
        assert_eq!(scheduler.count(), 0);
        assert!(start.elapsed() >= Duration::from_micros(100 * 999));
    }

    #[test]
    fn test_repeating_timer_does_not_drift() {
        let scheduler = Arc::new(TimerScheduler::new());
        let recorder = Recorder::new();
        let period = Duration::from_millis(50);
        let start = Instant::now();

        let id = {
            let recorder = recorder.clone();

            scheduler
                .create_timer(
                    period,
                    move || {
                        recorder.record(Instant::now());

                        // execution latency must not push later firings back
                        thread::sleep(Duration::from_millis(5));
                    },
                    TimerMode::Repeating,
                )
                .unwrap()
        };

        let runner = run_in_background(&scheduler);

        thread::sleep(Duration::from_millis(520));
        assert!(recorder.len() >= 9, "fired {} times", recorder.len());

        {
            let recorder = recorder.clone();
            eventually(Duration::from_secs(10), move || recorder.len() >= 21);
        }

        scheduler.delete_timer(id).unwrap();
        scheduler.stop();
        runner.join().unwrap().unwrap();

        let fires = recorder.entries();

        // the nth firing is anchored to start + n * period, so the gap
        // between the scheduled and actual time stays bounded rather than
        // accumulating 5ms of latency per firing
        for (n, fired_at) in fires.iter().take(21).enumerate() {
            let scheduled = start + period * (n as u32 + 1);
            assert!(*fired_at >= scheduled);
            assert!(
                *fired_at - scheduled < Duration::from_millis(45),
                "firing {} was {:?} late",
                n,
                *fired_at - scheduled
            );
        }
    }

    #[test]
    fn test_callback_can_reenter_scheduler() {
        let scheduler = Arc::new(TimerScheduler::new());
        let recorder = Recorder::new();

        {
            let inner = scheduler.clone();
            let recorder = recorder.clone();

            scheduler
                .create_timer(
                    Duration::from_millis(1),
                    move || {
                        let recorder = recorder.clone();
                        let stopper = inner.clone();

                        inner
                            .create_timer(
                                Duration::from_millis(1),
                                move || {
                                    recorder.record("nested");
                                    stopper.stop();
                                },
                                TimerMode::Once,
                            )
                            .unwrap();
                    },
                    TimerMode::Once,
                )
                .unwrap();
        }

        scheduler.run().unwrap();

        assert_eq!(recorder.entries(), vec!["nested"]);
        assert_eq!(scheduler.count(), 0);
    }

    #[test]
    fn test_repeating_timer_can_delete_itself() {
        let scheduler = Arc::new(TimerScheduler::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<TimerId>>> = Arc::new(Mutex::new(None));

        let id = {
            let inner = scheduler.clone();
            let fired = fired.clone();
            let slot = slot.clone();

            scheduler
                .create_timer(
                    Duration::from_millis(5),
                    move || {
                        if fired.fetch_add(1, Ordering::SeqCst) == 2 {
                            if let Some(id) = *slot.lock() {
                                inner.delete_timer(id).unwrap();
                            }

                            inner.stop();
                        }
                    },
                    TimerMode::Repeating,
                )
                .unwrap()
        };

        *slot.lock() = Some(id);

        scheduler.run().unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.count(), 0);
    }

    #[test]
    fn test_panic() {
        let scheduler = Arc::new(TimerScheduler::new());
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler
            .create_timer(Duration::from_millis(1), || panic!("testing"), TimerMode::Once)
            .unwrap();

        {
            let fired = fired.clone();
            let stopper = scheduler.clone();

            scheduler
                .create_timer(
                    Duration::from_millis(5),
                    move || {
                        fired.fetch_add(1, Ordering::SeqCst);
                        stopper.stop();
                    },
                    TimerMode::Once,
                )
                .unwrap();
        }

        scheduler.run().unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.count(), 0);
    }

    #[test]
    fn test_stop_before_run_is_not_lost() {
        let scheduler = TimerScheduler::new();

        scheduler.stop();

        // returns immediately rather than blocking forever
        scheduler.run().unwrap();
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_already_running() {
        let scheduler = Arc::new(TimerScheduler::new());
        let runner = run_in_background(&scheduler);

        eventually(Duration::from_secs(5), || scheduler.is_running());

        assert!(matches!(scheduler.run(), Err(Error::AlreadyRunning)));

        scheduler.stop();
        runner.join().unwrap().unwrap();

        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_earlier_timer_wakes_waiting_loop() {
        let scheduler = Arc::new(TimerScheduler::new());
        let recorder = Recorder::new();

        scheduler
            .create_timer(Duration::from_secs(60), || (), TimerMode::Once)
            .unwrap();

        let runner = run_in_background(&scheduler);

        thread::sleep(Duration::from_millis(20));

        let created = Instant::now();

        {
            let recorder = recorder.clone();

            scheduler
                .create_timer(
                    Duration::from_millis(10),
                    move || recorder.record(created.elapsed()),
                    TimerMode::Once,
                )
                .unwrap();
        }

        {
            let recorder = recorder.clone();
            eventually(Duration::from_secs(5), move || !recorder.is_empty());
        }

        assert!(recorder.entries()[0] >= Duration::from_millis(10));

        scheduler.stop();
        runner.join().unwrap().unwrap();

        assert_eq!(scheduler.count(), 1);
    }

    #[test]
    fn test_concurrent_create_while_running() {
        let scheduler = Arc::new(TimerScheduler::new());
        let fired = Recorder::new();
        let runner = run_in_background(&scheduler);

        let creators: Vec<_> = (0..8_u64)
            .map(|t| {
                let scheduler = scheduler.clone();
                let fired = fired.clone();

                thread::spawn(move || {
                    let mut ids = Vec::new();

                    for i in 0..50_u64 {
                        let fired = fired.clone();

                        let id = scheduler
                            .create_timer(
                                Duration::from_millis(i % 7),
                                move || fired.record((t, i)),
                                TimerMode::Once,
                            )
                            .unwrap();

                        ids.push(id);
                    }

                    ids.push(
                        scheduler
                            .create_timer(Duration::from_secs(60), || (), TimerMode::Once)
                            .unwrap(),
                    );

                    ids
                })
            })
            .collect();

        let mut ids = Vec::new();

        for c in creators {
            ids.extend(c.join().unwrap());
        }

        {
            let fired = fired.clone();
            eventually(Duration::from_secs(10), move || fired.len() == 400);
        }

        thread::sleep(Duration::from_millis(50));

        let distinct: std::collections::HashSet<_> = ids.iter().cloned().collect();
        assert_eq!(distinct.len(), 408);

        // every one-shot fired exactly once, and only the long timers remain
        let mut entries = fired.entries();
        entries.sort();

        let expected: Vec<_> = (0..8_u64)
            .flat_map(|t| (0..50_u64).map(move |i| (t, i)))
            .collect();

        assert_eq!(entries, expected);
        assert_eq!(scheduler.count(), 8);

        scheduler.stop();
        runner.join().unwrap().unwrap();
    }

    /// Calls back into the scheduler when dropped.
    struct CountOnDrop {
        scheduler: Arc<TimerScheduler>,
        seen: Recorder<usize>,
    }

    impl Drop for CountOnDrop {
        fn drop(&mut self) {
            self.seen.record(self.scheduler.count());
        }
    }

    #[test]
    fn test_fired_one_shot_dropped_outside_lock() {
        let scheduler = Arc::new(TimerScheduler::new());
        let seen = Recorder::new();

        {
            let capture = CountOnDrop {
                scheduler: scheduler.clone(),
                seen: seen.clone(),
            };

            scheduler
                .create_timer(
                    Duration::from_millis(1),
                    move || {
                        let _ = &capture;
                    },
                    TimerMode::Once,
                )
                .unwrap();
        }

        let runner = run_in_background(&scheduler);

        {
            let seen = seen.clone();
            eventually(Duration::from_secs(5), move || seen.len() == 1);
        }

        scheduler.stop();
        runner.join().unwrap().unwrap();

        assert_eq!(seen.entries(), vec![0]);
    }

    #[test]
    fn test_self_deleted_repeating_dropped_outside_lock() {
        let scheduler = Arc::new(TimerScheduler::new());
        let seen = Recorder::new();
        let slot: Arc<Mutex<Option<TimerId>>> = Arc::new(Mutex::new(None));

        let id = {
            let capture = CountOnDrop {
                scheduler: scheduler.clone(),
                seen: seen.clone(),
            };

            let slot = slot.clone();

            scheduler
                .create_timer(
                    Duration::from_millis(2),
                    move || {
                        if let Some(id) = *slot.lock() {
                            capture.scheduler.delete_timer(id).unwrap();
                        }
                    },
                    TimerMode::Repeating,
                )
                .unwrap()
        };

        *slot.lock() = Some(id);

        let runner = run_in_background(&scheduler);

        {
            let seen = seen.clone();
            eventually(Duration::from_secs(5), move || seen.len() == 1);
        }

        scheduler.stop();
        runner.join().unwrap().unwrap();

        assert_eq!(seen.entries(), vec![0]);
        assert_eq!(scheduler.count(), 0);
    }

    #[test]
    fn test_deleted_pending_timer_dropped_outside_lock() {
        let scheduler = Arc::new(TimerScheduler::new());
        let seen = Recorder::new();

        let id = {
            let capture = CountOnDrop {
                scheduler: scheduler.clone(),
                seen: seen.clone(),
            };

            scheduler
                .create_timer(
                    Duration::from_secs(60),
                    move || {
                        let _ = &capture;
                    },
                    TimerMode::Once,
                )
                .unwrap()
        };

        let deleter = {
            let scheduler = scheduler.clone();
            thread::spawn(move || scheduler.delete_timer(id))
        };

        {
            let seen = seen.clone();
            eventually(Duration::from_secs(5), move || seen.len() == 1);
        }

        deleter.join().unwrap().unwrap();

        assert_eq!(seen.entries(), vec![0]);
    }
}
