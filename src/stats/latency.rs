use std::time::{Duration, Instant};

/// Warns when the scope it guards takes at least `threshold` to complete.
///
/// The measurement ends when the guard is dropped or `finish` is called.
///
/// ```
/// use cadence::stats::LatencyGuard;
/// use std::time::Duration;
///
/// let _guard = LatencyGuard::new("render", Duration::from_millis(50));
/// // work that is expected to finish within 50ms
/// ```
pub struct LatencyGuard {
    tag: String,
    threshold: Duration,
    start: Instant,
    finished: bool,
}

impl LatencyGuard {
    pub fn new<S: Into<String>>(tag: S, threshold: Duration) -> Self {
        Self {
            tag: tag.into(),
            threshold,
            start: Instant::now(),
            finished: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// End the measurement now, returning the elapsed time and whether it
    /// reached the threshold.
    pub fn finish(mut self) -> (Duration, bool) {
        self.report()
    }

    fn report(&mut self) -> (Duration, bool) {
        self.finished = true;

        let elapsed = self.elapsed();
        let exceeded = elapsed >= self.threshold;

        if exceeded {
            warn!(
                "{} used {} ms > {} ms",
                self.tag,
                elapsed.as_millis(),
                self.threshold.as_millis()
            );
        } else {
            trace!("{} used {} us", self.tag, elapsed.as_micros());
        }

        (elapsed, exceeded)
    }
}

impl Drop for LatencyGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.report();
        }
    }
}
