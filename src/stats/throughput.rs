use crate::cfg::DispatchConfig;
use std::time::Instant;

#[derive(Clone, Copy)]
struct Sample {
    at: Instant,
    bytes: u64,
}

/// A rolling rate over the most recent samples of a monotonically
/// increasing byte counter.
///
/// Each `update` records the counter's current total. The rate is the
/// difference between the newest and oldest retained samples divided by
/// the time between them.
pub struct Throughput {
    samples: Vec<Sample>,
    window: usize,
    next: usize,
}

impl Throughput {
    /// Create an accumulator retaining `window` samples. Windows smaller
    /// than 2 are raised to 2, as a rate needs two samples.
    pub fn new(window: usize) -> Self {
        let window = window.max(2);

        Self {
            samples: Vec::with_capacity(window),
            window,
            next: 0,
        }
    }

    pub fn with_config(config: &DispatchConfig) -> Self {
        Self::new(config.throughput_window)
    }

    pub fn update(&mut self, total_bytes: u64) {
        self.update_at(Instant::now(), total_bytes);
    }

    fn update_at(&mut self, at: Instant, bytes: u64) {
        let sample = Sample { at, bytes };

        if self.samples.len() < self.window {
            self.samples.push(sample);
        } else {
            self.samples[self.next] = sample;
        }

        self.next = (self.next + 1) % self.window;
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.next = 0;
    }

    /// Bytes per second across the retained samples. Returns 0 until two
    /// samples with distinct timestamps have been recorded.
    pub fn bytes_per_sec(&self) -> f64 {
        let (oldest, newest) = match self.bounds() {
            Some(bounds) => bounds,
            None => return 0.0,
        };

        let elapsed = newest.at.saturating_duration_since(oldest.at).as_secs_f64();

        if elapsed <= 0.0 {
            return 0.0;
        }

        newest.bytes.saturating_sub(oldest.bytes) as f64 / elapsed
    }

    /// Kilobits per second.
    pub fn kbps(&self) -> f64 {
        self.bytes_per_sec() * 8.0 / 1000.0
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn bounds(&self) -> Option<(Sample, Sample)> {
        if self.samples.len() < 2 {
            return None;
        }

        let newest = (self.next + self.window - 1) % self.window;

        if self.samples.len() < self.window {
            // not yet wrapped, so the ring is in insertion order
            Some((self.samples[0], self.samples[newest]))
        } else {
            Some((self.samples[self.next], self.samples[newest]))
        }
    }
}
