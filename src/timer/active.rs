use super::TimerScheduler;
use crate::cfg::DispatchConfig;
use crate::error::{Error, Result};
use std::ops::Deref;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A `TimerScheduler` driven by a thread of its own.
///
/// Dropping an `ActiveTimerScheduler` stops the scheduler and blocks until
/// its thread has returned from `run`, so no callback executes after the
/// drop completes.
pub struct ActiveTimerScheduler {
    scheduler: Arc<TimerScheduler>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl ActiveTimerScheduler {
    pub fn start(config: &DispatchConfig) -> Result<Self> {
        Self::start_with(Arc::new(TimerScheduler::new()), config)
    }

    /// Drive an existing scheduler, which may already hold timers.
    pub fn start_with(scheduler: Arc<TimerScheduler>, config: &DispatchConfig) -> Result<Self> {
        let handle = {
            let scheduler = scheduler.clone();

            thread::Builder::new()
                .name(config.scheduler_thread_name.clone())
                .spawn(move || scheduler.run())
                .map_err(|source| Error::Spawn {
                    name: config.scheduler_thread_name.clone(),
                    source,
                })?
        };

        Ok(Self {
            scheduler,
            handle: Some(handle),
        })
    }

    /// The shared scheduler, e.g. to hand to callbacks that create or
    /// delete timers.
    pub fn scheduler(&self) -> &Arc<TimerScheduler> {
        &self.scheduler
    }
}

impl Deref for ActiveTimerScheduler {
    type Target = TimerScheduler;

    fn deref(&self) -> &TimerScheduler {
        &self.scheduler
    }
}

impl Drop for ActiveTimerScheduler {
    fn drop(&mut self) {
        self.scheduler.stop();

        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(Ok(())) => {}

                Ok(Err(e)) => {
                    error!("timer scheduler thread failed: {}", e);
                }

                Err(_) => {
                    error!("timer scheduler thread panicked");
                }
            }
        }
    }
}
