//! Timers are used to schedule callbacks to be performed in the future
mod active;
mod scheduler;

pub use self::active::ActiveTimerScheduler;
pub use self::scheduler::{TimerId, TimerMode, TimerScheduler};
