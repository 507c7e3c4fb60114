//! Common types necessary for most applications

pub use log::{debug, error, info, trace, warn};

pub use crate::cfg::{Config, DispatchConfig};
pub use crate::dispatcher::*;
pub use crate::error::{Error, Result};
pub use crate::stats::{LatencyGuard, Throughput};
pub use crate::timer::{ActiveTimerScheduler, TimerId, TimerMode, TimerScheduler};
