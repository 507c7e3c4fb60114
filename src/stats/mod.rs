//! Measurements for work run through the engines

mod latency;
mod throughput;

pub use self::latency::LatencyGuard;
pub use self::throughput::Throughput;
