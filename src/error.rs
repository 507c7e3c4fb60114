//! Errors returned by engines and the timer scheduler

use std::io;
use thiserror::Error;

/// Errors that can be returned by `cadence`.
///
/// Faults raised by submitted tasks are never surfaced here. They are
/// contained where the task is invoked, logged, and the engine moves on.
#[derive(Debug, Error)]
pub enum Error {
    /// A call was made with parameters that cannot be honored.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The operating system refused to start a thread.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A thread was started but exited before signaling that it was running.
    #[error("{name} thread exited before signaling startup")]
    Startup { name: String },

    /// `TimerScheduler::run` was called while another thread is running it.
    #[error("timer scheduler is already running")]
    AlreadyRunning,

    #[error("configuration error: {0}")]
    Config(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
