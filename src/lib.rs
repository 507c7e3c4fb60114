//! # Cadence
//!
//! Cadence runs closures in a defined order on a defined thread. It provides:
//!
//! * `WorkerDispatchEngine`, which owns a work thread and a timer thread and
//!   accepts asynchronous, synchronous and deferred submissions.
//! * `DrivenDispatchEngine`, which accepts the same submissions but executes
//!   them only on a thread that calls its `run` method, e.g. a foreign main
//!   loop.
//! * `TimerScheduler`, an independent manager of one-shot and repeating
//!   timers identified by `TimerId`, whose callbacks execute on the thread
//!   that runs it.
//!
//! Submissions to an engine from one thread execute in the order they were
//! made. A panic inside a submitted closure is caught and logged, and the
//! engine carries on with the next one.

extern crate atty;
extern crate chrono;
extern crate crossbeam;
extern crate fern;
extern crate parking_lot;

#[macro_use]
extern crate log;

pub mod cfg;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod queue;
pub mod stats;
pub mod timer;
pub mod util;

#[cfg(feature = "testkit")]
pub mod testkit;

#[cfg(all(test, not(feature = "testkit")))]
pub mod testkit;

pub use crate::error::{Error, Result};
