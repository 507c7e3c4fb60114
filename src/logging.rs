//! Optional stderr logger for applications embedding the engines
//!
//! Library code only emits records through the `log` macros. Applications
//! that don't bring their own logger can install this one.

use fern::colors::{Color, ColoredLevelConfig};
use std::sync::Once;

static INITIALIZE_ONCE: Once = Once::new();

/// Install a `fern` logger writing to stderr at the given level.
///
/// Only the first call has any effect; later calls return `Ok(())`
/// without touching the installed logger. An error is returned if another
/// logger was already installed by something else.
pub fn setup_logger(level: log::LevelFilter) -> Result<(), fern::InitError> {
    let mut result = Ok(());

    INITIALIZE_ONCE.call_once(|| {
        result = dispatch(level).apply().map_err(fern::InitError::from);
    });

    result
}

fn dispatch(level: log::LevelFilter) -> fern::Dispatch {
    let mut colors = ColoredLevelConfig::new();
    colors.info = Color::Blue;
    let tty = atty::is(atty::Stream::Stderr);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            if tty {
                out.finish(format_args!(
                    "{} {} [{}] {}",
                    chrono::Local::now().to_rfc3339(),
                    colors.color(record.level()),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "{} {} [{}] {}",
                    chrono::Local::now().to_rfc3339(),
                    record.level(),
                    record.target(),
                    message
                ))
            }
        })
        .level(level)
        .chain(std::io::stderr())
}
