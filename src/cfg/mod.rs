//! Layered configuration for engines and schedulers

use std::collections::HashMap;
use std::time::Duration;
use std::{env, fmt, io, str};

/// A `Config` holds simple key/value pairings that are sourced
/// from a few layers, and provides methods to extract values.
///
/// Configuration values are layered, where by the environment
/// variables take highest precedence, followed by the application's
/// specified defaults (if any), followed by the library's fallback
/// defaults.
///
/// It is intended to be consulted once while constructing engines,
/// not on any hot path.
#[derive(Clone, Debug, Default)]
pub struct Config {
    defaults: HashMap<String, String>,
}

impl Config {
    /// Create a new configuration with the specified defaults. These
    /// are used if a key is not defined in the environment.
    pub fn new(defaults: &[(&str, &str)]) -> Config {
        Config {
            defaults: defaults
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }

    /// Layer library fallbacks underneath this configuration. A fallback
    /// only takes effect if the key is neither in the environment nor
    /// already a default.
    pub fn with_fallback(&self, fallback_defaults: &[(&str, &str)]) -> Config {
        let mut defaults = self.defaults.clone();

        for (key, value) in fallback_defaults {
            defaults
                .entry(key.to_string())
                .or_insert_with(|| value.to_string());
        }

        Config { defaults }
    }

    pub fn string(&self, name: &str) -> io::Result<String> {
        self.lookup(name)
            .ok_or_else(|| config_error(format!("config missing: {}", name)))
    }

    pub fn parsed<T: str::FromStr>(&self, name: &str) -> io::Result<T>
    where
        T::Err: fmt::Display,
    {
        self.string(name)?
            .trim()
            .parse::<T>()
            .map_err(|e| config_error(format!("config parse error: {} {}", name, e)))
    }

    /// A value expressed as a whole number of milliseconds.
    pub fn millis(&self, name: &str) -> io::Result<Duration> {
        self.parsed(name).map(Duration::from_millis)
    }

    fn lookup(&self, name: &str) -> Option<String> {
        env::var(name)
            .ok()
            .or_else(|| self.defaults.get(name).cloned())
    }
}

fn config_error(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::Other, message)
}

/// Settings shared by the dispatch engines and the timer scheduler.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub work_thread_name: String,
    pub timer_thread_name: String,
    pub scheduler_thread_name: String,

    /// The level used by `logging::setup_logger`, e.g. `info` or `debug`.
    pub log_level: log::LevelFilter,
    pub log_config_on_start: bool,

    /// Number of samples kept by a `Throughput` created from this config.
    pub throughput_window: usize,
}

impl DispatchConfig {
    #[rustfmt::skip]
    pub fn new(cfg: &Config) -> io::Result<Self> {
        let cfg = cfg.with_fallback(&[
            ("CADENCE_WORK_THREAD_NAME",        "cadence-work"),
            ("CADENCE_TIMER_THREAD_NAME",       "cadence-timer"),
            ("CADENCE_SCHEDULER_THREAD_NAME",   "cadence-scheduler"),
            ("CADENCE_LOG_LEVEL",               "info"),
            ("CADENCE_LOG_CONFIG_ON_START",     "false"),
            ("CADENCE_THROUGHPUT_WINDOW",       "5"),
        ]);

        Ok(Self {
            work_thread_name:       cfg.string("CADENCE_WORK_THREAD_NAME")?,
            timer_thread_name:      cfg.string("CADENCE_TIMER_THREAD_NAME")?,
            scheduler_thread_name:  cfg.string("CADENCE_SCHEDULER_THREAD_NAME")?,
            log_level:              cfg.parsed("CADENCE_LOG_LEVEL")?,
            log_config_on_start:    cfg.parsed("CADENCE_LOG_CONFIG_ON_START")?,
            throughput_window:      cfg.parsed("CADENCE_THROUGHPUT_WINDOW")?,
        })
    }
}

impl Default for DispatchConfig {
    /// The library defaults, with environment variables still taking
    /// precedence.
    ///
    /// Falls back to the built-in values if the environment holds an
    /// unparsable override.
    fn default() -> Self {
        Self::new(&Config::default()).unwrap_or_else(|e| {
            warn!("ignoring environment overrides, {}", e);

            Self {
                work_thread_name: "cadence-work".to_string(),
                timer_thread_name: "cadence-timer".to_string(),
                scheduler_thread_name: "cadence-scheduler".to_string(),
                log_level: log::LevelFilter::Info,
                log_config_on_start: false,
                throughput_window: 5,
            }
        })
    }
}
