//! Configurable logging levels for pool lifecycle events, in the same shape
//! as the teacher's query logger: a default level for routine events, and an
//! escalated level plus duration threshold for ones that ran unusually long.

use log::LevelFilter;
use std::time::Duration;
use std::time::Instant;

#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct LogSettings {
    /// Level at which routine pool events (acquire, release, connect) are
    /// logged.
    pub events_level: LevelFilter,
    /// Level at which an acquire that took longer than
    /// `slow_acquire_duration` is logged instead of `events_level`.
    pub slow_acquire_level: LevelFilter,
    pub slow_acquire_duration: Duration,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            events_level: LevelFilter::Debug,
            slow_acquire_level: LevelFilter::Warn,
            slow_acquire_duration: Duration::from_secs(1),
        }
    }
}

impl LogSettings {
    pub fn log_events(&mut self, level: LevelFilter) {
        self.events_level = level;
    }

    pub fn log_slow_acquires(&mut self, level: LevelFilter, duration: Duration) {
        self.slow_acquire_level = level;
        self.slow_acquire_duration = duration;
    }

    /// Returns `true` if any logging level is enabled.
    pub fn is_enabled(&self) -> bool {
        self.events_level != LevelFilter::Off || self.slow_acquire_level != LevelFilter::Off
    }
}

// `tracing` doesn't currently support dynamic levels:
// https://github.com/tokio-rs/tracing/issues/372
#[doc(hidden)]
macro_rules! private_tracing_dynamic_enabled {
    (target: $target:expr, $level:expr) => {{
        use ::tracing::Level;

        match $level {
            Level::ERROR => ::tracing::enabled!(target: $target, Level::ERROR),
            Level::WARN => ::tracing::enabled!(target: $target, Level::WARN),
            Level::INFO => ::tracing::enabled!(target: $target, Level::INFO),
            Level::DEBUG => ::tracing::enabled!(target: $target, Level::DEBUG),
            Level::TRACE => ::tracing::enabled!(target: $target, Level::TRACE),
        }
    }};
}

#[doc(hidden)]
macro_rules! private_tracing_dynamic_event {
    (target: $target:expr, $level:expr, $($args:tt)*) => {{
        use ::tracing::Level;

        match $level {
            Level::ERROR => ::tracing::event!(target: $target, Level::ERROR, $($args)*),
            Level::WARN => ::tracing::event!(target: $target, Level::WARN, $($args)*),
            Level::INFO => ::tracing::event!(target: $target, Level::INFO, $($args)*),
            Level::DEBUG => ::tracing::event!(target: $target, Level::DEBUG, $($args)*),
            Level::TRACE => ::tracing::event!(target: $target, Level::TRACE, $($args)*),
        }
    }};
}

#[doc(hidden)]
pub(crate) fn private_level_filter_to_levels(
    filter: log::LevelFilter,
) -> Option<(tracing::Level, log::Level)> {
    let tracing_level = match filter {
        log::LevelFilter::Error => Some(tracing::Level::ERROR),
        log::LevelFilter::Warn => Some(tracing::Level::WARN),
        log::LevelFilter::Info => Some(tracing::Level::INFO),
        log::LevelFilter::Debug => Some(tracing::Level::DEBUG),
        log::LevelFilter::Trace => Some(tracing::Level::TRACE),
        log::LevelFilter::Off => None,
    };

    tracing_level.zip(filter.to_level())
}

/// Times a single acquire and emits one event on drop, at `events_level`
/// normally or `slow_acquire_level` if the acquire ran past
/// `slow_acquire_duration`.
pub(crate) struct AcquireLogger {
    start: Instant,
    settings: LogSettings,
}

impl AcquireLogger {
    pub(crate) fn new(settings: LogSettings) -> Self {
        Self {
            start: Instant::now(),
            settings,
        }
    }
}

impl Drop for AcquireLogger {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let level = if elapsed >= self.settings.slow_acquire_duration {
            self.settings.slow_acquire_level
        } else {
            self.settings.events_level
        };

        if let Some((tracing_level, log_level)) = private_level_filter_to_levels(level) {
            let log_is_enabled = log::log_enabled!(target: "latticedb::pool", log_level)
                || private_tracing_dynamic_enabled!(target: "latticedb::pool", tracing_level);
            if log_is_enabled {
                private_tracing_dynamic_event!(
                    target: "latticedb::pool",
                    tracing_level,
                    "pool acquire",
                    ?elapsed,
                );
            }
        }
    }
}
