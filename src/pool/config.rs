//! Pool sizing and timeout configuration.

use std::time::Duration;

use crate::connect_config::ConnectConfig;
use crate::logger::LogSettings;

/// Pool sizing and timeout knobs.
///
/// Capacity only ever grows at runtime once the server reports a
/// `suggested_pool_concurrency` larger than `min_capacity` — it never
/// shrinks back down, and never grows past `max_capacity` if one is set.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub(crate) connect: ConnectConfig,
    pub(crate) min_capacity: u32,
    pub(crate) max_capacity: Option<u32>,
    pub(crate) acquire_timeout: Duration,
    pub(crate) close_timeout: Duration,
    pub(crate) log_settings: LogSettings,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connect: ConnectConfig::default(),
            min_capacity: 1,
            max_capacity: None,
            acquire_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(60),
            log_settings: LogSettings::default(),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn connect_config(mut self, connect: ConnectConfig) -> Self {
        self.connect = connect;
        self
    }

    /// The capacity the pool starts at before any server suggestion arrives.
    #[must_use]
    pub fn min_capacity(mut self, value: u32) -> Self {
        self.min_capacity = value.max(1);
        self
    }

    /// A ceiling the server's suggested concurrency is not allowed to push
    /// the pool past. `None` means unbounded growth.
    #[must_use]
    pub fn max_capacity(mut self, value: u32) -> Self {
        self.max_capacity = Some(value);
        self
    }

    #[must_use]
    pub fn acquire_timeout(mut self, value: Duration) -> Self {
        self.acquire_timeout = value;
        self
    }

    #[must_use]
    pub fn close_timeout(mut self, value: Duration) -> Self {
        self.close_timeout = value;
        self
    }

    #[must_use]
    pub fn log_settings(mut self, value: LogSettings) -> Self {
        self.log_settings = value;
        self
    }
}
