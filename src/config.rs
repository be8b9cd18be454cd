//! The connection/pool builder: owns connect arguments, pool sizing,
//! timeouts, TLS mode, logging, default retry/transaction options, and the
//! three lifecycle hooks, in the shape of the teacher's `Musq` builder.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::connect_config::{ConnectConfig, ParseError, TlsMode};
use crate::connection::Connection;
use crate::error::Result;
use crate::logger::LogSettings;
use crate::options::{Options, TransactionOptions};
use crate::pool::holder::ConnectionHook;
use crate::pool::{Pool, PoolConfig};
use crate::retry::RetryOptions;
use crate::{Client, util::BoxFuture};

/// Builds a [`Client`] backed by a [`Pool`].
///
/// See the source of [`LatticeDb::new`] for the current defaults.
#[derive(Clone)]
pub struct LatticeDb {
    connect: ConnectConfig,
    min_capacity: u32,
    max_capacity: Option<u32>,
    acquire_timeout: Duration,
    close_timeout: Duration,
    log_settings: LogSettings,
    retry_options: RetryOptions,
    transaction_options: TransactionOptions,
    on_connect: Option<ConnectionHook>,
    on_acquire: Option<ConnectionHook>,
    on_release: Option<ConnectionHook>,
}

impl Default for LatticeDb {
    fn default() -> Self {
        Self::new()
    }
}

impl LatticeDb {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connect: ConnectConfig::default(),
            min_capacity: 1,
            max_capacity: None,
            acquire_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(60),
            log_settings: LogSettings::default(),
            retry_options: RetryOptions::default(),
            transaction_options: TransactionOptions::default(),
            on_connect: None,
            on_acquire: None,
            on_release: None,
        }
    }

    /// Parse connection arguments from a `latticedb://` DSN.
    pub fn dsn(dsn: &str) -> std::result::Result<Self, ParseError> {
        Ok(Self::new().connect_config(ConnectConfig::parse(dsn)?))
    }

    /// Read connection arguments from `LATTICEDB_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new().connect_config(ConnectConfig::from_env())
    }

    #[must_use]
    pub fn connect_config(mut self, connect: ConnectConfig) -> Self {
        self.connect = connect;
        self
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.connect.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.connect.port = port;
        self
    }

    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.connect.user = user.into();
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.connect.password = password.into();
        self
    }

    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.connect.database = database.into();
        self
    }

    #[must_use]
    pub fn tls(mut self, mode: TlsMode) -> Self {
        self.connect.tls = mode;
        self
    }

    /// Pin the pool's concurrency to an explicit value, opting out of
    /// adopting the server's `suggested_pool_concurrency`.
    #[must_use]
    pub fn concurrency(mut self, value: u32) -> Self {
        self.min_capacity = value.max(1);
        self.max_capacity = Some(value.max(1));
        self
    }

    /// A ceiling the server's suggested concurrency is not allowed to push
    /// the pool past, without otherwise fixing the starting capacity.
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

    #[must_use]
    pub fn retry_options(mut self, value: RetryOptions) -> Self {
        self.retry_options = value;
        self
    }

    #[must_use]
    pub fn transaction_options(mut self, value: TransactionOptions) -> Self {
        self.transaction_options = value;
        self
    }

    #[must_use]
    pub fn on_connect<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_connect = Some(wrap_hook(hook));
        self
    }

    #[must_use]
    pub fn on_acquire<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_acquire = Some(wrap_hook(hook));
        self
    }

    #[must_use]
    pub fn on_release<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_release = Some(wrap_hook(hook));
        self
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig::new()
            .connect_config(self.connect.clone())
            .min_capacity(self.min_capacity)
            .acquire_timeout(self.acquire_timeout)
            .close_timeout(self.close_timeout)
            .log_settings(self.log_settings.clone())
            .max_capacity(self.max_capacity.unwrap_or(u32::MAX))
    }

    fn build_pool(&self) -> Pool {
        let config = if self.max_capacity.is_some() {
            self.pool_config()
        } else {
            // No explicit ceiling: build without calling `max_capacity` so
            // `PoolConfig`'s own `None` default (unbounded growth) applies.
            PoolConfig::new()
                .connect_config(self.connect.clone())
                .min_capacity(self.min_capacity)
                .acquire_timeout(self.acquire_timeout)
                .close_timeout(self.close_timeout)
                .log_settings(self.log_settings.clone())
        };
        Pool::new(
            config,
            self.on_connect.clone(),
            self.on_acquire.clone(),
            self.on_release.clone(),
        )
    }

    fn default_options(&self) -> Options {
        Options::new()
            .with_retry_options(self.retry_options.clone())
            .with_transaction_options(self.transaction_options)
    }

    /// Build a [`Client`] and eagerly open its first connection, surfacing
    /// credential or network errors immediately.
    pub async fn connect(&self) -> Result<Client> {
        let client = Client::new(self.build_pool(), self.default_options());
        client.ensure_connected().await?;
        Ok(client)
    }

    /// Build a [`Client`] without opening a connection; the first real use
    /// pays the connect cost.
    #[must_use]
    pub fn connect_lazy(&self) -> Client {
        Client::new(self.build_pool(), self.default_options())
    }
}

fn wrap_hook<F, Fut>(hook: F) -> ConnectionHook
where
    F: Fn(&mut Connection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |conn: &mut Connection| -> BoxFuture<'static, Result<()>> {
        Box::pin(hook(conn))
    })
}
