//! The user-visible handle: a cheaply-cloneable wrapper around a [`Pool`]
//! carrying per-call [`Options`], exposing acquire/release and the
//! transaction factory.

use crate::acquire::AcquireGuard;
use crate::connect_config::ConnectConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::options::{Options, State, TransactionOptions};
use crate::pool::{Pool, PoolConfig};
use crate::retry::RetryOptions;
use crate::transaction::Transaction;

/// A handle to a pooled connection, carrying retry policy, transaction
/// defaults, and opaque session state for every call made through it.
///
/// Cloning a `Client` is cheap: it shares the underlying [`Pool`], but
/// [`with_retry_options`](Client::with_retry_options),
/// [`with_transaction_options`](Client::with_transaction_options), and
/// [`with_state`](Client::with_state) each return an independent sibling
/// that can override its own [`Options`] without affecting the original.
#[derive(Clone)]
pub struct Client {
    pool: Pool,
    options: Options,
}

impl Client {
    pub(crate) fn new(pool: Pool, options: Options) -> Self {
        Self { pool, options }
    }

    /// A sibling handle sharing this client's pool but able to override its
    /// own options independently.
    fn shallow_clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            options: self.options.clone(),
        }
    }

    #[must_use]
    pub fn with_retry_options(&self, retry: RetryOptions) -> Self {
        let mut clone = self.shallow_clone();
        clone.options = clone.options.with_retry_options(retry);
        clone
    }

    #[must_use]
    pub fn with_transaction_options(&self, transaction: TransactionOptions) -> Self {
        let mut clone = self.shallow_clone();
        clone.options = clone.options.with_transaction_options(transaction);
        clone
    }

    #[must_use]
    pub fn with_state(&self, state: State) -> Self {
        let mut clone = self.shallow_clone();
        clone.options = clone.options.with_state(state);
        clone
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The pool's current holder count, i.e. the number of connections it
    /// maintains. Starts at the configured minimum capacity and only ever
    /// grows, either from an explicit ceiling or the server's suggested
    /// concurrency observed on the first connect.
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// The number of holders not currently checked out. Equal to
    /// [`capacity`](Client::capacity) whenever every connection has been
    /// released.
    pub async fn free_size(&self) -> usize {
        self.pool.free_size().await
    }

    /// Open the first connection eagerly, surfacing credential or network
    /// errors at startup rather than on the first real use.
    pub async fn ensure_connected(&self) -> Result<()> {
        let guard = self.acquire().await?;
        guard.release().await
    }

    /// Check a connection out of the pool for the duration of the returned
    /// scoped guard. The connection is released on every exit path,
    /// including an early return or a panic unwinding through the guard.
    pub async fn acquire(&self) -> Result<AcquireGuard> {
        let connection = self.pool.acquire().await?;
        Ok(AcquireGuard::new(connection, self.pool.clone()))
    }

    /// Check a connection out without a scope; the caller is responsible
    /// for calling [`release`](Client::release) or the connection leaks its
    /// slot until dropped as part of the pool shutdown.
    #[deprecated(note = "use the scoped `acquire()` guard instead")]
    pub async fn acquire_owned(&self) -> Result<Connection> {
        self.pool.acquire().await
    }

    #[deprecated(note = "use the scoped `acquire()` guard instead")]
    pub async fn release(&self, connection: Connection) -> Result<()> {
        self.pool.release(connection).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn terminate(&self) {
        self.pool.terminate();
    }

    pub fn expire_connections(&self) {
        self.pool.expire_connections();
    }

    pub async fn drop_statement_caches(&self) {
        self.pool.drop_statement_caches().await;
    }

    pub async fn drop_type_caches(&self) {
        self.pool.drop_type_caches().await;
    }

    /// Start a new [`Transaction`] bound to this client's pool and options.
    pub fn transaction(&self) -> Transaction {
        Transaction::new(self.pool.clone(), self.options.clone())
    }

    #[deprecated(note = "renamed to `transaction()`")]
    pub fn raw_transaction(&self) -> Transaction {
        self.transaction()
    }

    #[deprecated(note = "renamed to `transaction()`")]
    pub fn retrying_transaction(&self) -> Transaction {
        self.transaction()
    }

    /// Acquire a connection, run `sql` against it, and release — symmetric
    /// with every other convenience method below regardless of whether the
    /// query itself succeeds.
    async fn delegate(&self, sql: &str) -> Result<Vec<u8>> {
        let mut guard = self.acquire().await?;
        let outcome = guard.execute_query(sql).await;
        match outcome {
            Ok(bytes) => {
                guard.release().await?;
                Ok(bytes)
            }
            Err(e) => {
                let _ = guard.release().await;
                Err(e)
            }
        }
    }

    pub async fn query(&self, sql: &str) -> Result<Vec<u8>> {
        self.delegate(sql).await
    }

    pub async fn query_single(&self, sql: &str) -> Result<Vec<u8>> {
        self.delegate(sql).await
    }

    pub async fn execute(&self, sql: &str) -> Result<Vec<u8>> {
        self.delegate(sql).await
    }

    pub async fn query_json(&self, sql: &str) -> Result<Vec<u8>> {
        self.delegate(sql).await
    }

    pub async fn query_single_json(&self, sql: &str) -> Result<Vec<u8>> {
        self.delegate(sql).await
    }

    pub async fn execute_json(&self, sql: &str) -> Result<Vec<u8>> {
        self.delegate(sql).await
    }
}

/// Create a client, adopting the server's suggested concurrency when
/// `concurrency` is `None`.
pub async fn create_async_client(
    dsn: Option<&str>,
    concurrency: Option<u32>,
) -> Result<Client> {
    let connect = match dsn {
        Some(dsn) => {
            ConnectConfig::parse(dsn).map_err(|e| crate::error::Error::Interface(e.to_string()))?
        }
        None => ConnectConfig::from_env(),
    };

    let mut config = PoolConfig::new().connect_config(connect);
    if let Some(n) = concurrency {
        config = config.min_capacity(n).max_capacity(n);
    }

    let pool = Pool::new(config, None, None, None);
    let client = Client::new(pool, Options::new());
    client.ensure_connected().await?;
    Ok(client)
}

#[deprecated(note = "use `create_async_client` with an explicit `concurrency`")]
pub async fn create_async_pool(min_size: u32, max_size: u32) -> Result<Client> {
    let config = PoolConfig::new()
        .connect_config(ConnectConfig::from_env())
        .min_capacity(min_size)
        .max_capacity(max_size);
    let pool = Pool::new(config, None, None, None);
    let client = Client::new(pool, Options::new());
    client.ensure_connected().await?;
    Ok(client)
}

#[deprecated(note = "use `create_async_client` with `concurrency` set to 1")]
pub async fn async_connect() -> Result<Client> {
    create_async_client(None, Some(1)).await
}
