//! The connection pool: a fixed-capacity (but growable) array of
//! [`ConnectionHolder`](holder::ConnectionHolder)s, each keeping at most one
//! live connection alive across many checkout cycles.
//!
//! Opening a connection for every operation is wasteful, and sharing one
//! connection between concurrent callers isn't safe for a stateful,
//! transactional protocol. The pool exists to amortize the cost of the
//! former without risking the latter: callers check a connection out,
//! use it exclusively, and check it back in.
//!
//! [`Client`](crate::client::Client) is the surface most callers should use;
//! `Pool` is the layer underneath it.

use std::future::Future;
use std::sync::Arc;

use crate::connection::Connection;
use crate::error::Result;
use crate::session::SessionSettings;

pub(crate) mod config;
pub(crate) mod holder;
pub(crate) mod inner;

pub use self::config::PoolConfig;
use self::holder::ConnectionHook;
use self::inner::PoolInner;

/// An asynchronous pool of connections.
///
/// `Pool` is cheap to clone: it is a reference-counted handle onto shared
/// state, and is `Send + Sync`. The pool itself never shrinks once it has
/// grown past its configured minimum capacity, whether that growth was
/// driven by the server's suggested concurrency or not.
#[derive(Clone)]
pub struct Pool(pub(crate) Arc<PoolInner>);

impl Pool {
    pub(crate) fn new(
        config: PoolConfig,
        on_connect: Option<ConnectionHook>,
        on_acquire: Option<ConnectionHook>,
        on_release: Option<ConnectionHook>,
    ) -> Self {
        let inner = PoolInner::new(config, on_connect, on_acquire, on_release);
        inner.mark_open();
        Pool(inner)
    }

    pub(crate) async fn acquire(&self) -> Result<Connection> {
        self.0.acquire().await
    }

    pub(crate) async fn release(&self, connection: Connection) -> Result<()> {
        self.0.release(connection).await
    }

    pub(crate) fn expire_connections(&self) {
        self.0.expire_connections();
    }

    pub(crate) async fn drop_statement_caches(&self) {
        self.0.drop_statement_caches().await;
    }

    pub(crate) async fn drop_type_caches(&self) {
        self.0.drop_type_caches().await;
    }

    pub(crate) async fn close(&self) {
        self.0.close().await;
    }

    pub(crate) fn terminate(&self) {
        self.0.terminate();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.0.capacity()
    }

    pub(crate) async fn free_size(&self) -> usize {
        self.0.free_size().await
    }

    pub(crate) fn cached_settings(&self) -> Option<SessionSettings> {
        self.0.cached_settings()
    }

    /// A future that resolves once [`close`](Pool::close) or
    /// [`terminate`](Pool::terminate) has finished.
    pub(crate) fn close_event(&self) -> impl Future<Output = ()> + 'static {
        let inner = self.0.clone();
        async move { inner.close_event().await }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity())
            .field("is_closed", &self.is_closed())
            .finish()
    }
}
