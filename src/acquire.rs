//! The scoped resource guard returned by [`Client::acquire`](crate::client::Client::acquire).

use crate::connection::Connection;
use crate::error::Result;
use crate::pool::Pool;

/// A connection checked out of the pool, released automatically when the
/// guard is dropped.
///
/// Release happens on every path out of scope: normal drop, an early
/// `return`, a panic unwinding through it, or the surrounding future being
/// cancelled (dropped) before it finishes. The pool never needs a separate
/// "abandoned connection" sweep because of this — a holder learns its
/// connection is free the moment the guard's destructor runs, synchronously,
/// with no `.await` involved.
pub struct AcquireGuard {
    connection: Option<Connection>,
    pool: Pool,
}

impl AcquireGuard {
    pub(crate) fn new(connection: Connection, pool: Pool) -> Self {
        Self {
            connection: Some(connection),
            pool,
        }
    }
}

impl std::ops::Deref for AcquireGuard {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection
            .as_ref()
            .expect("connection only taken in Drop")
    }
}

impl std::ops::DerefMut for AcquireGuard {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection
            .as_mut()
            .expect("connection only taken in Drop")
    }
}

impl Drop for AcquireGuard {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        let pool = self.pool.clone();
        // release() only ever awaits the holder's own (uncontended) mutex
        // and a queue push; spawning keeps Drop itself synchronous, which is
        // what makes this guard cancellation-safe.
        tokio::task::spawn(async move {
            if let Err(error) = pool.release(connection).await {
                tracing::warn!(%error, "failed to release connection back to the pool");
            }
        });
    }
}

impl AcquireGuard {
    /// Explicitly release the connection, observing any error the holder's
    /// `on_release` hook produced. Prefer this over letting the guard drop
    /// when the release outcome matters to the caller.
    pub async fn release(mut self) -> Result<()> {
        let connection = self
            .connection
            .take()
            .expect("connection only taken once");
        let pool = self.pool.clone();
        pool.release(connection).await
    }
}
