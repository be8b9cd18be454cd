//! The single-connection handle handed to callers, and the non-owning
//! back-reference it carries to whatever holder currently owns it.

mod driver;
#[cfg(feature = "tls")]
mod tls;

use std::net::SocketAddr;
use std::sync::Weak;

use crate::connect_config::ConnectConfig;
use crate::error::{Error, Result};
use crate::options::TransactionOptions;
use crate::pool::inner::PoolInner;
use crate::session::SessionSettings;

pub(crate) use driver::Driver;

/// A non-owning pointer back to the holder slot a [`Connection`] currently
/// belongs to. Carries the pool's generation counter at the time the
/// connection was issued so a holder can tell a stale handle apart from the
/// one it currently owns without the connection needing to know anything
/// about the pool's internals.
#[derive(Clone)]
pub(crate) struct HolderRef {
    pub(crate) pool: Weak<PoolInner>,
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

/// A single connection to the server.
///
/// Ordinarily obtained through [`Pool::acquire`](crate::pool::Pool::acquire)
/// or [`Client::acquire`](crate::client::Client::acquire) rather than
/// constructed directly. Once the holder that issued a `Connection` takes it
/// back (on release), the issued handle is [`detach`](Connection::detach)ed
/// and refuses further operations — this is the fail-fast guard against
/// using a connection after returning it to the pool.
pub struct Connection {
    driver: Option<Driver>,
    holder: Option<HolderRef>,
    detached: bool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("detached", &self.detached)
            .field("driver", &self.driver)
            .finish()
    }
}

impl Connection {
    pub(crate) fn new(driver: Driver, holder: HolderRef) -> Self {
        Self {
            driver: Some(driver),
            holder: Some(holder),
            detached: false,
        }
    }

    pub(crate) async fn open(config: &ConnectConfig) -> Result<(Driver, SessionSettings)> {
        Driver::connect(config).await
    }

    /// Mark this handle as no longer backed by a live driver. Called by the
    /// holder when it takes the connection back on release; any further
    /// call against this handle returns [`Error::Interface`].
    pub(crate) fn detach(&mut self) -> Option<Driver> {
        self.detached = true;
        self.holder = None;
        self.driver.take()
    }

    pub(crate) fn holder_ref(&self) -> Option<&HolderRef> {
        self.holder.as_ref()
    }

    fn driver_mut(&mut self) -> Result<&mut Driver> {
        if self.detached {
            return Err(Error::Interface(
                "connection was already released back to the pool".into(),
            ));
        }
        self.driver
            .as_mut()
            .ok_or_else(|| Error::Interface("connection has no live driver".into()))
    }

    pub fn is_closed(&self) -> bool {
        match &self.driver {
            _ if self.detached => true,
            Some(driver) => driver.is_closed(),
            None => true,
        }
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.driver.as_ref().map(Driver::peer_addr)
    }

    /// Gracefully tell the server we're done and mark the connection closed.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(driver) = self.driver.as_mut() {
            driver.close().await;
        }
        Ok(())
    }

    /// Drop the connection without telling the server, for use once it is
    /// already known to be unusable.
    pub fn terminate(&mut self) {
        if let Some(driver) = self.driver.as_mut() {
            driver.terminate();
        }
    }

    pub async fn execute_query(&mut self, query: &str) -> Result<Vec<u8>> {
        self.driver_mut()?.execute_query(query).await
    }

    pub(crate) async fn begin(&mut self, options: &TransactionOptions) -> Result<()> {
        self.driver_mut()?.begin(options).await
    }

    pub(crate) async fn commit(&mut self) -> Result<()> {
        self.driver_mut()?.commit().await
    }

    pub(crate) async fn rollback(&mut self) -> Result<()> {
        self.driver_mut()?.rollback().await
    }
}
