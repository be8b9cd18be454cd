//! A single pool slot: at most one live connection, reused across many
//! checkout cycles, with the hook and detach discipline the pool core
//! requires of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;

use crate::connect_config::ConnectConfig;
use crate::connection::{Connection, Driver, HolderRef};
use crate::error::{Error, Result};
use crate::pool::inner::PoolInner;
use crate::session::SessionSettings;
use crate::util::BoxFuture;

/// A hook invoked with a borrowed connection, able to fail the operation it
/// is attached to. Used for `on_connect` (fires once per physical
/// connection), and `on_acquire`/`on_release` (fire on every checkout
/// cycle).
pub(crate) type ConnectionHook =
    Arc<dyn Fn(&mut Connection) -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct HolderState {
    driver: Option<Driver>,
    /// The pool generation this driver was opened under. Compared against
    /// the pool's current generation on every acquire so a stale driver
    /// (one that predates a call to `expire_connections`) is replaced
    /// rather than handed back out.
    driver_generation: u64,
    in_use: bool,
}

pub(crate) struct ConnectionHolder {
    pub(crate) index: usize,
    pool: Weak<PoolInner>,
    on_acquire: Option<ConnectionHook>,
    on_release: Option<ConnectionHook>,
    state: Mutex<HolderState>,
    released: Notify,
    closed: AtomicBool,
}

impl ConnectionHolder {
    pub(crate) fn new(
        index: usize,
        pool: Weak<PoolInner>,
        on_acquire: Option<ConnectionHook>,
        on_release: Option<ConnectionHook>,
    ) -> Arc<Self> {
        Arc::new(Self {
            index,
            pool,
            on_acquire,
            on_release,
            state: Mutex::new(HolderState {
                driver: None,
                driver_generation: 0,
                in_use: false,
            }),
            released: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Hand this holder's connection to a caller, opening a fresh one if
    /// this is the first use, the prior connection was dropped, or the
    /// pool's generation has advanced since it was opened. Returns the
    /// settings a freshly opened connection reported, if any.
    pub(crate) async fn acquire(
        self: &Arc<Self>,
        config: &ConnectConfig,
        pool_generation: u64,
        on_connect: Option<&ConnectionHook>,
        connect_timeout: Option<Duration>,
    ) -> Result<(Connection, Option<SessionSettings>)> {
        let mut guard = self.state.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::PoolClosed);
        }

        let stale = guard.driver.is_some() && guard.driver_generation < pool_generation;
        if stale {
            if let Some(mut old) = guard.driver.take() {
                old.close().await;
            }
        }

        let mut discovered = None;
        if guard.driver.is_none() {
            let connect_fut = Connection::open(config);
            let (driver, settings) = match connect_timeout {
                Some(d) => timeout(d, connect_fut)
                    .await
                    .map_err(|_| Error::PoolTimedOut(d))??,
                None => connect_fut.await?,
            };
            guard.driver = Some(driver);
            guard.driver_generation = pool_generation;
            discovered = Some(settings);
        }

        let driver = guard
            .driver
            .take()
            .expect("driver populated by the branches above");
        guard.in_use = true;
        drop(guard);

        // From here to the `Ok` below, this holder is committed to
        // `in_use = true` with no driver of its own (it was just taken into
        // `connection`). If the caller cancels while `on_connect`/
        // `on_acquire` is suspended on I/O, this function's frame — and
        // `connection` along with it — is simply dropped; nothing else
        // would ever clear `in_use` or restore the holder to a usable
        // state. `in_flight`'s `Drop` is what undoes that, the same way
        // `reset_after_failure` does for an observed hook error.
        let mut in_flight = InFlightGuard::new(self.clone());

        let holder_ref = HolderRef {
            pool: self.pool.clone(),
            index: self.index,
            generation: pool_generation,
        };
        let mut connection = Connection::new(driver, holder_ref);

        if discovered.is_some() {
            if let Some(hook) = on_connect {
                if let Err(e) = hook(&mut connection).await {
                    connection.terminate();
                    self.reset_after_failure().await;
                    in_flight.disarm();
                    return Err(e);
                }
            }
        }

        if let Some(hook) = &self.on_acquire {
            if let Err(e) = hook(&mut connection).await {
                connection.terminate();
                self.reset_after_failure().await;
                in_flight.disarm();
                return Err(e);
            }
        }

        in_flight.disarm();
        Ok((connection, discovered))
    }

    /// Take the connection back. The handle the caller is holding becomes
    /// detached (and therefore unusable) as a side effect of
    /// [`Connection::detach`]; this holder retains the live driver for the
    /// next `acquire`, unless it turns out to be broken or stale, in which
    /// case it's closed here and the next `acquire` opens a fresh one (S5).
    pub(crate) async fn release(self: &Arc<Self>, mut connection: Connection) -> Result<()> {
        let current_pool_generation = self.pool.upgrade().map(|p| p.current_generation());
        let stale = {
            let guard = self.state.lock().await;
            current_pool_generation.is_some_and(|current| guard.driver_generation < current)
        };

        // S5/S6: a connection that already died mid-use, or one whose
        // generation has gone stale since it was handed out, skips the
        // hook entirely (no point running I/O against a socket we're
        // about to close anyway) and falls straight through to slot
        // bookkeeping.
        if !connection.is_closed() && !stale {
            if let Some(hook) = &self.on_release {
                if let Err(e) = hook(&mut connection).await {
                    connection.terminate();
                    self.reset_after_failure().await;
                    return Err(e);
                }
            }
        }

        let closed = connection.is_closed();
        let driver = connection.detach();
        let mut guard = self.state.lock().await;

        if closed || stale {
            if let Some(mut old) = driver {
                old.close().await;
            }
            guard.driver = None;
        } else {
            guard.driver = driver;
        }
        guard.in_use = false;
        drop(guard);
        self.released.notify_waiters();
        Ok(())
    }

    async fn reset_after_failure(self: &Arc<Self>) {
        let mut guard = self.state.lock().await;
        guard.driver = None;
        guard.in_use = false;
        drop(guard);
        self.released.notify_waiters();
    }

    pub(crate) async fn wait_until_released(&self) {
        loop {
            {
                let guard = self.state.lock().await;
                if !guard.in_use {
                    return;
                }
            }
            // Bounded wait: `Notify::notify_waiters` only reaches listeners
            // already polling at the moment it fires, so pair it with a
            // short poll interval to close the race rather than relying on
            // the notification alone.
            tokio::select! {
                _ = self.released.notified() => {},
                _ = tokio::time::sleep(Duration::from_millis(50)) => {},
            }
        }
    }

    /// Gracefully close the live connection, if any, and mark the holder
    /// permanently closed.
    pub(crate) async fn close(&self) {
        let mut guard = self.state.lock().await;
        if let Some(driver) = guard.driver.as_mut() {
            driver.close().await;
        }
        guard.driver = None;
        self.closed.store(true, Ordering::Release);
    }

    /// Drop the live connection without a graceful close. Never blocks.
    pub(crate) fn terminate(&self) {
        self.closed.store(true, Ordering::Release);
        if let Ok(mut guard) = self.state.try_lock() {
            if let Some(driver) = guard.driver.as_mut() {
                driver.terminate();
            }
            guard.driver = None;
        }
    }
}

/// Resets a holder's `in_use`/`driver` bookkeeping via
/// [`ConnectionHolder::reset_after_failure`] if dropped while still armed —
/// i.e. if the `acquire()` call holding it is cancelled after the driver
/// has been taken out for the caller but before `acquire()` returns.
/// `disarm()` must be called on every path that already returns normally
/// (success) or already resets the bookkeeping itself (an observed hook
/// error), so the only path left for `Drop` to act on is cancellation.
struct InFlightGuard {
    holder: Arc<ConnectionHolder>,
    armed: bool,
}

impl InFlightGuard {
    fn new(holder: Arc<ConnectionHolder>) -> Self {
        Self {
            holder,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let holder = self.holder.clone();
        tokio::task::spawn(async move {
            holder.reset_after_failure().await;
        });
    }
}
