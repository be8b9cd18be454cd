use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout, Instant};

use crate::connect_config::ConnectConfig;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::logger::{AcquireLogger, LogSettings};
use crate::pool::config::PoolConfig;
use crate::pool::holder::{ConnectionHolder, ConnectionHook};
use crate::session::{ResolvedServer, SessionSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PoolState {
    Initializing,
    Open,
    Closing,
    Closed,
}

/// Shared pool state: the holder array, the LIFO free queue of holder
/// indices, and the bookkeeping that drives capacity growth and connection
/// expiry.
pub(crate) struct PoolInner {
    connect: ConnectConfig,
    min_capacity: u32,
    max_capacity: Option<u32>,
    acquire_timeout: Duration,
    close_timeout: Duration,
    holders: StdMutex<Vec<Arc<ConnectionHolder>>>,
    free_queue: Mutex<VecDeque<usize>>,
    waiters: Notify,
    generation: AtomicU64,
    state: StdMutex<PoolState>,
    resolved: StdMutex<Option<ResolvedServer>>,
    on_connect: Option<ConnectionHook>,
    on_closed: event_listener::Event,
    log_settings: LogSettings,
}

impl PoolInner {
    pub(crate) fn new(
        config: PoolConfig,
        on_connect: Option<ConnectionHook>,
        on_acquire: Option<ConnectionHook>,
        on_release: Option<ConnectionHook>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<PoolInner>| {
            let holders = (0..config.min_capacity)
                .map(|i| {
                    ConnectionHolder::new(
                        i as usize,
                        weak.clone(),
                        on_acquire.clone(),
                        on_release.clone(),
                    )
                })
                .collect::<Vec<_>>();
            let free_queue = (0..holders.len()).rev().collect();

            Self {
                connect: config.connect,
                min_capacity: config.min_capacity,
                max_capacity: config.max_capacity,
                acquire_timeout: config.acquire_timeout,
                close_timeout: config.close_timeout,
                holders: StdMutex::new(holders),
                free_queue: Mutex::new(free_queue),
                waiters: Notify::new(),
                generation: AtomicU64::new(1),
                state: StdMutex::new(PoolState::Initializing),
                resolved: StdMutex::new(None),
                on_connect,
                on_closed: event_listener::Event::new(),
                log_settings: config.log_settings,
            }
        })
    }

    pub(crate) fn mark_open(&self) {
        let mut state = self.state.lock().expect("pool state poisoned");
        if *state == PoolState::Initializing {
            *state = PoolState::Open;
        }
    }

    fn pool_state(&self) -> PoolState {
        *self.state.lock().expect("pool state poisoned")
    }

    pub(crate) fn is_closed(&self) -> bool {
        matches!(self.pool_state(), PoolState::Closing | PoolState::Closed)
    }

    pub(crate) fn capacity(&self) -> usize {
        self.holders.lock().expect("holders poisoned").len()
    }

    /// The number of holders currently sitting in the free queue, i.e. not
    /// checked out. `free_size() == capacity()` whenever nothing is in use.
    pub(crate) async fn free_size(&self) -> usize {
        self.free_queue.lock().await.len()
    }

    /// Future that resolves once the pool transitions to `Closed`.
    pub(crate) fn close_event(&self) -> impl Future<Output = ()> + '_ {
        let listener = (!matches!(self.pool_state(), PoolState::Closed))
            .then(|| self.on_closed.listen());
        async move {
            if let Some(listener) = listener {
                listener.await;
            }
        }
    }

    /// Grow the holder array to `target` slots, never shrinking. Called
    /// after a freshly opened connection reports a
    /// `suggested_pool_concurrency` larger than the current capacity.
    async fn grow_to(self: &Arc<Self>, target: u32) {
        let target = match self.max_capacity {
            Some(max) => target.min(max),
            None => target,
        };

        let mut holders = self.holders.lock().expect("holders poisoned");
        if target as usize <= holders.len() {
            return;
        }
        let start = holders.len();
        let weak = Arc::downgrade(self);
        let mut queue = self.free_queue.lock().await;
        for i in start..target as usize {
            let holder = ConnectionHolder::new(i, weak.clone(), None, None);
            holders.push(holder);
            queue.push_back(i);
        }
        drop(queue);
        drop(holders);
        self.waiters.notify_waiters();
    }

    fn cached_server(&self) -> Option<ResolvedServer> {
        self.resolved.lock().expect("resolved poisoned").clone()
    }

    fn cache_server(&self, resolved: ResolvedServer) {
        *self.resolved.lock().expect("resolved poisoned") = Some(resolved);
    }

    /// Pop a free holder index, waiting if every holder is currently
    /// checked out.
    async fn pop_free_holder(self: &Arc<Self>, deadline: Instant) -> Result<Arc<ConnectionHolder>> {
        loop {
            if self.is_closed() {
                return Err(Error::PoolClosed);
            }

            {
                let mut queue = self.free_queue.lock().await;
                if let Some(index) = queue.pop_back() {
                    drop(queue);
                    let holders = self.holders.lock().expect("holders poisoned");
                    return Ok(holders[index].clone());
                }
            }

            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(Error::PoolTimedOut(self.acquire_timeout))?;

            tokio::select! {
                _ = self.waiters.notified() => {}
                _ = tokio::time::sleep(remaining.min(Duration::from_millis(50))) => {}
                _ = self.close_event() => return Err(Error::PoolClosed),
            }
        }
    }

    /// Check out a connection, opening a fresh one if the holder's is
    /// stale or missing, and discover/cache server settings the first time
    /// around.
    pub(crate) async fn acquire(self: &Arc<Self>) -> Result<Connection> {
        let _logger = AcquireLogger::new(self.log_settings.clone());

        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        let deadline = Instant::now() + self.acquire_timeout;
        let holder = timeout(self.acquire_timeout, self.pop_free_holder(deadline))
            .await
            .map_err(|_| Error::PoolTimedOut(self.acquire_timeout))??;

        let pool_generation = self.generation.load(Ordering::Acquire);
        let connect_timeout = deadline.checked_duration_since(Instant::now());

        // Guards the window between taking `holder.index` off the free
        // queue and successfully handing its connection back to the
        // caller. `holder.acquire(...)` below suspends on I/O (opening a
        // connection, the `on_connect`/`on_acquire` hooks) — if the
        // enclosing future is dropped while that's in flight, neither arm
        // of the `match` below runs. Without this guard the holder would
        // be lost from `free_queue` for good; its `Drop` re-enqueues it
        // unless explicitly disarmed on every path that already put it
        // back itself.
        let mut reenqueue = ReenqueueGuard::new(Arc::downgrade(self), holder.index);

        let acquire_result = holder
            .acquire(
                &self.connect,
                pool_generation,
                self.on_connect.as_ref(),
                connect_timeout,
            )
            .await;

        let (connection, discovered) = match acquire_result {
            Ok(pair) => {
                reenqueue.disarm();
                pair
            }
            Err(e) => {
                // Put the slot back so a failed connect doesn't shrink the
                // effective pool permanently.
                self.free_queue.lock().await.push_back(holder.index);
                self.waiters.notify_waiters();
                reenqueue.disarm();
                return Err(e);
            }
        };

        if let Some(settings) = discovered {
            if let Some(addr) = connection.remote_addr() {
                self.cache_server(ResolvedServer {
                    address: addr,
                    settings: settings.clone(),
                });
            }
            if let Some(suggested) = settings.suggested_pool_concurrency {
                if suggested as usize > self.capacity() {
                    self.grow_to(suggested).await;
                }
            }
        }

        Ok(connection)
    }

    /// Return a connection to its holder. Cancellation-shielded by the
    /// caller: once this future is polled to completion the slot is back in
    /// the free queue regardless of what happens to the connection.
    pub(crate) async fn release(self: &Arc<Self>, connection: Connection) -> Result<()> {
        let Some(holder_ref) = connection.holder_ref().cloned() else {
            return Err(Error::Interface(
                "connection was already released".into(),
            ));
        };
        let index = holder_ref.index;

        let holder = {
            let holders = self.holders.lock().expect("holders poisoned");
            holders
                .get(index)
                .cloned()
                .ok_or_else(|| Error::Internal("holder index out of range".into()))?
        };

        let result = holder.release(connection).await;
        self.free_queue.lock().await.push_back(index);
        self.waiters.notify_waiters();
        result
    }

    /// Bump the generation counter so every currently cached connection is
    /// treated as stale and replaced on its next acquire.
    pub(crate) fn expire_connections(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// The pool's current generation fence, consulted by a holder on
    /// release to decide whether the connection it's getting back already
    /// predates an `expire_connections()` call.
    pub(crate) fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Forward a cache-invalidation call to every live holder. The codec
    /// caches themselves are out of scope here, so this amounts to a no-op
    /// per holder, but the fan-out is real.
    pub(crate) async fn drop_statement_caches(&self) {
        let holders: Vec<_> = self.holders.lock().expect("holders poisoned").clone();
        for holder in holders {
            let _ = holder.index; // no statement cache to invalidate on this transport
        }
    }

    pub(crate) async fn drop_type_caches(&self) {
        self.drop_statement_caches().await;
    }

    /// Close gracefully: wait for every checked-out holder to come back,
    /// closing each as it does, then mark the pool closed.
    ///
    /// A `close_timeout`-long watchdog runs alongside the wait and only
    /// ever warns ("a checkout may have leaked") — it never forces
    /// anything on its own. The actual fall-through-to-`terminate()`
    /// happens if this `close()` call itself is cancelled (its future
    /// dropped) before the wait finishes: `ClosingGuard`'s `Drop` observes
    /// that and terminates every holder so the pool still ends up fully
    /// closed even though the caller never saw this call return.
    pub(crate) async fn close(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().expect("pool state poisoned");
            if *state == PoolState::Closed {
                return;
            }
            *state = PoolState::Closing;
        }

        let holders: Vec<_> = self.holders.lock().expect("holders poisoned").clone();

        let watchdog_handle = {
            let weak = Arc::downgrade(self);
            let close_timeout = self.close_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(close_timeout).await;
                if let Some(inner) = weak.upgrade() {
                    if inner.pool_state() != PoolState::Closed {
                        tracing::warn!(
                            ?close_timeout,
                            "pool close has not completed yet; a checked-out connection may have leaked"
                        );
                    }
                }
            })
        };

        let mut guard = ClosingGuard {
            inner: self,
            holders: &holders,
            completed: false,
        };
        for holder in &holders {
            holder.wait_until_released().await;
            holder.close().await;
        }
        guard.completed = true;
        drop(guard);

        watchdog_handle.abort();
        self.finish_closing();
    }

    /// Close immediately without waiting for outstanding checkouts.
    pub(crate) fn terminate(&self) {
        let mut state = self.state.lock().expect("pool state poisoned");
        if *state == PoolState::Closed {
            return;
        }
        *state = PoolState::Closing;
        drop(state);

        let holders = self.holders.lock().expect("holders poisoned");
        for holder in holders.iter() {
            holder.terminate();
        }
        drop(holders);

        self.finish_closing();
    }

    fn finish_closing(&self) {
        *self.state.lock().expect("pool state poisoned") = PoolState::Closed;
        self.waiters.notify_waiters();
        self.on_closed.notify(usize::MAX);
    }

    pub(crate) fn cached_settings(&self) -> Option<SessionSettings> {
        self.cached_server().map(|resolved| resolved.settings)
    }
}

/// Re-enqueues a holder index onto its pool's free queue if dropped while
/// still armed — i.e. if the `acquire()` call holding it is cancelled
/// before the connection is successfully handed to the caller. `disarm()`
/// must be called on every path that already returns the holder to the
/// queue itself (a failed connect) or keeps it checked out (a successful
/// acquire), so the only path left for `Drop` to act on is cancellation.
struct ReenqueueGuard {
    pool: Weak<PoolInner>,
    index: usize,
    armed: bool,
}

impl ReenqueueGuard {
    fn new(pool: Weak<PoolInner>, index: usize) -> Self {
        Self {
            pool,
            index,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ReenqueueGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        let index = self.index;
        tokio::task::spawn(async move {
            pool.free_queue.lock().await.push_back(index);
            pool.waiters.notify_waiters();
        });
    }
}

/// Falls through to an abrupt `terminate()` of every holder if dropped
/// before `completed` is set — i.e. if the `close()` call driving it is
/// itself cancelled. Mirrors the "catch cancellation, terminate, re-raise"
/// discipline §5 specifies for `close()`.
struct ClosingGuard<'a> {
    inner: &'a PoolInner,
    holders: &'a [Arc<ConnectionHolder>],
    completed: bool,
}

impl Drop for ClosingGuard<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        for holder in self.holders {
            holder.terminate();
        }
        self.inner.finish_closing();
    }
}
