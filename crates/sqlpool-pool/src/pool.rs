//! Connection pool implementation.
//!
//! ## Accounting
//!
//! The pool owns two pieces of shared state:
//!
//! - an admission [`Semaphore`] with `max_connections` permits. A caller holds
//!   one permit for the whole checkout, including the time spent opening a
//!   new connection. The maintenance task borrows permits for connections it
//!   opens or revalidates.
//! - a mutex-guarded [`PoolState`]: the idle set plus counters for open and
//!   checked-out connections and the `Active`/`Disposed` lifecycle flag.
//!
//! A connection leaving a checkout keeps its permit until it is either back
//! in the idle set or fully closed. With that rule, idle connections plus
//! permit-holding connections never exceed `max_connections`.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sqlpool_driver::{Connection, ConnectionTarget, Driver, DriverError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::lifecycle::{ConnectionMetadata, MaintenanceReport};

/// Pool lifecycle. `Active -> Disposed` is the only transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Active,
    Disposed,
}

struct IdleConnection {
    conn: Box<dyn Connection>,
    meta: ConnectionMetadata,
}

struct PoolState {
    lifecycle: Lifecycle,
    idle: VecDeque<IdleConnection>,
    /// Idle + checked out + being opened or revalidated.
    open: u32,
    /// Checked out to callers.
    in_use: u32,
}

impl PoolState {
    fn is_disposed(&self) -> bool {
        self.lifecycle == Lifecycle::Disposed
    }
}

struct PoolInner {
    config: PoolConfig,
    driver: Arc<dyn Driver>,
    target: ConnectionTarget,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState>,
    next_id: AtomicU64,
    waiting: AtomicU32,
    cancel: CancellationToken,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

/// A bounded pool of connections to one backing store.
///
/// The pool hands out connections under a capacity bound, recycles them
/// when they are released, and keeps the idle set healthy with a background
/// maintenance task that runs every
/// [`maintenance_interval`](PoolConfig::maintenance_interval).
///
/// Dropping the pool disposes it without waiting; call
/// [`dispose`](Pool::dispose) to wait for the maintenance task and for idle
/// connections to close.
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("driver", &self.inner.driver.name())
            .field("target", &self.inner.target)
            .field("status", &self.status())
            .finish()
    }
}

impl Pool {
    /// Create a pool and pre-open `min_connections` connections.
    ///
    /// Must be called from within a Tokio runtime; the maintenance task is
    /// spawned onto it.
    ///
    /// # Errors
    ///
    /// [`PoolError::Configuration`] if the configuration is invalid, or
    /// [`PoolError::ConnectionFailed`] if a pre-opened connection cannot be
    /// established. In the latter case every connection opened so far is
    /// closed before returning.
    pub async fn new(
        driver: Arc<dyn Driver>,
        target: ConnectionTarget,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        config.validate()?;

        let max = config.max_connections as usize;
        let inner = Arc::new(PoolInner {
            semaphore: Arc::new(Semaphore::new(max)),
            state: Mutex::new(PoolState {
                lifecycle: Lifecycle::Active,
                idle: VecDeque::with_capacity(max),
                open: 0,
                in_use: 0,
            }),
            config,
            driver,
            target,
            next_id: AtomicU64::new(0),
            waiting: AtomicU32::new(0),
            cancel: CancellationToken::new(),
            maintenance: Mutex::new(None),
        });
        let pool = Self { inner };

        for _ in 0..pool.inner.config.min_connections {
            match pool.inner.open_connection().await {
                Ok((conn, meta)) => {
                    let mut state = pool.inner.state.lock();
                    state.open += 1;
                    state.idle.push_back(IdleConnection { conn, meta });
                }
                Err(e) => {
                    tracing::warn!(
                        endpoint = %pool.inner.target,
                        error = %e,
                        "failed to pre-open pool connection"
                    );
                    pool.dispose().await;
                    return Err(PoolError::ConnectionFailed(e));
                }
            }
        }

        let handle = spawn_maintenance(&pool.inner);
        *pool.inner.maintenance.lock() = Some(handle);

        tracing::info!(
            driver = pool.inner.driver.name(),
            endpoint = %pool.inner.target,
            min_connections = pool.inner.config.min_connections,
            max_connections = pool.inner.config.max_connections,
            "connection pool created"
        );

        Ok(pool)
    }

    /// Create a pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Get a connection from the pool.
    ///
    /// Waits (without polling) until a permit is free, then hands out an idle
    /// connection if one is open, or opens a new one. An idle connection that
    /// reports closed is discarded and replaced.
    ///
    /// # Errors
    ///
    /// - [`PoolError::PoolClosed`] once the pool is disposed.
    /// - [`PoolError::ConnectionFailed`] if a new connection cannot be opened;
    ///   the permit is released first.
    /// - [`PoolError::AcquisitionTimeout`] if an acquire timeout is
    ///   configured and no permit became free in time.
    pub async fn get(&self) -> Result<PooledConnection, PoolError> {
        self.acquire_inner(None).await
    }

    /// Alias for [`get`](Pool::get).
    pub async fn acquire(&self) -> Result<PooledConnection, PoolError> {
        self.acquire_inner(None).await
    }

    /// Get a connection, giving up with [`PoolError::Cancelled`] if `cancel`
    /// fires while waiting for a permit.
    ///
    /// A cancelled wait consumes no permit. Once a permit is held the
    /// checkout runs to completion.
    pub async fn acquire_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> Result<PooledConnection, PoolError> {
        self.acquire_inner(Some(cancel)).await
    }

    /// Get a connection only if a permit is free right now.
    ///
    /// Returns `Ok(None)` when the pool is at capacity.
    pub async fn try_acquire(&self) -> Result<Option<PooledConnection>, PoolError> {
        self.inner.ensure_active()?;
        match Arc::clone(&self.inner.semaphore).try_acquire_owned() {
            Ok(permit) => PoolInner::checkout(&self.inner, permit).await.map(Some),
            Err(TryAcquireError::NoPermits) => Ok(None),
            Err(TryAcquireError::Closed) => Err(PoolError::PoolClosed),
        }
    }

    async fn acquire_inner(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<PooledConnection, PoolError> {
        self.inner.ensure_active()?;

        tracing::trace!("acquiring connection from pool");
        let started = Instant::now();
        let permit = self.inner.wait_for_permit(cancel).await?;
        tracing::trace!(
            wait_ms = started.elapsed().as_millis() as u64,
            "admission permit acquired"
        );

        PoolInner::checkout(&self.inner, permit).await
    }

    /// Return a connection to the pool.
    ///
    /// Equivalent to dropping the connection, except that a connection that
    /// must be closed (pool disposed, idle set full, connection reports
    /// closed) is closed before this returns.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidArgument`] if the connection was acquired from a
    /// different pool. The connection is then returned to its own pool.
    pub async fn release(&self, conn: PooledConnection) -> Result<(), PoolError> {
        if !Arc::ptr_eq(&conn.pool, &self.inner) {
            return Err(PoolError::InvalidArgument(
                "connection was not acquired from this pool".into(),
            ));
        }
        conn.release().await;
        Ok(())
    }

    /// Run one maintenance pass now.
    ///
    /// The background task calls this on every tick. A pass first sweeps the
    /// idle set (reopening connections that report closed and discarding
    /// those that cannot be reopened), then opens connections until
    /// `min_connections` are open. Failures are logged and reported, never
    /// returned; the next pass retries.
    pub async fn maintain(&self) -> MaintenanceReport {
        self.inner.maintain().await
    }

    /// Dispose the pool.
    ///
    /// Marks the pool disposed, wakes every waiting acquirer with
    /// [`PoolError::PoolClosed`], stops the maintenance task and waits for it,
    /// then closes all idle connections. Connections still checked out are
    /// closed when they are returned.
    ///
    /// Calling this more than once is harmless.
    pub async fn dispose(&self) {
        let Some(idle) = self.inner.shut_down() else {
            return;
        };

        let handle = self.inner.maintenance.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "maintenance task ended abnormally");
            }
        }

        let closed = idle.len();
        for entry in idle {
            self.inner.close_connection(entry.conn, entry.meta).await;
        }

        tracing::info!(
            endpoint = %self.inner.target,
            closed_idle = closed,
            "connection pool disposed"
        );
    }

    /// Alias for [`dispose`](Pool::dispose).
    pub async fn close(&self) {
        self.dispose().await;
    }

    /// Check if the pool has been disposed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().is_disposed()
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            idle: state.idle.len() as u32,
            in_use: state.in_use,
            open: state.open,
            waiting: self.inner.waiting.load(Ordering::SeqCst),
            max: self.inner.config.max_connections,
        }
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get the connection target.
    #[must_use]
    pub fn target(&self) -> &ConnectionTarget {
        &self.inner.target
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let Some(idle) = self.inner.shut_down() else {
            return;
        };
        tracing::debug!(idle = idle.len(), "connection pool dropped without dispose");
        if idle.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(&self.inner);
                handle.spawn(async move {
                    for entry in idle {
                        inner.close_connection(entry.conn, entry.meta).await;
                    }
                });
            }
            Err(_) => {
                tracing::debug!("no runtime available; dropping idle connections without close");
            }
        }
    }
}

impl PoolInner {
    fn ensure_active(&self) -> Result<(), PoolError> {
        if self.state.lock().is_disposed() {
            Err(PoolError::PoolClosed)
        } else {
            Ok(())
        }
    }

    async fn wait_for_permit(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<OwnedSemaphorePermit, PoolError> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => return Err(PoolError::PoolClosed),
            Err(TryAcquireError::NoPermits) => {}
        }

        let _waiting = WaitingGuard::new(&self.waiting);

        let acquire = Arc::clone(&self.semaphore).acquire_owned();
        let bounded = async {
            let permit = match self.config.acquire_timeout {
                Some(limit) => tokio::time::timeout(limit, acquire)
                    .await
                    .map_err(|_| PoolError::AcquisitionTimeout(limit))?,
                None => acquire.await,
            };
            // The semaphore is only closed by dispose.
            permit.map_err(|_| PoolError::PoolClosed)
        };

        match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(PoolError::Cancelled),
                result = bounded => result,
            },
            None => bounded.await,
        }
    }

    /// Turn a permit into a checked-out connection.
    async fn checkout(
        this: &Arc<Self>,
        permit: OwnedSemaphorePermit,
    ) -> Result<PooledConnection, PoolError> {
        let idle = {
            let mut state = this.state.lock();
            if state.is_disposed() {
                return Err(PoolError::PoolClosed);
            }
            state.idle.pop_front()
        };

        if let Some(mut entry) = idle {
            if entry.conn.is_open() {
                entry.meta.mark_validated();
                return Ok(this.hand_out(entry.conn, entry.meta, permit));
            }

            tracing::debug!(
                conn_id = entry.meta.id,
                "idle connection reports closed; replacing it"
            );
            this.state.lock().open -= 1;
            this.close_connection(entry.conn, entry.meta).await;
        }

        let reservation = this.reserve()?;
        let (conn, meta) = this
            .open_connection()
            .await
            .map_err(PoolError::ConnectionFailed)?;
        reservation.commit();

        Ok(this.hand_out(conn, meta, permit))
    }

    fn hand_out(
        self: &Arc<Self>,
        conn: Box<dyn Connection>,
        mut meta: ConnectionMetadata,
        permit: OwnedSemaphorePermit,
    ) -> PooledConnection {
        meta.mark_checkout();
        self.state.lock().in_use += 1;
        tracing::trace!(conn_id = meta.id, checkouts = meta.checkout_count, "connection checked out");
        PooledConnection {
            conn: Some(conn),
            meta,
            pool: Arc::clone(self),
            permit: Some(permit),
            reusable: true,
        }
    }

    /// Count a connection that is about to be opened.
    fn reserve(&self) -> Result<SlotReservation<'_>, PoolError> {
        let mut state = self.state.lock();
        if state.is_disposed() {
            return Err(PoolError::PoolClosed);
        }
        state.open += 1;
        Ok(SlotReservation {
            state: &self.state,
            armed: true,
        })
    }

    async fn open_connection(&self) -> Result<(Box<dyn Connection>, ConnectionMetadata), DriverError> {
        let conn = self.driver.connect(&self.target).await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(conn_id = id, endpoint = %self.target, "opened connection");
        Ok((conn, ConnectionMetadata::new(id)))
    }

    async fn close_connection(&self, mut conn: Box<dyn Connection>, mut meta: ConnectionMetadata) {
        if let Err(e) = conn.close().await {
            tracing::debug!(conn_id = meta.id, error = %e, "error while closing connection");
        }
        meta.mark_closed();
        tracing::debug!(conn_id = meta.id, checkouts = meta.checkout_count, "closed connection");
    }

    /// Take back a checked-out connection.
    ///
    /// Returns the connection if it has to be closed instead of recycled.
    fn check_in(
        &self,
        conn: Box<dyn Connection>,
        mut meta: ConnectionMetadata,
        reusable: bool,
    ) -> Option<(Box<dyn Connection>, ConnectionMetadata)> {
        let is_open = reusable && conn.is_open();
        let mut state = self.state.lock();
        state.in_use -= 1;

        let reason = if state.is_disposed() {
            Some("pool disposed")
        } else if !reusable {
            Some("connection marked not reusable")
        } else if !is_open {
            Some("connection reports closed")
        } else if state.idle.len() >= self.config.max_connections as usize {
            Some("idle set full")
        } else {
            None
        };

        match reason {
            None => {
                meta.mark_checkin();
                state.idle.push_back(IdleConnection { conn, meta });
                None
            }
            Some(reason) => {
                state.open -= 1;
                drop(state);
                tracing::debug!(conn_id = meta.id, reason, "discarding returned connection");
                Some((conn, meta))
            }
        }
    }

    /// Mark the pool disposed and take the idle set.
    ///
    /// Returns `None` if the pool was already disposed.
    fn shut_down(&self) -> Option<Vec<IdleConnection>> {
        let idle = {
            let mut state = self.state.lock();
            if state.is_disposed() {
                return None;
            }
            state.lifecycle = Lifecycle::Disposed;
            let idle: Vec<IdleConnection> = state.idle.drain(..).collect();
            state.open -= idle.len() as u32;
            idle
        };
        self.cancel.cancel();
        self.semaphore.close();
        Some(idle)
    }

    async fn maintain(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();
        self.sweep(&mut report).await;
        self.top_up(&mut report).await;

        if report.is_noop() {
            tracing::trace!("maintenance pass found nothing to do");
        } else {
            tracing::debug!(
                opened = report.opened,
                revived = report.revived,
                discarded = report.discarded,
                open_failures = report.open_failures,
                "maintenance pass complete"
            );
        }
        report
    }

    /// Revalidate a snapshot of the idle set outside the lock.
    ///
    /// Each snapshot entry holds a permit while it is out of the idle set, so
    /// concurrent acquirers cannot open past `max_connections` meanwhile.
    /// Healthy entries go back, freeing their permits, before any stale entry
    /// is reopened.
    async fn sweep(&self, report: &mut MaintenanceReport) {
        let snapshot = {
            let mut state = self.state.lock();
            if state.is_disposed() {
                return;
            }
            let mut snapshot = Vec::with_capacity(state.idle.len());
            while !state.idle.is_empty() {
                let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                    break;
                };
                if let Some(entry) = state.idle.pop_front() {
                    snapshot.push((entry, permit));
                }
            }
            snapshot
        };

        let mut stale = Vec::new();
        for (mut entry, permit) in snapshot {
            entry.meta.mark_validating();
            if entry.conn.is_open() {
                entry.meta.mark_validated();
                self.restore_idle(entry).await;
                drop(permit);
            } else {
                stale.push((entry, permit));
            }
        }

        for (mut entry, permit) in stale {
            match entry.conn.open().await {
                Ok(()) => {
                    tracing::debug!(conn_id = entry.meta.id, "reopened stale idle connection");
                    entry.meta.mark_validated();
                    report.revived += 1;
                    self.restore_idle(entry).await;
                }
                Err(e) => {
                    tracing::warn!(
                        conn_id = entry.meta.id,
                        error = %e,
                        "discarding idle connection that could not be reopened"
                    );
                    report.discarded += 1;
                    self.state.lock().open -= 1;
                    self.close_connection(entry.conn, entry.meta).await;
                }
            }
            drop(permit);
        }
    }

    /// Put a swept connection back in the idle set, or close it if the pool
    /// was disposed meanwhile.
    async fn restore_idle(&self, mut entry: IdleConnection) {
        let rejected = {
            let mut state = self.state.lock();
            if state.is_disposed() {
                state.open -= 1;
                Some(entry)
            } else {
                entry.meta.mark_checkin();
                state.idle.push_back(entry);
                None
            }
        };
        if let Some(entry) = rejected {
            self.close_connection(entry.conn, entry.meta).await;
        }
    }

    /// Open connections until `min_connections` are open.
    async fn top_up(&self, report: &mut MaintenanceReport) {
        loop {
            let (reservation, permit) = {
                let mut state = self.state.lock();
                if state.is_disposed() || state.open >= self.config.min_connections {
                    return;
                }
                let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                    return;
                };
                state.open += 1;
                (
                    SlotReservation {
                        state: &self.state,
                        armed: true,
                    },
                    permit,
                )
            };

            match self.open_connection().await {
                Ok((conn, meta)) => {
                    let rejected = {
                        let mut state = self.state.lock();
                        if state.is_disposed() {
                            Some((conn, meta))
                        } else {
                            state.idle.push_back(IdleConnection { conn, meta });
                            None
                        }
                    };
                    match rejected {
                        Some((conn, meta)) => {
                            self.close_connection(conn, meta).await;
                            drop(reservation);
                            return;
                        }
                        None => {
                            reservation.commit();
                            report.opened += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        endpoint = %self.target,
                        error = %e,
                        "maintenance could not open connection; retrying next pass"
                    );
                    report.open_failures += 1;
                    return;
                }
            }
            drop(permit);
        }
    }
}

fn spawn_maintenance(inner: &Arc<PoolInner>) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let cancel = inner.cancel.clone();
    let period = inner.config.maintenance_interval;

    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(inner) = weak.upgrade() else {
                break;
            };
            inner.maintain().await;
        }

        tracing::debug!("maintenance task stopped");
    })
}

/// Undoes an `open` count if the connection it reserved never materializes.
struct SlotReservation<'a> {
    state: &'a Mutex<PoolState>,
    armed: bool,
}

impl SlotReservation<'_> {
    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.lock().open -= 1;
        }
    }
}

struct WaitingGuard<'a>(&'a AtomicU32);

impl<'a> WaitingGuard<'a> {
    fn new(counter: &'a AtomicU32) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub idle: u32,
    /// Number of connections currently checked out.
    pub in_use: u32,
    /// Number of open connections, including ones being opened or
    /// revalidated.
    pub open: u32,
    /// Number of callers waiting for a permit.
    pub waiting: u32,
    /// Maximum allowed connections.
    pub max: u32,
}

impl PoolStatus {
    /// Share of `max` currently checked out, as a percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.in_use as f64 / self.max as f64) * 100.0
    }
}

/// A connection checked out from the pool.
///
/// Dereferences to the driver's [`Connection`]. When dropped, the connection
/// is returned to the pool (or closed on a background task if it cannot be
/// recycled). [`release`](PooledConnection::release) does the same but waits
/// for any close to finish.
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    meta: ConnectionMetadata,
    pool: Arc<PoolInner>,
    permit: Option<OwnedSemaphorePermit>,
    reusable: bool,
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("meta", &self.meta)
            .field("reusable", &self.reusable)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    /// Metadata for this connection.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.meta
    }

    /// How long this connection has been checked out.
    #[must_use]
    pub fn checked_out_for(&self) -> Duration {
        self.meta.last_used_at.elapsed()
    }

    /// Set whether the connection may go back to the idle set.
    ///
    /// A connection marked not reusable is closed when it is returned, with
    /// its permit held until the close completes. Use this while the session
    /// is in a state the next borrower must not see, such as an open
    /// transaction.
    pub fn set_reusable(&mut self, reusable: bool) {
        self.reusable = reusable;
    }

    /// Check if the connection will be recycled when returned.
    #[must_use]
    pub fn is_reusable(&self) -> bool {
        self.reusable
    }

    /// Return the connection to its pool, closing it first if it cannot be
    /// recycled.
    pub async fn release(mut self) {
        if let Some((conn, meta, permit)) = self.take_for_return() {
            self.pool.close_connection(conn, meta).await;
            drop(permit);
        }
    }

    /// Detach the connection from the pool.
    ///
    /// The pool forgets the connection and frees its permit; the caller
    /// becomes responsible for closing it.
    #[must_use]
    pub fn detach(mut self) -> Option<Box<dyn Connection>> {
        let conn = self.conn.take()?;
        {
            let mut state = self.pool.state.lock();
            state.in_use -= 1;
            state.open -= 1;
        }
        self.permit.take();
        tracing::debug!(conn_id = self.meta.id, "connection detached from pool");
        Some(conn)
    }

    /// Check the connection back in. Returns what still has to be closed,
    /// together with the permit that must outlive the close.
    fn take_for_return(
        &mut self,
    ) -> Option<(Box<dyn Connection>, ConnectionMetadata, OwnedSemaphorePermit)> {
        let conn = self.conn.take()?;
        tracing::trace!(conn_id = self.meta.id, "returning connection to pool");
        let permit = self.permit.take();
        let leftover = self.pool.check_in(conn, self.meta.clone(), self.reusable);
        match (leftover, permit) {
            (Some((conn, meta)), Some(permit)) => Some((conn, meta, permit)),
            _ => None,
        }
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    #[allow(clippy::expect_used)] // only None after release/detach, which consume self
    fn deref(&self) -> &Self::Target {
        self.conn.as_deref().expect("connection already returned")
    }
}

impl DerefMut for PooledConnection {
    #[allow(clippy::expect_used)] // only None after release/detach, which consume self
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_deref_mut().expect("connection already returned")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some((conn, meta, permit)) = self.take_for_return() else {
            return;
        };
        let pool = Arc::clone(&self.pool);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    pool.close_connection(conn, meta).await;
                    drop(permit);
                });
            }
            Err(_) => {
                tracing::debug!(conn_id = meta.id, "no runtime available; dropping connection without close");
            }
        }
    }
}

/// Builder for [`Pool`].
#[derive(Default)]
pub struct PoolBuilder {
    driver: Option<Arc<dyn Driver>>,
    target: Option<String>,
    config: PoolConfig,
}

impl fmt::Debug for PoolBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("driver", &self.driver.as_ref().map(|d| d.name()))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PoolBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the driver.
    #[must_use]
    pub fn driver<D: Driver>(mut self, driver: D) -> Self {
        self.driver = Some(Arc::new(driver));
        self
    }

    /// Set a driver shared with other pools.
    #[must_use]
    pub fn shared_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the connection target string.
    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Replace the whole pool configuration.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.config.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the acquire timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquire_timeout = Some(timeout);
        self
    }

    /// Set the maintenance interval.
    #[must_use]
    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.config.maintenance_interval = interval;
        self
    }

    /// Build the pool.
    ///
    /// # Errors
    ///
    /// [`PoolError::Configuration`] if no driver or target was given or the
    /// target does not parse, plus everything [`Pool::new`] returns.
    pub async fn build(self) -> Result<Pool, PoolError> {
        let driver = self
            .driver
            .ok_or_else(|| PoolError::Configuration("no driver configured".into()))?;
        let target = self
            .target
            .ok_or_else(|| PoolError::Configuration("no connection target configured".into()))?;
        let target = ConnectionTarget::parse(&target)
            .map_err(|e| PoolError::Configuration(e.to_string()))?;

        Pool::new(driver, target, self.config).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sqlpool_testing::{MOCK_TARGET, MockDriver};

    async fn pool(driver: &MockDriver, min: u32, max: u32) -> Pool {
        Pool::builder()
            .driver(driver.clone())
            .target(MOCK_TARGET)
            .min_connections(min)
            .max_connections(max)
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_reservation_rolls_back_on_drop() {
        let driver = MockDriver::new();
        let pool = pool(&driver, 0, 2).await;

        {
            let _reservation = pool.inner.reserve().unwrap();
            assert_eq!(pool.status().open, 1);
        }
        assert_eq!(pool.status().open, 0);

        pool.inner.reserve().unwrap().commit();
        assert_eq!(pool.status().open, 1);
    }

    #[tokio::test]
    async fn test_waiting_guard_counts() {
        let counter = AtomicU32::new(0);
        {
            let _a = WaitingGuard::new(&counter);
            let _b = WaitingGuard::new(&counter);
            assert_eq!(counter.load(Ordering::SeqCst), 2);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_check_in_discards_closed_connection() {
        let driver = MockDriver::new();
        let pool = pool(&driver, 0, 2).await;

        let conn = pool.get().await.unwrap();
        driver.sever(1);
        pool.release(conn).await.unwrap();

        let status = pool.status();
        assert_eq!(status.idle, 0);
        assert_eq!(status.open, 0);
        assert!(driver.was_closed(1));
    }

    #[tokio::test]
    async fn test_check_in_discards_connection_marked_not_reusable() {
        let driver = MockDriver::new();
        let pool = pool(&driver, 0, 2).await;

        let mut conn = pool.get().await.unwrap();
        conn.set_reusable(false);
        assert!(!conn.is_reusable());
        pool.release(conn).await.unwrap();

        let status = pool.status();
        assert_eq!(status.idle, 0);
        assert_eq!(status.open, 0);
        assert_eq!(status.in_use, 0);
        assert!(driver.was_closed(1));
        assert!(pool.try_acquire().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_builder_requires_driver_and_target() {
        let err = Pool::builder().target(MOCK_TARGET).build().await.unwrap_err();
        assert!(matches!(err, PoolError::Configuration(_)));

        let err = Pool::builder()
            .driver(MockDriver::new())
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Configuration(_)));

        let err = Pool::builder()
            .driver(MockDriver::new())
            .target("")
            .build()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
