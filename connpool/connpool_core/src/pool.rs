//! Monitor-based pool of reusable resources.
//!
//! All pool state lives behind a single `parking_lot::Mutex`. Callers that find
//! the free queue empty park on one `Condvar` until a release, a shutdown or a
//! cancellation changes what they are waiting for. A release wakes exactly one
//! waiter; shutdown and cancellation wake all of them.
//!
//! `parking_lot` parks threads in FIFO order and its mutex is eventually fair,
//! so the longest waiting caller is the one woken by a release. A caller that
//! arrives while a resource is already free may still take it before the woken
//! waiter reacquires the lock; the woken waiter then re-checks and waits again
//! against its original deadline.

use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashSet, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::PoolError;
use crate::resource::{Connection, Resource};

/// A pool of simulated database connections
pub type ConnectionPool = Pool<Connection>;

/// Handle used to abandon a waiting `acquire_cancellable` call.
///
/// Cancel through [`Pool::cancel`] so the flag is published under the pool lock
/// and the waiter is woken.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether the token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of resources created at construction
    pub size: usize,

    /// Resources currently in the free queue
    pub free: usize,

    /// Resources handed out and not yet released
    pub in_use: usize,

    /// Callers currently parked in `acquire`
    pub waiting: usize,

    /// Whether the pool has been shut down
    pub closed: bool,

    /// Successful acquisitions since construction
    pub acquired_total: u64,

    /// Acquisitions that failed with a timeout
    pub timeouts_total: u64,
}

struct PoolState<R> {
    /// Free resources, longest idle at the front
    free: VecDeque<R>,
    closed: bool,
    /// Ids handed out and not yet released
    on_loan: HashSet<usize>,
    waiting: usize,
    acquired_total: u64,
    timeouts_total: u64,
}

/// A fixed-size pool of reusable resources
pub struct Pool<R: Resource> {
    state: Mutex<PoolState<R>>,

    /// Signalled when the free queue gains a resource, the pool closes or a
    /// waiter is cancelled
    available: Condvar,

    size: usize,
}

impl<R: Resource> Pool<R> {
    /// Create a pool holding `size` open resources with ids `1..=size`.
    ///
    /// Size validation belongs to the configuration layer; a pool of size zero
    /// is legal and every acquire on it times out.
    pub fn new(size: usize) -> Arc<Self> {
        let free: VecDeque<R> = (1..=size).map(R::create).collect();

        info!("ConnectionPool initialized. size={}", size);

        Arc::new(Self {
            state: Mutex::new(PoolState {
                free,
                closed: false,
                on_loan: HashSet::with_capacity(size),
                waiting: 0,
                acquired_total: 0,
                timeouts_total: 0,
            }),
            available: Condvar::new(),
            size,
        })
    }

    /// Number of resources the pool was created with
    pub fn size(&self) -> usize {
        self.size
    }

    /// Acquire a resource, waiting at most `timeout` for one to become free.
    ///
    /// A zero timeout fails immediately when nothing is free.
    pub fn acquire(self: &Arc<Self>, timeout: Duration) -> Result<PooledConnection<R>, PoolError> {
        let resource = self.take(timeout, None)?;
        Ok(PooledConnection::new(resource, self))
    }

    /// Acquire a resource like [`Pool::acquire`], giving up with
    /// [`PoolError::Cancelled`] once `token` is cancelled through [`Pool::cancel`].
    pub fn acquire_cancellable(
        self: &Arc<Self>,
        timeout: Duration,
        token: &CancelToken,
    ) -> Result<PooledConnection<R>, PoolError> {
        let resource = self.take(timeout, Some(token))?;
        Ok(PooledConnection::new(resource, self))
    }

    fn take(&self, timeout: Duration, token: Option<&CancelToken>) -> Result<R, PoolError> {
        // Absolute deadline so repeated wakeups never stretch the budget.
        // A timeout too large for `Instant` means no deadline at all.
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();

        loop {
            if state.closed {
                debug!("{} found the pool closed", caller());
                return Err(PoolError::PoolClosed);
            }

            if token.is_some_and(CancelToken::is_cancelled) {
                // This caller may have consumed the wakeup meant for a release.
                if !state.free.is_empty() {
                    self.available.notify_one();
                }
                debug!("{} cancelled while acquiring", caller());
                return Err(PoolError::Cancelled);
            }

            if let Some(resource) = state.free.pop_front() {
                state.on_loan.insert(resource.id());
                state.acquired_total += 1;
                info!("{} acquired connection #{}", caller(), resource.id());
                return Ok(resource);
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                state.timeouts_total += 1;
                debug!("{} timed out after {:?}", caller(), timeout);
                return Err(PoolError::AcquireTimeout(timeout));
            }

            info!("No free connections. {} is waiting...", caller());
            state.waiting += 1;
            match deadline {
                Some(deadline) => {
                    self.available.wait_until(&mut state, deadline);
                }
                None => self.available.wait(&mut state),
            }
            state.waiting -= 1;
        }
    }

    /// Return a resource to the pool.
    ///
    /// `None` is ignored. A resource whose id is not currently on loan from
    /// this pool is closed and dropped, so the free queue never outgrows the
    /// pool. A closed resource is dropped instead of being queued, and on a
    /// shut down pool the resource is closed and dropped. Otherwise it goes to
    /// the back of the free queue and one waiter is woken.
    pub fn release(&self, resource: Option<R>) {
        let Some(mut resource) = resource else {
            return;
        };

        let mut state = self.state.lock();
        if !state.on_loan.remove(&resource.id()) {
            warn!(
                "Connection #{} is not on loan from this pool, discarding it",
                resource.id()
            );
            resource.close();
            return;
        }

        if state.closed {
            resource.close();
            debug!(
                "{} returned connection #{} after shutdown, closed it",
                caller(),
                resource.id()
            );
            return;
        }

        if !resource.is_open() {
            warn!(
                "Connection #{} is closed, not returning to pool",
                resource.id()
            );
            return;
        }

        info!("{} released connection #{}", caller(), resource.id());
        state.free.push_back(resource);
        self.available.notify_one();
    }

    /// Cancel `token` and wake waiters so the owner of the token can bail out.
    pub fn cancel(&self, token: &CancelToken) {
        let _state = self.state.lock();
        token.cancelled.store(true, Ordering::Release);
        self.available.notify_all();
    }

    /// Number of resources currently free
    pub fn free_count(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Whether [`Pool::shutdown`] has been called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            size: self.size,
            free: state.free.len(),
            in_use: state.on_loan.len(),
            waiting: state.waiting,
            closed: state.closed,
            acquired_total: state.acquired_total,
            timeouts_total: state.timeouts_total,
        }
    }

    /// Shut the pool down.
    ///
    /// Closes every free resource and wakes all waiters, which then fail with
    /// [`PoolError::PoolClosed`]. Resources on loan are closed when released.
    /// Calling this again does nothing.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.closed {
            debug!("ConnectionPool already shut down");
            return;
        }

        info!("Shutting down connection pool...");
        state.closed = true;

        while let Some(mut resource) = state.free.pop_front() {
            resource.close();
        }

        self.available.notify_all();
        info!(
            "ConnectionPool shutdown completed ({} connections still on loan)",
            state.on_loan.len()
        );
    }
}

fn caller() -> String {
    thread::current()
        .name()
        .unwrap_or("<unnamed>")
        .to_string()
}

/// A resource on loan from a [`Pool`].
///
/// Dropping the handle releases the resource back to its pool. If the pool no
/// longer exists the resource is closed instead.
pub struct PooledConnection<R: Resource = Connection> {
    /// Always `Some` until the handle is consumed
    resource: Option<R>,

    pool: Weak<Pool<R>>,

    acquired_at: Instant,
}

impl<R: Resource> PooledConnection<R> {
    fn new(resource: R, pool: &Arc<Pool<R>>) -> Self {
        Self {
            resource: Some(resource),
            pool: Arc::downgrade(pool),
            acquired_at: Instant::now(),
        }
    }

    /// Time elapsed since the resource was acquired
    pub fn held_duration(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Release the resource now instead of at the end of scope
    pub fn return_to_pool(self) {
        drop(self);
    }

    /// Take the resource out of the handle.
    ///
    /// The pool keeps counting it as in use until it is handed back with
    /// [`Pool::release`].
    pub fn detach(mut self) -> R {
        self.resource.take().expect("pooled resource missing")
    }
}

impl<R: Resource> Deref for PooledConnection<R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.resource.as_ref().expect("pooled resource missing")
    }
}

impl<R: Resource> DerefMut for PooledConnection<R> {
    fn deref_mut(&mut self) -> &mut R {
        self.resource.as_mut().expect("pooled resource missing")
    }
}

impl<R: Resource> Drop for PooledConnection<R> {
    fn drop(&mut self) {
        let Some(mut resource) = self.resource.take() else {
            return;
        };

        match self.pool.upgrade() {
            Some(pool) => pool.release(Some(resource)),
            None => resource.close(),
        }
    }
}

impl<R: Resource + std::fmt::Debug> std::fmt::Debug for PooledConnection<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("resource", &self.resource)
            .field("held_for", &self.held_duration())
            .finish()
    }
}
