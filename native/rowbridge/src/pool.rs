/// Bounded connection pooling
///
/// A `ConnectionPool` holds up to `capacity` physical connections for one
/// (endpoint, credentials) key. Acquirers take an idle member, dial a new one
/// while below capacity, or queue FIFO until a release or their timeout.
/// Released connections go back to the pool with their session intact; they are
/// closed only when the pool is disposed.
///
/// Membership, the idle list and the wait queue live behind one mutex, so every
/// change to them is atomic. Dialing happens outside the lock against a slot
/// reserved beforehand.
///
/// `PoolRegistry` maps keys to pools. A pool is created on the first acquire
/// for its key and torn down by an explicit `dispose`.
use std::borrow::{Borrow, BorrowMut};
use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use crate::connection::Connection;
use crate::error::{DriverError, Result};
use crate::models::{Credentials, DriverOptions, Endpoint, PoolConfig, PoolKey};
use crate::transport::Dialer;
use crate::utils::{lock_ignoring_poison, safe_lock};

#[derive(Default)]
struct PoolState {
    idle: VecDeque<Connection>,
    /// Members in any state, including slots reserved for an in-flight dial.
    size: usize,
    /// Tickets of blocked acquirers, oldest first.
    waiters: VecDeque<u64>,
    next_ticket: u64,
    /// Connections released straight to a waiting ticket.
    handoffs: HashMap<u64, Connection>,
    disposed: bool,
}

impl PoolState {
    fn remove_waiter(&mut self, ticket: u64) {
        self.waiters.retain(|t| *t != ticket);
    }
}

pub struct ConnectionPool {
    key: PoolKey,
    config: PoolConfig,
    dialer: Arc<dyn Dialer>,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("endpoint", &self.key.endpoint)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    pub fn new(key: PoolKey, config: PoolConfig, dialer: Arc<dyn Dialer>) -> Arc<Self> {
        Arc::new(ConnectionPool {
            key,
            config,
            dialer,
            state: Mutex::new(PoolState::default()),
            available: Condvar::new(),
        })
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Acquire with the pool's configured admission timeout.
    pub fn acquire(self: &Arc<Self>) -> Result<PooledConnection> {
        self.acquire_timeout(self.config.admission_timeout)
    }

    /// Acquire a connection, waiting at most `timeout` for one to free up.
    ///
    /// Raises `LockTimeout` when the wait expires and `Closed` if the pool is
    /// disposed meanwhile. Dial failures surface unchanged. A timeout too large
    /// to express as an instant waits without a deadline.
    pub fn acquire_timeout(self: &Arc<Self>, timeout: Duration) -> Result<PooledConnection> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = safe_lock(&self.state, "acquire pool state")?;
        if state.disposed {
            return Err(DriverError::Closed("connection pool"));
        }

        // Queue-jumping is only allowed when nobody is waiting
        if state.waiters.is_empty() {
            if let Some(conn) = state.idle.pop_front() {
                tracing::debug!(conn_id = conn.id(), "reusing idle connection");
                return Ok(self.lend(conn));
            }
            if state.size < self.config.capacity() {
                state.size += 1;
                drop(state);
                return self.dial_member();
            }
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiters.push_back(ticket);
        tracing::debug!(ticket, waiting = state.waiters.len(), "pool exhausted, waiting");

        loop {
            if let Some(conn) = state.handoffs.remove(&ticket) {
                tracing::debug!(ticket, conn_id = conn.id(), "received released connection");
                return Ok(self.lend(conn));
            }
            if state.disposed {
                state.remove_waiter(ticket);
                return Err(DriverError::Closed("connection pool"));
            }
            // A slot can free up without a handoff when a dial fails
            if state.waiters.front() == Some(&ticket) {
                if let Some(conn) = state.idle.pop_front() {
                    state.waiters.pop_front();
                    drop(state);
                    self.available.notify_all();
                    return Ok(self.lend(conn));
                }
                if state.size < self.config.capacity() {
                    state.waiters.pop_front();
                    state.size += 1;
                    drop(state);
                    self.available.notify_all();
                    return self.dial_member();
                }
            }

            let Some(deadline) = deadline else {
                state = self
                    .available
                    .wait(state)
                    .map_err(|e| DriverError::Internal(format!("pool wait poisoned: {e}")))?;
                continue;
            };
            let now = Instant::now();
            if now >= deadline {
                state.remove_waiter(ticket);
                drop(state);
                self.available.notify_all();
                tracing::warn!(
                    endpoint = %self.key.endpoint,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "timed out waiting for a pooled connection"
                );
                return Err(DriverError::LockTimeout(timeout));
            }
            let (guard, _) = self
                .available
                .wait_timeout(state, deadline - now)
                .map_err(|e| DriverError::Internal(format!("pool wait poisoned: {e}")))?;
            state = guard;
        }
    }

    fn lend(self: &Arc<Self>, conn: Connection) -> PooledConnection {
        PooledConnection {
            conn: Some(conn),
            pool: Arc::downgrade(self),
        }
    }

    /// Dial into a slot already counted in `size`; the slot is given back on failure.
    fn dial_member(self: &Arc<Self>) -> Result<PooledConnection> {
        match Connection::open(self.dialer.as_ref(), &self.key.endpoint, &self.key.credentials) {
            Ok(conn) => Ok(self.lend(conn)),
            Err(err) => {
                lock_ignoring_poison(&self.state).size -= 1;
                self.available.notify_all();
                tracing::warn!(endpoint = %self.key.endpoint, error = %err, "dial failed");
                Err(err)
            }
        }
    }

    /// Take a connection back. Never fails.
    fn release(&self, mut conn: Connection) {
        conn.reset();
        let mut state = lock_ignoring_poison(&self.state);

        if state.disposed || conn.is_closed() {
            state.size -= 1;
            drop(state);
            self.available.notify_all();
            if let Err(err) = conn.close() {
                tracing::warn!(conn_id = conn.id(), error = %err, "failed to close released connection");
            }
            return;
        }

        match state.waiters.pop_front() {
            Some(ticket) => {
                tracing::debug!(ticket, conn_id = conn.id(), "handing released connection to waiter");
                state.handoffs.insert(ticket, conn);
                drop(state);
                self.available.notify_all();
            }
            None => {
                tracing::debug!(conn_id = conn.id(), "connection returned to pool");
                state.idle.push_back(conn);
            }
        }
    }

    /// Members in any state.
    pub fn size(&self) -> usize {
        lock_ignoring_poison(&self.state).size
    }

    pub fn idle_count(&self) -> usize {
        lock_ignoring_poison(&self.state).idle.len()
    }

    pub fn in_use_count(&self) -> usize {
        let state = lock_ignoring_poison(&self.state);
        state.size - state.idle.len() - state.handoffs.len()
    }

    pub fn waiting_count(&self) -> usize {
        lock_ignoring_poison(&self.state).waiters.len()
    }

    pub fn is_disposed(&self) -> bool {
        lock_ignoring_poison(&self.state).disposed
    }

    /// Close idle members and fail current waiters. Connections still lent out
    /// are closed when they come back. Disposing twice is a no-op.
    pub fn dispose(&self) {
        let idle: Vec<Connection> = {
            let mut state: MutexGuard<'_, PoolState> = lock_ignoring_poison(&self.state);
            if state.disposed {
                return;
            }
            state.disposed = true;
            let idle: Vec<Connection> = state.idle.drain(..).collect();
            state.size -= idle.len();
            idle
        };
        self.available.notify_all();

        tracing::info!(endpoint = %self.key.endpoint, closing = idle.len(), "disposing connection pool");
        for mut conn in idle {
            if let Err(err) = conn.close() {
                tracing::warn!(conn_id = conn.id(), error = %err, "failed to close pooled connection");
            }
        }
    }
}

/// A connection lent out by a pool.
///
/// Dereferences to `Connection`. Dropping it, or calling `release`, returns it
/// to the pool; if the pool is gone the connection is closed.
pub struct PooledConnection {
    /// Present until the value is dropped.
    conn: Option<Connection>,
    pool: Weak<ConnectionPool>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PooledConnection").field(&self.conn).finish()
    }
}

impl PooledConnection {
    pub fn release(self) {
        drop(self);
    }
}

#[allow(clippy::expect_used)]
impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("pooled connection used after release")
    }
}

#[allow(clippy::expect_used)]
impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("pooled connection used after release")
    }
}

impl Borrow<Connection> for PooledConnection {
    fn borrow(&self) -> &Connection {
        self
    }
}

impl BorrowMut<Connection> for PooledConnection {
    fn borrow_mut(&mut self) -> &mut Connection {
        self
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        match self.pool.upgrade() {
            Some(pool) => pool.release(conn),
            // Connection's own Drop closes the physical handle
            None => drop(conn),
        }
    }
}

/// Process-wide set of pools, one per (endpoint, credentials) key.
pub struct PoolRegistry {
    config: PoolConfig,
    dialer: Arc<dyn Dialer>,
    pools: Mutex<HashMap<PoolKey, Arc<ConnectionPool>>>,
}

impl PoolRegistry {
    pub fn new(config: PoolConfig, dialer: Arc<dyn Dialer>) -> Self {
        PoolRegistry {
            config,
            dialer,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Pool for the key, created with the registry's config on first use.
    pub fn pool(&self, endpoint: &Endpoint, credentials: &Credentials) -> Result<Arc<ConnectionPool>> {
        self.pool_with(PoolKey::new(endpoint.clone(), credentials.clone()), self.config)
    }

    fn pool_with(&self, key: PoolKey, config: PoolConfig) -> Result<Arc<ConnectionPool>> {
        let mut pools = safe_lock(&self.pools, "registry pools")?;
        let pool = pools.entry(key).or_insert_with_key(|key| {
            tracing::info!(endpoint = %key.endpoint, capacity = config.capacity(), "creating connection pool");
            ConnectionPool::new(key.clone(), config, Arc::clone(&self.dialer))
        });
        Ok(Arc::clone(pool))
    }

    pub fn acquire(&self, endpoint: &Endpoint, credentials: &Credentials) -> Result<PooledConnection> {
        self.pool(endpoint, credentials)?.acquire()
    }

    pub fn acquire_timeout(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<PooledConnection> {
        self.pool(endpoint, credentials)?.acquire_timeout(timeout)
    }

    /// Acquire using decoded keyword options. A pool created by this call takes
    /// its capacity and timeout from the options.
    pub fn acquire_with_options(&self, options: &DriverOptions) -> Result<PooledConnection> {
        let key = PoolKey::new(options.endpoint()?, options.credentials());
        self.pool_with(key, options.pool_config())?.acquire()
    }

    pub fn get(&self, key: &PoolKey) -> Option<Arc<ConnectionPool>> {
        lock_ignoring_poison(&self.pools).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        lock_ignoring_poison(&self.pools).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispose and forget the pool for `key`. Returns whether one existed.
    pub fn dispose(&self, key: &PoolKey) -> bool {
        let removed = lock_ignoring_poison(&self.pools).remove(key);
        match removed {
            Some(pool) => {
                pool.dispose();
                true
            }
            None => false,
        }
    }

    pub fn dispose_all(&self) {
        let pools: Vec<Arc<ConnectionPool>> = lock_ignoring_poison(&self.pools)
            .drain()
            .map(|(_, pool)| pool)
            .collect();
        for pool in pools {
            pool.dispose();
        }
    }
}

impl Drop for PoolRegistry {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
