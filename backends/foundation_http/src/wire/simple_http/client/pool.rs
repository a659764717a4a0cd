//! Connection pooling for HTTP client.
//!
//! WHY: Connection pooling improves performance by reusing TCP connections across
//! multiple HTTP requests to the same target.
//!
//! WHAT: A lightweight, safe connection pool implemented with Arc<Mutex<...>>.
//! The pool stores connections per `TargetConfig` and exposes `checkout`/`checkin`,
//! plus maintenance helpers `cleanup_stale` and `clear`. `PooledTransport`
//! puts the pool in front of a `Connector`.

use crate::wire::simple_http::client::{
    Connection, Connector, HttpClientError, PoolConfig, TargetConfig, Transport,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Entry stored in per-target queue: (`last_used_instant`, connection)
type PooledEntry = (Instant, Box<dyn Connection>);

/// Connection pool for reusing HTTP connections.
///
/// WHY: Reusing connections avoids TCP handshake overhead for multiple requests
/// to the same server.
///
/// WHAT: A simple thread-safe pool keyed by target storing a `VecDeque` of
/// `PooledEntry`. The pool enforces `max_per_host` limit and expires entries
/// older than `max_idle_time` on checkout/cleanup. Evicted connections are
/// closed.
pub struct ConnectionPool {
    // Max connections to retain per target
    pub max_per_host: usize,
    // Maximum idle lifetime for pooled connections
    pub max_idle_time: Duration,
    inner: Arc<Mutex<HashMap<TargetConfig, VecDeque<PooledEntry>>>>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.lock() {
            Ok(map) => {
                let pools: Vec<(String, usize)> = map
                    .iter()
                    .map(|(target, q)| (target.to_string(), q.len()))
                    .collect();

                f.debug_struct("ConnectionPool")
                    .field("max_per_host", &self.max_per_host)
                    .field("max_idle_time", &self.max_idle_time)
                    .field("pools", &pools)
                    .finish()
            }
            Err(_) => f
                .debug_struct("ConnectionPool")
                .field("max_per_host", &self.max_per_host)
                .field("max_idle_time", &self.max_idle_time)
                .field("pools", &"<poisoned>")
                .finish(),
        }
    }
}

const MAX_PER_HOST: usize = 5;
const MAX_IDLE_TIME: Duration = Duration::from_secs(300);

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(MAX_PER_HOST, MAX_IDLE_TIME)
    }
}

fn discard(mut entry: PooledEntry) {
    entry.1.close_socket_and_streams();
}

impl ConnectionPool {
    /// Creates a new connection pool.
    ///
    /// # Arguments
    ///
    /// * `max_per_host` - Maximum connections to pool per target
    /// * `max_idle_time` - Maximum time a connection can be idle before cleanup
    #[must_use]
    pub fn new(max_per_host: usize, max_idle_time: Duration) -> Self {
        Self {
            max_per_host,
            max_idle_time,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Attempts to checkout a pooled connection for `target`.
    ///
    /// Removes and returns the most-recently-added connection that is not
    /// stale. Stale connections met on the way are closed.
    #[must_use]
    pub fn checkout(&self, target: &TargetConfig) -> Option<Box<dyn Connection>> {
        let now = Instant::now();

        let Ok(mut map) = self.inner.lock() else {
            return None;
        };

        let mut found = None;
        if let Some(queue) = map.get_mut(target) {
            // LIFO reuse
            while let Some(entry) = queue.pop_back() {
                if now.duration_since(entry.0) <= self.max_idle_time {
                    found = Some(entry.1);
                    break;
                }
                discard(entry);
            }
            if queue.is_empty() {
                map.remove(target);
            }
        }

        if found.is_some() {
            tracing::debug!("Reusing pooled connection for {target}");
        }
        found
    }

    /// Returns a connection to the pool.
    ///
    /// If the per-target queue exceeds `max_per_host`, the oldest entry is
    /// closed and dropped.
    pub fn checkin(&self, connection: Box<dyn Connection>) {
        let Ok(mut map) = self.inner.lock() else {
            let mut connection = connection;
            connection.close_socket_and_streams();
            return;
        };

        let target = connection.target().clone();
        tracing::debug!("Returning connection for {target} to pool");
        let queue = map.entry(target).or_default();
        queue.push_back((Instant::now(), connection));

        while queue.len() > self.max_per_host {
            if let Some(entry) = queue.pop_front() {
                discard(entry);
            }
        }
    }

    /// Closes connections older than `max_idle_time`.
    pub fn cleanup_stale(&self) {
        let now = Instant::now();
        let Ok(mut map) = self.inner.lock() else {
            return;
        };

        for queue in map.values_mut() {
            let mut fresh = VecDeque::with_capacity(queue.len());
            while let Some(entry) = queue.pop_front() {
                if now.duration_since(entry.0) <= self.max_idle_time {
                    fresh.push_back(entry);
                } else {
                    discard(entry);
                }
            }
            *queue = fresh;
        }
        map.retain(|_, queue| !queue.is_empty());
    }

    /// Number of idle connections held for `target`.
    #[must_use]
    pub fn idle_count(&self, target: &TargetConfig) -> usize {
        self.inner
            .lock()
            .map(|map| map.get(target).map_or(0, VecDeque::len))
            .unwrap_or(0)
    }

    /// Closes all pooled connections (useful for tests and shutdown).
    pub fn clear(&self) {
        if let Ok(mut map) = self.inner.lock() {
            for (_, queue) in map.drain() {
                queue.into_iter().for_each(discard);
            }
        }
    }
}

/// `Transport` that serves connections from a pool before opening new ones
/// through its connector.
pub struct PooledTransport<C: Connector> {
    connector: C,
    pool: Option<ConnectionPool>,
}

impl<C: Connector> PooledTransport<C> {
    /// Builds a transport; `config.enabled == false` closes every returned
    /// connection instead of pooling it.
    pub fn new(connector: C, config: &PoolConfig) -> Self {
        let pool = config
            .enabled
            .then(|| ConnectionPool::new(config.max_per_host, config.max_idle_time));
        Self { connector, pool }
    }

    #[must_use]
    pub fn pool(&self) -> Option<&ConnectionPool> {
        self.pool.as_ref()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}

impl<C: Connector> Transport for PooledTransport<C> {
    fn acquire(
        &self,
        target: &TargetConfig,
        connect_timeout: Option<Duration>,
    ) -> Result<Box<dyn Connection>, HttpClientError> {
        if let Some(connection) = self.pool.as_ref().and_then(|pool| pool.checkout(target)) {
            return Ok(connection);
        }
        tracing::debug!("Opening new connection to {target}");
        self.connector.connect(target, connect_timeout)
    }

    fn recycle(&self, mut connection: Box<dyn Connection>) {
        match &self.pool {
            Some(pool) => pool.checkin(connection),
            None => connection.close_socket_and_streams(),
        }
    }
}
