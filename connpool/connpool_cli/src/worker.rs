//! Client workers that borrow a connection, run a query and give it back.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use connpool_core::{ConnectionPool, PoolError, Resource, ResourceError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{error, info};

use crate::config::AppConfig;

/// Why a client did not complete its work
#[derive(Debug, Error)]
pub enum WorkerError {
    /// No connection was obtained from the pool
    #[error("failed to acquire connection: {0}")]
    Acquire(#[from] PoolError),

    /// The connection refused the query
    #[error("query failed: {0}")]
    Query(#[from] ResourceError),
}

/// A single client run against the shared pool
pub struct ClientWorker {
    client_id: usize,
    pool: Arc<ConnectionPool>,
    acquire_timeout: Duration,
    work_ms: RangeInclusive<u64>,
}

impl ClientWorker {
    /// Create a worker using the timeouts and query range from `config`
    pub fn new(client_id: usize, pool: Arc<ConnectionPool>, config: &AppConfig) -> Self {
        Self {
            client_id,
            pool,
            acquire_timeout: config.acquire_timeout(),
            work_ms: config.query_time_min_ms..=config.query_time_max_ms,
        }
    }

    /// Run the client, returning whether it completed its query.
    pub fn run(&self) -> bool {
        match self.try_run() {
            Ok(()) => true,
            Err(e) => {
                error!(client_id = self.client_id, "client failed: {}", e);
                false
            }
        }
    }

    /// Acquire a connection, run one query on it, hold it for a random time.
    ///
    /// The connection goes back to the pool when the guard drops, on success
    /// and on every error path.
    pub fn try_run(&self) -> Result<(), WorkerError> {
        let connection = self.pool.acquire(self.acquire_timeout)?;

        // Seeded per client so concurrent clients never share generator state.
        let mut rng = StdRng::from_os_rng();
        let work = Duration::from_millis(rng.random_range(self.work_ms.clone()));

        connection.perform_work(&format!(
            "SELECT * FROM orders WHERE client_id = {}",
            self.client_id
        ))?;
        thread::sleep(work);

        info!(
            client_id = self.client_id,
            connection = connection.id(),
            work_ms = work.as_millis() as u64,
            "client finished work"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn config(pool_size: usize, timeout_ms: u64, min_ms: u64, max_ms: u64) -> AppConfig {
        AppConfig {
            pool_size,
            clients_count: 1,
            acquire_timeout_ms: timeout_ms,
            query_time_min_ms: min_ms,
            query_time_max_ms: max_ms,
        }
    }

    #[test]
    fn test_worker_succeeds_and_returns_connection() {
        let cfg = config(1, 100, 5, 10);
        let pool = ConnectionPool::new(cfg.pool_size);
        let worker = ClientWorker::new(1, Arc::clone(&pool), &cfg);

        let start = Instant::now();
        assert!(worker.run());
        assert!(start.elapsed() >= Duration::from_millis(5));
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_worker_reports_timeout() {
        let cfg = config(1, 20, 0, 0);
        let pool = ConnectionPool::new(cfg.pool_size);
        let _held = pool.acquire(Duration::ZERO).unwrap();
        let worker = ClientWorker::new(2, Arc::clone(&pool), &cfg);

        assert!(matches!(
            worker.try_run(),
            Err(WorkerError::Acquire(PoolError::AcquireTimeout(_)))
        ));
        assert!(!worker.run());
    }

    #[test]
    fn test_worker_fails_on_closed_pool() {
        let cfg = config(2, 1000, 0, 0);
        let pool = ConnectionPool::new(cfg.pool_size);
        pool.shutdown();

        let worker = ClientWorker::new(3, Arc::clone(&pool), &cfg);
        assert!(matches!(
            worker.try_run(),
            Err(WorkerError::Acquire(PoolError::PoolClosed))
        ));
    }
}
