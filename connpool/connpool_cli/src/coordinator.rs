//! Runs a batch of clients against one pool and reports how it went.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use connpool_core::ConnectionPool;
use crossbeam_channel::{unbounded, RecvTimeoutError};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::executor::ThreadPool;
use crate::worker::ClientWorker;

/// Knobs that are not part of the configuration file
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// How long to wait for all clients before reporting
    pub deadline: Duration,

    /// Upper bound on client threads; defaults to the CPU count
    pub max_threads: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(30),
            max_threads: num_cpus::get(),
        }
    }
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Whether every client reported before the deadline
    pub finished: bool,

    /// Clients that completed their query
    pub succeeded: usize,

    /// Clients launched
    pub total: usize,

    /// Free connections after the clients were done, before shutdown
    pub free_connections: usize,

    /// Acquisitions that timed out during the run
    pub acquire_timeouts: u64,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Finished={}. Success={}/{}. Free connections={}",
            self.finished, self.succeeded, self.total, self.free_connections
        )
    }
}

/// Build the pool, run every client, wait for them within the deadline,
/// then shut the pool down.
///
/// Clients that fail or do not report in time count as unsuccessful; that is
/// an expected outcome, not an error.
pub fn run(config: &AppConfig, options: &RunOptions) -> Result<RunReport> {
    let pool = ConnectionPool::new(config.pool_size);

    let threads = config.clients_count.min(options.max_threads).max(1);
    let executor =
        ThreadPool::new(threads, "client").context("failed to start client threads")?;

    run_on(pool, executor, config, options)
}

/// Drive the clients on an existing pool and executor. Both are shut down
/// before returning, on success and on error.
fn run_on(
    pool: Arc<ConnectionPool>,
    executor: ThreadPool,
    config: &AppConfig,
    options: &RunOptions,
) -> Result<RunReport> {
    let result = collect_results(&pool, &executor, config, options);

    let report = result.map(|(reported, succeeded)| {
        let stats = pool.stats();
        let report = RunReport {
            finished: reported == config.clients_count,
            succeeded,
            total: config.clients_count,
            free_connections: stats.free,
            acquire_timeouts: stats.timeouts_total,
        };
        info!("{}", report);
        report
    });

    pool.shutdown();
    executor.shutdown_and_join();

    report
}

/// Submit every client and count `(reported, succeeded)` until all clients
/// reported or the deadline elapsed.
fn collect_results(
    pool: &Arc<ConnectionPool>,
    executor: &ThreadPool,
    config: &AppConfig,
    options: &RunOptions,
) -> Result<(usize, usize)> {
    let (result_tx, result_rx) = unbounded::<bool>();
    for client_id in 1..=config.clients_count {
        let worker = ClientWorker::new(client_id, Arc::clone(pool), config);
        let result_tx = result_tx.clone();
        executor
            .execute(move || {
                // A panicking worker never sends and counts as a failure.
                let _ = result_tx.send(worker.run());
            })
            .with_context(|| format!("failed to submit client {}", client_id))?;
    }
    drop(result_tx);

    // A deadline too far out for `Instant` means waiting for every client.
    let deadline = Instant::now().checked_add(options.deadline);
    let mut reported = 0;
    let mut succeeded = 0;
    while reported < config.clients_count {
        let received = match deadline {
            Some(deadline) => result_rx.recv_deadline(deadline),
            None => result_rx
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(ok) => {
                reported += 1;
                if ok {
                    succeeded += 1;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    missing = config.clients_count - reported,
                    "deadline elapsed before all clients reported"
                );
                break;
            }
            // Every sender is gone, so the remaining clients panicked.
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok((reported, succeeded))
}
