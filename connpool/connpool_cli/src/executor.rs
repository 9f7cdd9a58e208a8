//! Fixed-size thread pool that runs client workers.
//!
//! Tasks go through an unbounded channel to a fixed set of named threads. A
//! panicking task is caught and counted so it never takes its thread down.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, info};

/// Error when submitting a task to the thread pool
#[derive(Error, Debug)]
pub enum ThreadPoolError {
    /// The thread pool no longer accepts tasks
    #[error("thread pool is shutting down")]
    ShuttingDown,
}

/// Task counters for the thread pool
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThreadPoolStats {
    /// Tasks that ran to completion
    pub tasks_completed: usize,

    /// Tasks that panicked
    pub tasks_panicked: usize,
}

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Counters {
    completed: AtomicUsize,
    panicked: AtomicUsize,
}

/// A fixed-size pool of worker threads
pub struct ThreadPool {
    /// `None` once the pool stops accepting tasks
    task_sender: Option<Sender<Task>>,

    workers: Vec<JoinHandle<()>>,

    counters: Arc<Counters>,
}

impl ThreadPool {
    /// Spawn `threads` worker threads named `<name_prefix>-<n>`.
    pub fn new(threads: usize, name_prefix: &str) -> io::Result<Self> {
        let (task_sender, task_receiver) = unbounded::<Task>();
        let counters = Arc::new(Counters::default());

        info!(threads, "creating client thread pool");

        let workers = (0..threads.max(1))
            .map(|id| {
                let receiver = task_receiver.clone();
                let counters = Arc::clone(&counters);
                thread::Builder::new()
                    .name(format!("{}-{}", name_prefix, id + 1))
                    .spawn(move || Self::worker_loop(id + 1, receiver, counters))
            })
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self {
            task_sender: Some(task_sender),
            workers,
            counters,
        })
    }

    /// Worker thread main loop; ends when the channel is closed and drained
    fn worker_loop(id: usize, receiver: Receiver<Task>, counters: Arc<Counters>) {
        debug!(worker = id, "worker starting");

        for task in receiver.iter() {
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
                Ok(()) => {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    error!(
                        worker = id,
                        "task panicked: {:?}",
                        e.downcast_ref::<&str>().unwrap_or(&"<unknown panic>")
                    );
                    counters.panicked.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        debug!(worker = id, "worker shutting down");
    }

    /// Submit a task to be executed by the thread pool
    pub fn execute<F>(&self, f: F) -> Result<(), ThreadPoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self
            .task_sender
            .as_ref()
            .ok_or(ThreadPoolError::ShuttingDown)?;
        sender
            .send(Box::new(f))
            .map_err(|_| ThreadPoolError::ShuttingDown)
    }

    /// Stop accepting tasks. Already queued tasks still run.
    pub fn shutdown(&mut self) {
        if self.task_sender.take().is_some() {
            debug!("client thread pool closed for new tasks");
        }
    }

    /// Stop accepting tasks and wait for every queued task to finish
    pub fn shutdown_and_join(mut self) -> ThreadPoolStats {
        self.shutdown();

        for worker in self.workers.drain(..) {
            if let Err(e) = worker.join() {
                error!("worker thread panicked during shutdown: {:?}", e);
            }
        }

        let stats = self.stats();
        info!(
            completed = stats.tasks_completed,
            panicked = stats.tasks_panicked,
            "client thread pool shutdown complete"
        );
        stats
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Current task counters
    pub fn stats(&self) -> ThreadPoolStats {
        ThreadPoolStats {
            tasks_completed: self.counters.completed.load(Ordering::Relaxed),
            tasks_panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }
}
