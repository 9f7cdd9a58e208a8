#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # Connpool Core
//!
//! A fixed-size pool of reusable connections shared by many threads.
//!
//! This crate provides:
//!
//! - A `Resource` abstraction and the simulated database [`Connection`]
//! - A monitor-style [`Pool`] with timeout-bounded, cancellable acquisition
//! - An RAII [`PooledConnection`] guard that returns its connection on drop
//! - Orderly shutdown that closes idle connections and wakes every waiter
//!
//! Pool transitions are emitted through the `log` facade; the embedding
//! binary decides where they go.

/// Error types for pool and resource operations
pub mod error;

/// Monitor-based connection pool
pub mod pool;

/// Pooled resources and the simulated connection
pub mod resource;

pub use error::{PoolError, ResourceError};
pub use pool::{CancelToken, ConnectionPool, Pool, PoolStats, PooledConnection};
pub use resource::{Connection, Resource};
