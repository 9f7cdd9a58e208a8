//! Error types for the connection pool.

use std::time::Duration;
use thiserror::Error;

/// Error returned when a resource cannot be acquired from the pool
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// No resource became free before the caller's timeout elapsed
    #[error("timeout waiting for a free connection after {0:?}")]
    AcquireTimeout(Duration),

    /// The pool was shut down before or while the caller was waiting
    #[error("connection pool is shut down")]
    PoolClosed,

    /// The caller's wait was cancelled through its `CancelToken`
    #[error("acquire was cancelled while waiting")]
    Cancelled,
}

impl PoolError {
    /// Whether this error means the pool simply had nothing to give in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AcquireTimeout(_))
    }
}

/// Error raised by a resource itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The resource was used after it was closed
    #[error("connection #{id} is closed")]
    Closed {
        /// Identity of the closed resource
        id: usize,
    },
}
