//! Pooled resources.
//!
//! A resource has a stable identity and a one-way open/closed state. The pool
//! only ever hands out open resources and never takes a closed one back.

use log::{info, trace};

use crate::error::ResourceError;

/// A trait for resources that can be pooled
pub trait Resource: Send + 'static {
    /// Create a new, open resource with the given identity
    fn create(id: usize) -> Self
    where
        Self: Sized;

    /// Identity assigned at creation
    fn id(&self) -> usize;

    /// Check if the resource can still be used
    fn is_open(&self) -> bool;

    /// Close the resource. Closing is terminal and repeated calls are no-ops.
    fn close(&mut self);
}

/// A simulated database connection
#[derive(Debug)]
pub struct Connection {
    id: usize,
    open: bool,
}

impl Connection {
    /// Execute a query against this connection.
    ///
    /// Only logs the query; the actual work duration is the caller's concern.
    pub fn perform_work(&self, description: &str) -> Result<(), ResourceError> {
        if !self.open {
            return Err(ResourceError::Closed { id: self.id });
        }
        info!("Connection #{} executing query: {}", self.id, description);
        Ok(())
    }
}

impl Resource for Connection {
    fn create(id: usize) -> Self {
        trace!("Connection #{} created", id);
        Self { id, open: true }
    }

    fn id(&self) -> usize {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            info!("Connection #{} closed", self.id);
        }
    }
}
