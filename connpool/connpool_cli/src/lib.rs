//! Command-line driver for the connection pool.
//!
//! Loads settings, runs a batch of concurrent clients against one
//! `connpool_core` pool and reports how many of them got a connection in time.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod coordinator;
pub mod executor;
pub mod logging;
pub mod worker;

pub use config::{AppConfig, ConfigError};
pub use coordinator::{run, RunOptions, RunReport};
