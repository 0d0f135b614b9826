//! carefind-core library.
//!
//! # Conventions
//!
//! - **Errors**: Public APIs return [`error::Result`] so callers can tell a
//!   missing model from a broken store from a bad query.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod config;
pub mod db;
pub mod error;
pub mod model;

pub use error::{CarefindError, ErrorCode, Result};
