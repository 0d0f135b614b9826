#![forbid(unsafe_code)]
//! carefind-search library.
//!
//! # Conventions
//!
//! - **Errors**: Public APIs return [`carefind_core::Result`]; `anyhow` stays
//!   internal to model loading.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod engine;
pub mod ingest;
pub mod rank;
pub mod semantic;
pub mod tool;

pub use engine::SearchEngine;
pub use ingest::{IngestPipeline, IngestReport};
pub use rank::DistanceBackend;
pub use semantic::{Encoder, HashingEncoder, load_encoder};
pub use tool::SearchTool;
