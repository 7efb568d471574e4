//! Video generation worker.
//!
//! This crate provides:
//! - Job executor consuming render jobs from the Redis stream
//! - The generation pipeline: prompts, per-segment rendering, archival,
//!   merge submission
//! - Progress emission and status-cache heartbeats
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod processor;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use processor::ProcessingContext;
