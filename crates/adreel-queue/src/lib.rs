//! Redis Streams render queue.
//!
//! This crate provides:
//! - Job enqueueing via Redis Streams with idempotency-key dedup
//! - Worker consumption with retry/DLQ
//! - Progress events via Redis Pub/Sub with replayable history
//! - Active-job heartbeats for the timeout sweeper

pub mod error;
pub mod job;
pub mod progress;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{QueueJob, RenderVideoJob};
pub use progress::{
    JobStatusCache, ProgressChannel, ProgressEvent, ProgressUpdate, JOB_STATUS_TTL_SECS,
    PROGRESS_HISTORY_TTL_SECS, STALE_GRACE_PERIOD_SECS, STALE_THRESHOLD_SECS,
};
pub use queue::{JobQueue, QueueConfig};
