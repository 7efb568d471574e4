//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),

    #[error("Duplicate job: {0}")]
    DuplicateJob(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }

    pub fn duplicate_job(key: impl Into<String>) -> Self {
        Self::DuplicateJob(key.into())
    }

    /// True when enqueueing was refused because an identical job is
    /// already in flight.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateJob(_))
    }
}
