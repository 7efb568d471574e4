//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] adreel_storage::StorageError),

    #[error("Firestore error: {0}")]
    Firestore(#[from] adreel_firestore::FirestoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] adreel_queue::QueueError),

    #[error("Vendor error: {0}")]
    Vendor(#[from] adreel_vendors::VendorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn render_failed(msg: impl Into<String>) -> Self {
        Self::RenderFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether a redelivery has a chance of succeeding.
    ///
    /// Render failures are the vendor's verdict on the request itself and
    /// are final; infrastructure errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Storage(_) | WorkerError::Firestore(_) | WorkerError::Queue(_) => true,
            WorkerError::Vendor(e) => e.is_retryable(),
            WorkerError::Io(_) => true,
            WorkerError::JobFailed(_) | WorkerError::RenderFailed(_) | WorkerError::ConfigError(_) => {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_errors_are_retryable() {
        assert!(WorkerError::Queue(adreel_queue::QueueError::duplicate_job("k")).is_retryable());
        assert!(!WorkerError::render_failed("vendor said no").is_retryable());
        assert!(!WorkerError::config_error("missing key").is_retryable());
    }
}
