//! Storage error types.

use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by the R2 client and the key helpers.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Missing or unusable client configuration.
    #[error("Storage configuration error: {0}")]
    Config(String),

    /// The bucket answered but the object is not there.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// An S3 API call failed.
    #[error("R2 {operation} failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },

    /// An object key that does not follow the expected layout.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Upload with a file extension outside the image allow-list.
    #[error("Unsupported image type: {0}")]
    UnsupportedImageType(String),
}

impl StorageError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub(crate) fn request(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Request {
            operation,
            message: err.to_string(),
        }
    }
}
