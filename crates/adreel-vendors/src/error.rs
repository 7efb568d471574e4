//! Vendor error types.

use thiserror::Error;

/// Result type for vendor operations.
pub type VendorResult<T> = Result<T, VendorError>;

/// Errors from third-party vendor APIs.
#[derive(Debug, Error)]
pub enum VendorError {
    #[error("Vendor configuration error: {0}")]
    ConfigError(String),

    #[error("Vendor returned {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Vendor rate limited the request")]
    RateLimited,

    #[error("Invalid vendor response: {0}")]
    InvalidResponse(String),

    #[error("Prompt contract violated: {0}")]
    PromptContract(String),

    #[error("Vendor request rejected: {0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VendorError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Build an error from a non-success HTTP response status and body.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        if status == 429 {
            Self::RateLimited
        } else {
            Self::RequestFailed {
                status,
                message: message.into(),
            }
        }
    }

    /// Whether a retry has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            VendorError::Network(_) | VendorError::RateLimited => true,
            VendorError::RequestFailed { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(VendorError::RateLimited.is_retryable());
        assert!(VendorError::from_status(503, "unavailable").is_retryable());
        assert!(!VendorError::from_status(400, "bad request").is_retryable());
        assert!(!VendorError::invalid_response("garbage").is_retryable());
    }

    #[test]
    fn test_rate_limit_from_status() {
        assert!(matches!(
            VendorError::from_status(429, "slow down"),
            VendorError::RateLimited
        ));
    }
}
