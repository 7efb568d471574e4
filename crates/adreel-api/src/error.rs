//! API error types.
//!
//! Every handler returns [`ApiResult`]; the [`IntoResponse`] impl renders
//! the error as a `{"detail": ..., "code": ...}` JSON body, which is the
//! shape the frontend matches on.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    // 4xx: the caller can act on these
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// Existed once, permanently unavailable now (expired invitations).
    #[error("Gone: {0}")]
    Gone(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The team is out of credits for the month.
    #[error("Payment required: {0}")]
    PaymentRequired(String),
    #[error("Rate limited")]
    RateLimited,

    // 5xx: our fault or a dependency's
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Storage error: {0}")]
    Storage(#[from] adreel_storage::StorageError),
    #[error("Firestore error: {0}")]
    Firestore(#[from] adreel_firestore::FirestoreError),
    /// No `#[from]`; the manual impl downgrades duplicates to `Conflict`.
    #[error("Queue error: {0}")]
    Queue(adreel_queue::QueueError),
    #[error("Vendor error: {0}")]
    Vendor(#[from] adreel_vendors::VendorError),
}

/// Generates the `fn name(msg) -> Self` constructors for message variants.
macro_rules! message_ctors {
    ($($name:ident => $variant:ident),* $(,)?) => {
        $(
            pub fn $name(msg: impl Into<String>) -> Self {
                Self::$variant(msg.into())
            }
        )*
    };
}

impl ApiError {
    message_ctors! {
        unauthorized => Unauthorized,
        forbidden => Forbidden,
        not_found => NotFound,
        bad_request => BadRequest,
        conflict => Conflict,
        payment_required => PaymentRequired,
        internal => Internal,
    }

    /// HTTP status plus the machine-readable code the frontend switches on.
    fn classify(&self) -> (StatusCode, Option<&'static str>) {
        use ApiError::*;
        match self {
            Unauthorized(_) => (StatusCode::UNAUTHORIZED, None),
            Forbidden(_) => (StatusCode::FORBIDDEN, None),
            NotFound(_) => (StatusCode::NOT_FOUND, None),
            Gone(_) => (StatusCode::GONE, None),
            BadRequest(_) => (StatusCode::BAD_REQUEST, None),
            Conflict(_) => (StatusCode::CONFLICT, None),
            PaymentRequired(_) => (StatusCode::PAYMENT_REQUIRED, Some("insufficient_credits")),
            RateLimited => (StatusCode::TOO_MANY_REQUESTS, Some("rate_limited")),
            Vendor(_) => (StatusCode::BAD_GATEWAY, None),
            Internal(_) | Storage(_) | Firestore(_) | Queue(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        }
    }

    /// Faults whose details must not leak to clients in production.
    fn is_fault(&self) -> bool {
        matches!(
            self,
            ApiError::Internal(_)
                | ApiError::Storage(_)
                | ApiError::Firestore(_)
                | ApiError::Queue(_)
                | ApiError::Vendor(_)
        )
    }
}

/// Duplicate enqueues surface as a conflict rather than a server fault.
impl From<adreel_queue::QueueError> for ApiError {
    fn from(err: adreel_queue::QueueError) -> Self {
        if err.is_duplicate() {
            ApiError::Conflict("A render for this video is already queued".to_string())
        } else {
            ApiError::Queue(err)
        }
    }
}

fn in_production() -> bool {
    std::env::var("ENVIRONMENT").map(|v| v == "production").unwrap_or(false)
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();

        // Once redacted, the log line is the only place the cause survives.
        if status.is_server_error() {
            error!(status = status.as_u16(), "Request failed: {self}");
        }

        let detail = if self.is_fault() && in_production() {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { detail, code })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::unauthorized("x").classify().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::payment_required("x").classify().0,
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ApiError::RateLimited.classify().0,
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Vendor(adreel_vendors::VendorError::rejected("no")).classify().0,
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_machine_codes() {
        assert_eq!(
            ApiError::payment_required("x").classify().1,
            Some("insufficient_credits")
        );
        assert_eq!(ApiError::RateLimited.classify().1, Some("rate_limited"));
        assert_eq!(ApiError::conflict("duplicate").classify().1, None);
    }

    #[test]
    fn test_duplicate_queue_error_maps_to_conflict() {
        let err: ApiError = adreel_queue::QueueError::duplicate_job("render:t:v").into();
        assert!(matches!(err, ApiError::Conflict(_)));

        let err: ApiError = adreel_queue::QueueError::enqueue_failed("redis down").into();
        assert!(matches!(err, ApiError::Queue(_)));
    }

    #[test]
    fn test_fault_classification() {
        assert!(ApiError::internal("boom").is_fault());
        assert!(ApiError::Vendor(adreel_vendors::VendorError::rejected("no")).is_fault());
        assert!(!ApiError::bad_request("x").is_fault());
        assert!(!ApiError::RateLimited.is_fault());
    }
}
