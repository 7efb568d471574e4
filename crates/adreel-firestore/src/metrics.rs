//! Prometheus metrics for the Firestore client.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "firestore_requests_total";
    pub const RETRIES_TOTAL: &str = "firestore_retries_total";
    pub const LATENCY_SECONDS: &str = "firestore_latency_seconds";
    pub const DOCUMENTS_RETURNED_TOTAL: &str = "firestore_documents_returned_total";
}

/// Record a completed request, labelled by operation and HTTP status.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    let labels = [
        ("operation", operation.to_string()),
        ("status", status.to_string()),
    ];
    counter!(names::REQUESTS_TOTAL, &labels).increment(1);

    histogram!(names::LATENCY_SECONDS, "operation" => operation.to_string())
        .record(latency_ms / 1000.0);
}

/// Record one retry attempt.
pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

/// Record how many documents a list or query call returned.
pub fn record_documents_returned(collection: &str, count: u64) {
    counter!(names::DOCUMENTS_RETURNED_TOTAL, "collection" => collection.to_string())
        .increment(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_share_prefix() {
        for name in [
            names::REQUESTS_TOTAL,
            names::RETRIES_TOTAL,
            names::LATENCY_SECONDS,
            names::DOCUMENTS_RETURNED_TOTAL,
        ] {
            assert!(name.starts_with("firestore_"), "{name}");
        }
    }
}
