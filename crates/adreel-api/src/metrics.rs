//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP
    pub const HTTP_REQUESTS_TOTAL: &str = "adreel_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "adreel_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "adreel_http_requests_in_flight";

    // Queue
    pub const QUEUE_LENGTH: &str = "adreel_queue_length";
    pub const QUEUE_DLQ_LENGTH: &str = "adreel_queue_dlq_length";
    pub const JOBS_ENQUEUED_TOTAL: &str = "adreel_jobs_enqueued_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "adreel_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "adreel_jobs_failed_total";

    // Video pipeline
    pub const VIDEOS_CREATED_TOTAL: &str = "adreel_videos_created_total";
    pub const CREDITS_CHARGED_TOTAL: &str = "adreel_credits_charged_total";

    // Image intake
    pub const UPLOADS_TOTAL: &str = "adreel_uploads_total";
    pub const UPLOAD_BYTES_TOTAL: &str = "adreel_upload_bytes_total";
    pub const UPLOAD_DURATION_SECONDS: &str = "adreel_upload_duration_seconds";

    pub const WEBHOOKS_RECEIVED_TOTAL: &str = "adreel_webhooks_received_total";
    pub const INVITATIONS_SENT_TOTAL: &str = "adreel_invitations_sent_total";
    pub const RATE_LIMIT_HITS_TOTAL: &str = "adreel_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Update queue length gauge.
pub fn set_queue_length(length: u64) {
    gauge!(names::QUEUE_LENGTH).set(length as f64);
}

/// Update DLQ length gauge.
pub fn set_dlq_length(length: u64) {
    gauge!(names::QUEUE_DLQ_LENGTH).set(length as f64);
}

pub fn record_job_enqueued(job_type: &str) {
    counter!(names::JOBS_ENQUEUED_TOTAL, "type" => job_type.to_string()).increment(1);
}

pub fn record_job_completed(job_type: &str) {
    counter!(names::JOBS_COMPLETED_TOTAL, "type" => job_type.to_string()).increment(1);
}

pub fn record_job_failed(job_type: &str) {
    counter!(names::JOBS_FAILED_TOTAL, "type" => job_type.to_string()).increment(1);
}

/// Record a video creation request accepted for rendering. Credits are
/// charged one per segment at acceptance time.
pub fn record_video_created(segment_count: usize) {
    counter!(names::VIDEOS_CREATED_TOTAL).increment(1);
    counter!(names::CREDITS_CHARGED_TOTAL).increment(segment_count as u64);
}

/// Record a source image upload.
pub fn record_upload(source: &str, bytes: u64, duration_secs: f64) {
    let labels = [("source", source.to_string())];
    counter!(names::UPLOADS_TOTAL, &labels).increment(1);
    counter!(names::UPLOAD_BYTES_TOTAL, &labels).increment(bytes);
    histogram!(names::UPLOAD_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a vendor webhook delivery.
pub fn record_webhook_received(kind: &str, outcome: &str) {
    let labels = [
        ("kind", kind.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::WEBHOOKS_RECEIVED_TOTAL, &labels).increment(1);
}

/// Record an invitation email sent.
pub fn record_invitation_sent() {
    counter!(names::INVITATIONS_SENT_TOTAL).increment(1);
}

/// Record a rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    counter!(names::RATE_LIMIT_HITS_TOTAL, "endpoint" => endpoint.to_string()).increment(1);
}

/// Ordered path rewrites that collapse IDs into placeholders so the path
/// label stays low-cardinality. The UUID rule must run first; the bare
/// numeric rule is the catch-all and runs last.
static PATH_REWRITES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (
            r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
            ":id",
        ),
        // Webhook callbacks carry video id and segment index
        (r"/render/[a-zA-Z0-9_-]+/[0-9]+", "/render/:video_id/:segment"),
        (r"/merge/[a-zA-Z0-9_-]+", "/merge/:video_id"),
        // Admin fail route nests team and video ids
        (
            r"/admin/videos/[a-zA-Z0-9_-]+/[a-zA-Z0-9_-]+",
            "/admin/videos/:team_id/:video_id",
        ),
        (r"/videos/[a-zA-Z0-9_-]+", "/videos/:video_id"),
        (r"/teams/[a-zA-Z0-9_-]+", "/teams/:team_id"),
        (r"/invitations/[a-zA-Z0-9_-]+", "/invitations/:invitation_id"),
        (r"/members/[a-zA-Z0-9_-]+", "/members/:user_id"),
        (r"/users/[a-zA-Z0-9_-]+", "/users/:uid"),
        (r"/[0-9]+(/|$)", "/:id$1"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

fn sanitize_path(path: &str) -> String {
    PATH_REWRITES
        .iter()
        .fold(path.to_string(), |p, (re, replacement)| {
            re.replace_all(&p, *replacement).into_owned()
        })
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/videos/abc123-def456/status"),
            "/api/videos/:video_id/status"
        );
        assert_eq!(
            sanitize_path("/api/videos/550e8400-e29b-41d4-a716-446655440000"),
            "/api/videos/:id"
        );
        assert_eq!(
            sanitize_path("/api/teams/team-9f3c/members/user-77ab"),
            "/api/teams/:team_id/members/:user_id"
        );
        assert_eq!(sanitize_path("/api/things/42"), "/api/things/:id");
    }

    #[test]
    fn test_sanitize_webhook_paths() {
        assert_eq!(
            sanitize_path("/webhooks/render/vid-1234abcd/2"),
            "/webhooks/render/:video_id/:segment"
        );
        assert_eq!(
            sanitize_path("/webhooks/merge/vid-1234abcd"),
            "/webhooks/merge/:video_id"
        );
    }

    #[test]
    fn test_sanitize_admin_fail_path() {
        assert_eq!(
            sanitize_path("/api/admin/videos/team-1/vid-2/fail"),
            "/api/admin/videos/:team_id/:video_id/fail"
        );
    }
}
