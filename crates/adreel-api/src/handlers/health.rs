//! Liveness and readiness probes.

use std::future::Future;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// Liveness probe. Answers as long as the process is serving requests.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn passed(&self) -> bool {
        self.status == "ok"
    }
}

/// Time a dependency probe and fold its result into a check entry.
async fn timed_check<F, Fut, T, E>(probe: F) -> CheckStatus
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let started = Instant::now();
    match probe().await {
        Ok(_) => CheckStatus {
            status: "ok",
            error: None,
            latency_ms: Some(started.elapsed().as_millis() as u64),
        },
        Err(e) => CheckStatus {
            status: "error",
            error: Some(e.to_string()),
            latency_ms: None,
        },
    }
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub redis: CheckStatus,
    pub firestore: CheckStatus,
    pub storage: CheckStatus,
}

/// Readiness probe. Verifies Redis, Firestore, and R2 are reachable
/// before the instance receives traffic.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    // Queue depth doubles as the cheapest possible Redis round trip.
    let redis = timed_check(|| state.queue.len()).await;

    // A probe read against a document that is allowed not to exist;
    // Ok(None) still proves Firestore answered.
    let firestore = timed_check(|| state.firestore.get_document("_health", "_check")).await;

    let storage = timed_check(|| state.storage.check_connectivity()).await;

    let all_ok = redis.passed() && firestore.passed() && storage.passed();
    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" },
        checks: ReadinessChecks {
            redis,
            firestore,
            storage,
        },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
