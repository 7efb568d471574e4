//! Admin handlers, gated by the email allow-list.
//!
//! Billing reconciliation is out of scope for this service, so plan
//! changes arrive here instead of from a payment processor. The video
//! fail endpoint is the manual override for renders the sweeper has not
//! caught yet.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use adreel_firestore::SubscriptionRepository;
use adreel_models::{
    ActiveRenderJob, PlanTier, SubscriptionStatus, TeamId, UserSubscription, VideoId,
};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub plan: PlanTier,
    #[serde(default)]
    pub status: Option<SubscriptionStatus>,
    #[serde(default)]
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Set a user's subscription plan and status.
pub async fn update_user_subscription(
    State(state): State<AppState>,
    user: AuthUser,
    Path(uid): Path<String>,
    Json(request): Json<UpdateSubscriptionRequest>,
) -> ApiResult<Json<UserSubscription>> {
    user.require_admin(&state.config)?;

    let repo = SubscriptionRepository::new((*state.firestore).clone());
    let mut subscription = repo
        .get(&uid)
        .await?
        .unwrap_or_else(|| UserSubscription::new(uid.clone(), request.plan));

    subscription.plan = request.plan;
    if let Some(status) = request.status {
        subscription.status = status;
    }
    if request.current_period_end.is_some() {
        subscription.current_period_end = request.current_period_end;
    }
    subscription.updated_at = Utc::now();

    repo.upsert(&subscription).await?;

    info!(
        uid = %uid,
        plan = %subscription.plan,
        status = %subscription.status,
        by = %user.uid,
        "Updated subscription"
    );

    Ok(Json(subscription))
}

#[derive(Debug, Deserialize)]
pub struct FailVideoRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct FailVideoResponse {
    pub failed: bool,
}

/// Force-fail a stuck video.
///
/// Returns `failed: false` when the video was already terminal.
pub async fn fail_video(
    State(state): State<AppState>,
    user: AuthUser,
    Path((team_id, video_id)): Path<(String, String)>,
    Json(request): Json<FailVideoRequest>,
) -> ApiResult<Json<FailVideoResponse>> {
    user.require_admin(&state.config)?;

    let team_id = TeamId::from_string(team_id);
    let video_id = VideoId::from_string(video_id);
    let reason = request
        .reason
        .unwrap_or_else(|| "Manually failed by an operator".to_string());

    let failed = state
        .video_repo(&team_id)
        .fail_if_active(&video_id, &reason)
        .await?;

    if failed {
        if let Err(e) = state.progress.error(&video_id, &reason).await {
            warn!(video_id = %video_id, error = %e, "Failed to publish failure event");
        }
        if let Err(e) = state.status_cache.record_finished(&video_id).await {
            warn!(video_id = %video_id, error = %e, "Failed to clear job status record");
        }
        warn!(video_id = %video_id, by = %user.uid, reason = %reason, "Video manually failed");
    }

    Ok(Json(FailVideoResponse { failed }))
}

#[derive(Serialize)]
pub struct QueueStatusResponse {
    /// Jobs waiting in the stream
    pub queued: u64,
    /// Jobs delivered but not yet acked
    pub pending: u64,
    /// Jobs that exhausted their retries
    pub dead_lettered: u64,
    /// Videos currently being worked on
    pub active: u64,
    pub active_jobs: Vec<ActiveRenderJob>,
}

/// Queue depth and in-flight jobs.
pub async fn queue_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<QueueStatusResponse>> {
    user.require_admin(&state.config)?;

    let queued = state.queue.len().await?;
    let pending = state.queue.pending_len().await?;
    let dead_lettered = state.queue.dlq_len().await?;
    let active_jobs = state.status_cache.active_jobs().await?;

    metrics::set_queue_length(queued);
    metrics::set_dlq_length(dead_lettered);

    Ok(Json(QueueStatusResponse {
        queued,
        pending,
        dead_lettered,
        active: active_jobs.len() as u64,
        active_jobs,
    }))
}
