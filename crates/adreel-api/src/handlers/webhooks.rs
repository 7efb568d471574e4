//! Vendor webhook handlers.
//!
//! Both endpoints are public but gated by signed HMAC tokens minted when
//! the vendor request was submitted. The owning team is resolved through
//! the job status cache; a missing record means the video already reached
//! a terminal state (or was swept), so the callback is acknowledged as a
//! no-op rather than rejected. Vendors only need a 2xx to stop retrying.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use adreel_firestore::{FirestoreError, VideoRepository};
use adreel_models::{SegmentStatus, TeamId, VideoId};
use adreel_storage::R2Client;
use adreel_vendors::{MergeCallback, RenderStatus, RenderStatusPayload, WebhookToken};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WebhookTokenQuery {
    pub token: String,
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub acknowledged: bool,
    pub applied: bool,
}

impl WebhookAck {
    fn applied() -> Json<Self> {
        Json(Self {
            acknowledged: true,
            applied: true,
        })
    }

    fn ignored() -> Json<Self> {
        Json(Self {
            acknowledged: true,
            applied: false,
        })
    }
}

/// Segment status callback from the render vendor.
///
/// Mirrors non-terminal vendor statuses into the segment record and
/// fast-fails a segment on `FAILED`. Completion is left to the worker's
/// poll loop, which owns fetching and archiving the output.
pub async fn render_webhook(
    State(state): State<AppState>,
    Path((video_id, segment_index)): Path<(String, u32)>,
    Query(query): Query<WebhookTokenQuery>,
    Json(payload): Json<RenderStatusPayload>,
) -> ApiResult<Json<WebhookAck>> {
    let token = WebhookToken::verify(&query.token, &state.config.webhook_signing_secret)?;
    let authorized = token
        .map(|t| t.authorizes_render(&video_id, segment_index))
        .unwrap_or(false);
    if !authorized {
        metrics::record_webhook_received("render", "rejected");
        return Err(ApiError::unauthorized("Invalid webhook token"));
    }

    let video_id = VideoId::from_string(video_id);
    let status = payload.parsed().map_err(|e| {
        metrics::record_webhook_received("render", "malformed");
        ApiError::bad_request(e.to_string())
    })?;

    let Some(active) = state.status_cache.get(&video_id).await? else {
        info!(
            video_id = %video_id,
            segment = segment_index,
            status = ?status,
            "Render callback for inactive video, ignoring"
        );
        metrics::record_webhook_received("render", "ignored");
        return Ok(WebhookAck::ignored());
    };

    let repo = state.video_repo(&active.team_id);
    let error_message = payload.error.clone();

    let result = match status {
        // Already the segment's starting state; nothing to write.
        RenderStatus::InQueue => Ok(None),
        RenderStatus::InProgress => {
            repo.update_segment_with(&video_id, segment_index, |segment| {
                match segment.status {
                    SegmentStatus::InQueue => Some(segment.in_progress()),
                    _ => None,
                }
            })
            .await
        }
        // The worker's poll loop fetches the output and archives it.
        RenderStatus::Completed => Ok(None),
        RenderStatus::Failed => {
            repo.update_segment_with(&video_id, segment_index, |segment| {
                if segment.status.is_terminal() {
                    return None;
                }
                let message = error_message
                    .clone()
                    .unwrap_or_else(|| "Render vendor reported failure".to_string());
                Some(segment.fail(message))
            })
            .await
        }
    };

    match result {
        Ok(Some(segment)) => {
            info!(
                video_id = %video_id,
                segment = segment_index,
                status = segment.status.as_str(),
                "Applied render callback"
            );
            metrics::record_webhook_received("render", "applied");
            Ok(WebhookAck::applied())
        }
        Ok(None) => {
            metrics::record_webhook_received("render", "ignored");
            Ok(WebhookAck::ignored())
        }
        // The record can vanish between the cache check and the write.
        Err(FirestoreError::NotFound(_)) => {
            metrics::record_webhook_received("render", "ignored");
            Ok(WebhookAck::ignored())
        }
        Err(e) => Err(e.into()),
    }
}

/// Completion callback from the merge vendor.
///
/// `OK` marks the video completed with the vendor's URL and kicks off
/// archival to our own storage in a spawned task; `ERROR` marks it failed.
/// A callback for an already-terminal video is acknowledged unchanged.
pub async fn merge_webhook(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Query(query): Query<WebhookTokenQuery>,
    Json(callback): Json<MergeCallback>,
) -> ApiResult<Json<WebhookAck>> {
    let token = WebhookToken::verify(&query.token, &state.config.webhook_signing_secret)?;
    let authorized = token.map(|t| t.authorizes_merge(&video_id)).unwrap_or(false);
    if !authorized {
        metrics::record_webhook_received("merge", "rejected");
        return Err(ApiError::unauthorized("Invalid webhook token"));
    }

    let video_id = VideoId::from_string(video_id);

    let Some(active) = state.status_cache.get(&video_id).await? else {
        info!(video_id = %video_id, "Merge callback for inactive video, ignoring");
        metrics::record_webhook_received("merge", "ignored");
        return Ok(WebhookAck::ignored());
    };

    let repo = state.video_repo(&active.team_id);

    if !callback.is_ok() {
        let message = callback.error_message();
        let failed = match repo.fail_if_active(&video_id, &message).await {
            Ok(failed) => failed,
            Err(FirestoreError::NotFound(_)) => {
                metrics::record_webhook_received("merge", "ignored");
                return Ok(WebhookAck::ignored());
            }
            Err(e) => return Err(e.into()),
        };
        if !failed {
            metrics::record_webhook_received("merge", "ignored");
            return Ok(WebhookAck::ignored());
        }

        if let Err(e) = state.progress.error(&video_id, &message).await {
            warn!(video_id = %video_id, error = %e, "Failed to publish failure event");
        }
        if let Err(e) = state.status_cache.record_finished(&video_id).await {
            warn!(video_id = %video_id, error = %e, "Failed to clear job status record");
        }
        metrics::record_webhook_received("merge", "failed");
        warn!(video_id = %video_id, error = %message, "Merge vendor reported failure");
        return Ok(WebhookAck::applied());
    }

    let Some(url) = callback.video_url() else {
        metrics::record_webhook_received("merge", "malformed");
        return Err(ApiError::bad_request("Merge callback missing video URL"));
    };

    let completed = match repo.complete_if_active(&video_id, Some(url), None).await {
        Ok(completed) => completed,
        Err(FirestoreError::NotFound(_)) => {
            metrics::record_webhook_received("merge", "ignored");
            return Ok(WebhookAck::ignored());
        }
        Err(e) => return Err(e.into()),
    };
    if !completed {
        metrics::record_webhook_received("merge", "ignored");
        return Ok(WebhookAck::ignored());
    }

    if let Err(e) = state.progress.done(&video_id).await {
        warn!(video_id = %video_id, error = %e, "Failed to publish completion event");
    }
    if let Err(e) = state.status_cache.record_finished(&video_id).await {
        warn!(video_id = %video_id, error = %e, "Failed to clear job status record");
    }

    metrics::record_webhook_received("merge", "completed");
    metrics::record_job_completed("render_video");
    info!(video_id = %video_id, team_id = %active.team_id, "Video completed via merge callback");

    archive_merged_video(
        Arc::clone(&state.storage),
        repo,
        active.team_id.clone(),
        video_id,
        url.to_string(),
    );

    Ok(WebhookAck::applied())
}

/// Copy the merged file from the vendor's URL into our storage.
///
/// Best-effort: the vendor URL already serves downloads, so a failure here
/// only delays switching delivery to the archived copy.
fn archive_merged_video(
    storage: Arc<R2Client>,
    repo: VideoRepository,
    team_id: TeamId,
    video_id: VideoId,
    url: String,
) {
    tokio::spawn(async move {
        let client = match reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!(video_id = %video_id, error = %e, "Failed to build archival client");
                return;
            }
        };

        let data = match fetch_bytes(&client, &url).await {
            Ok(data) => data,
            Err(e) => {
                warn!(video_id = %video_id, error = %e, "Failed to download merged video");
                return;
            }
        };

        let key = match storage.archive_final_video(&team_id, &video_id, data).await {
            Ok(key) => key,
            Err(e) => {
                warn!(video_id = %video_id, error = %e, "Failed to archive merged video");
                return;
            }
        };

        if let Err(e) = repo.set_final_video_key(&video_id, &key).await {
            warn!(video_id = %video_id, key = %key, error = %e, "Failed to record archived video key");
        }
    });
}

async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, reqwest::Error> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}
