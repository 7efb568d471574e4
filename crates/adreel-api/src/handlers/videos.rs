//! Video generation handlers.
//!
//! Create validates input, reserves credits, persists the record, and
//! enqueues the render job; everything downstream happens in the worker.
//! Reads are team-scoped: an explicit `team_id` narrows the lookup, and
//! without one the caller's teams are searched in order.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use adreel_models::{random_seed, AspectRatio, Team, TeamId, VideoId, VideoRecord, VideoStatus};
use adreel_queue::{ProgressUpdate, RenderVideoJob};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::{
    is_valid_video_id, sanitize_prompt, sanitize_title, MAX_PROMPT_LENGTH, MAX_TITLE_LENGTH,
};
use crate::state::AppState;

/// Lifetime of presigned delivery URLs.
const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
pub struct CreateVideoRequest {
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub image_key: String,
    pub prompt: String,
    pub duration_seconds: u32,
    #[serde(default)]
    pub seed: Option<u32>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
}

#[derive(Serialize)]
pub struct CreateVideoResponse {
    pub video_id: String,
    pub team_id: String,
    pub status: String,
    pub segment_count: u32,
    pub credits_charged: u32,
    pub seed: u32,
}

/// Submit a generation request.
pub async fn create_video(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateVideoRequest>,
) -> ApiResult<Json<CreateVideoResponse>> {
    let prompt = sanitize_prompt(&request.prompt);
    if prompt.is_empty() {
        return Err(ApiError::bad_request("Prompt must not be empty"));
    }
    if prompt.len() > MAX_PROMPT_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Prompt exceeds {} characters",
            MAX_PROMPT_LENGTH
        )));
    }

    let title = match request.title.as_deref() {
        Some(raw) => {
            let title = sanitize_title(raw);
            if title.len() > MAX_TITLE_LENGTH {
                return Err(ApiError::bad_request(format!(
                    "Title exceeds {} characters",
                    MAX_TITLE_LENGTH
                )));
            }
            title
        }
        None => String::new(),
    };
    let title = if title.is_empty() {
        default_title(&prompt)
    } else {
        title
    };

    let aspect_ratio = match request.aspect_ratio.as_deref() {
        Some(raw) => raw
            .parse::<AspectRatio>()
            .map_err(|_| ApiError::bad_request(format!("Unsupported aspect ratio: {}", raw)))?,
        None => AspectRatio::default(),
    };

    let team = state
        .teams
        .resolve_team(&user.uid, user.email.as_deref(), request.team_id.as_deref())
        .await?;

    adreel_storage::keys::validate_image_key(&team.team_id, &request.image_key)
        .map_err(|_| ApiError::bad_request("Image key does not belong to this team"))?;
    if !state.storage.exists(&request.image_key).await? {
        return Err(ApiError::bad_request("Image not found; upload it first"));
    }

    let seed = request.seed.unwrap_or_else(random_seed);
    let video_id = VideoId::new();
    let record = VideoRecord::new(
        video_id.clone(),
        team.team_id.clone(),
        user.uid.clone(),
        title,
        request.image_key.clone(),
        prompt,
        request.duration_seconds,
        seed,
        aspect_ratio,
    )
    .map_err(|e| ApiError::bad_request(e.to_string()))?;

    // Credits are reserved before any durable state exists; they are not
    // refunded if the render later fails.
    let charge = state.quota.reserve_credits(&team, record.credits_charged).await?;

    let repo = state.video_repo(&team.team_id);
    repo.create(&record).await?;

    let job = RenderVideoJob::new(team.team_id.clone(), video_id.clone(), user.uid.clone());
    match state.queue.enqueue_render(job).await {
        Ok(message_id) => {
            metrics::record_job_enqueued("render_video");
            info!(
                video_id = %video_id,
                team_id = %team.team_id,
                message_id = %message_id,
                segments = record.segments.len(),
                credits_used = charge.credits_used_after,
                "Queued render job"
            );
        }
        Err(e) => {
            warn!(video_id = %video_id, error = %e, "Failed to enqueue render job");
            if let Err(mark_err) = repo
                .fail_if_active(&video_id, "Failed to queue render job")
                .await
            {
                warn!(video_id = %video_id, error = %mark_err, "Failed to mark video failed");
            }
            return Err(e.into());
        }
    }

    metrics::record_video_created(record.segments.len());

    Ok(Json(CreateVideoResponse {
        video_id: video_id.to_string(),
        team_id: team.team_id.to_string(),
        status: record.status.as_str().to_string(),
        segment_count: record.segments.len() as u32,
        credits_charged: record.credits_charged,
        seed,
    }))
}

/// Title fallback: the first words of the prompt.
fn default_title(prompt: &str) -> String {
    let mut title: String = prompt.chars().take(60).collect();
    if prompt.chars().count() > 60 {
        title.push_str("...");
    }
    title
}

#[derive(Debug, Deserialize)]
pub struct ListVideosQuery {
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct VideoListResponse {
    pub videos: Vec<VideoRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// List a team's videos, newest first.
pub async fn list_videos(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListVideosQuery>,
) -> ApiResult<Json<VideoListResponse>> {
    let team = state
        .teams
        .resolve_team(&user.uid, user.email.as_deref(), query.team_id.as_deref())
        .await?;

    let page = state
        .video_repo(&team.team_id)
        .list(query.limit, query.cursor.as_deref())
        .await?;

    Ok(Json(VideoListResponse {
        videos: page.videos,
        next_cursor: page.next_cursor,
    }))
}

#[derive(Debug, Deserialize)]
pub struct VideoScopeQuery {
    #[serde(default)]
    pub team_id: Option<String>,
}

/// Fetch the full record for a video, segments included.
pub async fn get_video(
    State(state): State<AppState>,
    user: AuthUser,
    Path(video_id): Path<String>,
    Query(query): Query<VideoScopeQuery>,
) -> ApiResult<Json<VideoRecord>> {
    let (_, record) = locate_video(&state, &user, &video_id, query.team_id.as_deref()).await?;
    Ok(Json(record))
}

#[derive(Serialize)]
pub struct SegmentStatusSummary {
    pub index: u32,
    pub status: String,
}

#[derive(Serialize)]
pub struct VideoStatusResponse {
    pub video_id: String,
    pub status: String,
    pub segments_completed: u32,
    pub segments_total: u32,
    pub segments: Vec<SegmentStatusSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_video_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub progress: Vec<ProgressUpdate>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Lightweight polling payload for in-flight videos.
pub async fn get_video_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(video_id): Path<String>,
    Query(query): Query<VideoScopeQuery>,
) -> ApiResult<Json<VideoStatusResponse>> {
    let (_, record) = locate_video(&state, &user, &video_id, query.team_id.as_deref()).await?;

    // Progress history is a nicety; a Redis hiccup must not fail the poll.
    let progress = match state.progress.history(&record.video_id).await {
        Ok(events) => events.into_iter().map(|e| e.update).collect(),
        Err(e) => {
            warn!(video_id = %record.video_id, error = %e, "Failed to read progress history");
            Vec::new()
        }
    };

    let segments_completed = record
        .segments
        .iter()
        .filter(|s| s.status == adreel_models::SegmentStatus::Completed)
        .count() as u32;

    Ok(Json(VideoStatusResponse {
        video_id: record.video_id.to_string(),
        status: record.status.as_str().to_string(),
        segments_completed,
        segments_total: record.segments.len() as u32,
        segments: record
            .segments
            .iter()
            .map(|s| SegmentStatusSummary {
                index: s.index,
                status: s.status.as_str().to_string(),
            })
            .collect(),
        error_message: record.error_message,
        final_video_url: record.final_video_url,
        progress,
        updated_at: record.updated_at,
    }))
}

#[derive(Serialize)]
pub struct DownloadUrlResponse {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_seconds: Option<u64>,
}

/// Presigned delivery URL for a completed video.
pub async fn get_download_url(
    State(state): State<AppState>,
    user: AuthUser,
    Path(video_id): Path<String>,
    Query(query): Query<VideoScopeQuery>,
) -> ApiResult<Json<DownloadUrlResponse>> {
    let (_, record) = locate_video(&state, &user, &video_id, query.team_id.as_deref()).await?;

    if record.status != VideoStatus::Completed {
        return Err(ApiError::bad_request(format!(
            "Video is not completed (status: {})",
            record.status.as_str()
        )));
    }

    if let Some(key) = record.final_video_key.as_deref() {
        let url = state.storage.presign_get(key, DOWNLOAD_URL_TTL).await?;
        return Ok(Json(DownloadUrlResponse {
            url,
            expires_in_seconds: Some(DOWNLOAD_URL_TTL.as_secs()),
        }));
    }

    // Archival may still be in flight; fall back to the vendor URL.
    if let Some(url) = record.final_video_url {
        return Ok(Json(DownloadUrlResponse {
            url,
            expires_in_seconds: None,
        }));
    }

    Err(ApiError::internal("Completed video has no stored output"))
}

/// Delete a video record and its stored files.
pub async fn delete_video(
    State(state): State<AppState>,
    user: AuthUser,
    Path(video_id): Path<String>,
    Query(query): Query<VideoScopeQuery>,
) -> ApiResult<StatusCode> {
    let (team, record) = locate_video(&state, &user, &video_id, query.team_id.as_deref()).await?;

    match state
        .storage
        .delete_video_files(&team.team_id, &record.video_id)
        .await
    {
        Ok(deleted) => {
            info!(video_id = %record.video_id, objects = deleted, "Deleted video files");
        }
        Err(e) => {
            // Orphaned objects are cheaper than a wedged delete; keep going.
            warn!(video_id = %record.video_id, error = %e, "Failed to delete video files");
        }
    }

    state
        .video_repo(&team.team_id)
        .delete(&record.video_id)
        .await?;

    if let Err(e) = state.status_cache.record_finished(&record.video_id).await {
        warn!(video_id = %record.video_id, error = %e, "Failed to clear job status record");
    }

    info!(video_id = %record.video_id, uid = %user.uid, "Deleted video");
    Ok(StatusCode::NO_CONTENT)
}

/// Resolve a video by id within the caller's teams.
///
/// An explicit `team_id` checks membership and reads that team only.
/// Otherwise every team the caller belongs to is tried; a miss everywhere
/// is a plain 404 so outsiders cannot probe for existence.
async fn locate_video(
    state: &AppState,
    user: &AuthUser,
    video_id: &str,
    team_id: Option<&str>,
) -> ApiResult<(Team, VideoRecord)> {
    if !is_valid_video_id(video_id) {
        return Err(ApiError::bad_request("Invalid video id"));
    }
    let video_id = VideoId::from_string(video_id);

    if let Some(team_id) = team_id {
        let (team, _) = state
            .teams
            .require_member(&TeamId::from_string(team_id), &user.uid)
            .await?;
        let record = state
            .video_repo(&team.team_id)
            .get(&video_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Video not found"))?;
        return Ok((team, record));
    }

    for team in state.teams.teams_for_user(&user.uid).await? {
        if let Some(record) = state.video_repo(&team.team_id).get(&video_id).await? {
            return Ok((team, record));
        }
    }

    Err(ApiError::not_found("Video not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_title_truncates_long_prompts() {
        let prompt = "a".repeat(100);
        let title = default_title(&prompt);
        assert_eq!(title.chars().count(), 63);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_default_title_keeps_short_prompts() {
        assert_eq!(default_title("Red sneakers on a beach"), "Red sneakers on a beach");
    }
}
