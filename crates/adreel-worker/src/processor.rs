//! Render pipeline orchestration.
//!
//! One job drives one video end to end: expand the base prompt into
//! per-segment prompts, render each segment at the vendor, archive the
//! outputs, then either finish directly (single segment) or hand off to
//! the merge vendor. Merge completion arrives at the API as a webhook, so
//! for multi-segment videos this pipeline ends at `merging`.
//!
//! The pipeline is resumable: a re-delivered job skips completed segments
//! and re-attaches to vendor requests that are still in flight, so a
//! worker crash costs time but not vendor spend.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use adreel_firestore::{FirestoreClient, VideoRepository};
use adreel_models::{
    ActiveRenderJob, Segment, SegmentStatus, TeamId, VideoId, VideoRecord, VideoStatus,
    SEGMENT_SECONDS,
};
use adreel_queue::{JobStatusCache, ProgressChannel, RenderVideoJob};
use adreel_storage::R2Client;
use adreel_vendors::{
    merge_webhook_url, render_webhook_url, GenerationClient, MergeClient, PromptClient,
    RenderRequest, RenderStatus,
};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Lifetime of presigned image URLs handed to the render vendor.
const IMAGE_URL_TTL: Duration = Duration::from_secs(6 * 3600);

/// Lifetime of presigned segment URLs handed to the merge vendor.
const SEGMENT_URL_TTL: Duration = Duration::from_secs(6 * 3600);

/// Shared clients for the render pipeline.
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub storage: R2Client,
    pub firestore: FirestoreClient,
    pub progress: ProgressChannel,
    pub status_cache: JobStatusCache,
    pub generation: GenerationClient,
    pub merge: MergeClient,
    pub prompts: PromptClient,
}

impl ProcessingContext {
    /// Create a new processing context from the environment.
    pub async fn new(config: WorkerConfig) -> WorkerResult<Self> {
        let storage = R2Client::from_env()?;
        let firestore = FirestoreClient::from_env().await?;

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let progress = ProgressChannel::new(&redis_url)?;
        let status_cache = JobStatusCache::new(&redis_url)?;

        let generation = GenerationClient::new()?;
        let merge = MergeClient::new()?;
        let prompts = PromptClient::new()?;

        Ok(Self {
            config,
            storage,
            firestore,
            progress,
            status_cache,
            generation,
            merge,
            prompts,
        })
    }

    /// Video repository scoped to one team.
    pub fn video_repo(&self, team_id: &TeamId) -> VideoRepository {
        VideoRepository::new(self.firestore.clone(), team_id.clone())
    }
}

/// Run the full pipeline for one render job.
pub async fn render_video(ctx: &Arc<ProcessingContext>, job: &RenderVideoJob) -> WorkerResult<()> {
    let video_id = &job.video_id;
    let repo = ctx.video_repo(&job.team_id);

    let Some(record) = repo.get(video_id).await? else {
        // Deleted between enqueue and pickup; nothing left to do.
        warn!(video_id = %video_id, "Video record missing, dropping job");
        return Ok(());
    };

    if record.status.is_terminal() {
        info!(
            video_id = %video_id,
            status = %record.status,
            "Video already terminal, dropping job"
        );
        return Ok(());
    }

    let active = ActiveRenderJob::new(job.job_id.clone(), job.team_id.clone(), video_id.clone());
    ctx.status_cache.record_started(&active).await?;

    info!(
        video_id = %video_id,
        team_id = %job.team_id,
        segments = record.segments.len(),
        duration = record.duration_seconds,
        seed = record.seed,
        "Starting render"
    );

    let Some(record) = generate_prompts(ctx, &repo, record).await? else {
        return Ok(());
    };

    advance(ctx, &repo, video_id, record.status, VideoStatus::Rendering).await?;

    let total = record.segments.len() as u32;
    let mut completed = record
        .segments
        .iter()
        .filter(|s| s.status == SegmentStatus::Completed)
        .count() as u32;

    for segment in &record.segments {
        match segment.status {
            SegmentStatus::Completed => continue,
            // A previous attempt failed this segment but died before
            // failing the video; finish what it started.
            SegmentStatus::Failed => {
                let message = segment
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("Segment {} failed", segment.index));
                fail_video(ctx, &repo, video_id, &message).await;
                return Ok(());
            }
            _ => {}
        }

        match render_segment(ctx, &repo, &record, segment).await {
            Ok(()) => {
                completed += 1;
                ctx.progress
                    .segment_rendered(video_id, segment.index, completed, total)
                    .await
                    .ok();
            }
            Err(e) if e.is_retryable() => return Err(e),
            Err(e) => {
                // The vendor's verdict is final; mark the video failed and
                // consume the job.
                fail_video(ctx, &repo, video_id, &e.to_string()).await;
                return Ok(());
            }
        }
    }

    // Re-read to pick up the archived keys written during rendering.
    let record = repo
        .get(video_id)
        .await?
        .ok_or_else(|| WorkerError::job_failed("Video record vanished mid-render"))?;

    if record.plan().needs_merge() {
        submit_merge(ctx, &repo, &record).await?;
    } else {
        finish_single_segment(ctx, &repo, &record).await?;
    }

    Ok(())
}

/// Expand the base prompt into one motion prompt per segment.
///
/// Runs for fresh and prompt-stage resumed jobs; a job resumed past this
/// stage already has its prompts persisted. Returns `None` when prompt
/// generation failed permanently and the video has been marked failed.
async fn generate_prompts(
    ctx: &Arc<ProcessingContext>,
    repo: &VideoRepository,
    record: VideoRecord,
) -> WorkerResult<Option<VideoRecord>> {
    let video_id = record.video_id.clone();

    if !matches!(
        record.status,
        VideoStatus::Queued | VideoStatus::GeneratingPrompts
    ) {
        // A previous attempt got past this stage.
        return Ok(Some(record));
    }

    advance(
        ctx,
        repo,
        &video_id,
        record.status,
        VideoStatus::GeneratingPrompts,
    )
    .await?;

    let prompts = match ctx
        .prompts
        .generate_segment_prompts(&record.prompt, record.segments.len() as u32)
        .await
    {
        Ok(prompts) => prompts,
        Err(e) if e.is_retryable() => return Err(e.into()),
        Err(e) => {
            fail_video(
                ctx,
                repo,
                &video_id,
                &format!("Prompt generation failed: {}", e),
            )
            .await;
            return Ok(None);
        }
    };

    let mut record = record;
    for (segment, prompt) in record.segments.iter_mut().zip(prompts) {
        segment.prompt = prompt;
    }
    repo.set_segments(&video_id, &record.segments).await?;

    Ok(Some(record))
}

/// Render one segment: submit (or re-attach), poll to terminal, archive.
async fn render_segment(
    ctx: &Arc<ProcessingContext>,
    repo: &VideoRepository,
    record: &VideoRecord,
    segment: &Segment,
) -> WorkerResult<()> {
    let video_id = &record.video_id;
    let index = segment.index;

    let request_id = match &segment.vendor_request_id {
        // A previous attempt already paid for this render; poll it instead
        // of submitting again.
        Some(id) if !segment.status.is_terminal() => {
            info!(video_id = %video_id, segment = index, request_id = %id, "Re-attaching to vendor request");
            id.clone()
        }
        _ => submit_segment(ctx, repo, record, segment).await?,
    };

    let vendor_url = poll_segment(ctx, repo, video_id, index, &request_id).await?;

    let data = ctx.generation.download_output(&vendor_url).await?;
    let size = data.len();
    let key = ctx
        .storage
        .archive_segment(&record.team_id, video_id, index, data)
        .await?;

    repo.update_segment_with(video_id, index, |s| {
        Some(s.complete(vendor_url.clone()).archived(key.clone()))
    })
    .await?;

    info!(
        video_id = %video_id,
        segment = index,
        key = %key,
        bytes = size,
        "Segment archived"
    );
    Ok(())
}

/// Submit a segment to the render vendor and record the request id.
async fn submit_segment(
    ctx: &Arc<ProcessingContext>,
    repo: &VideoRepository,
    record: &VideoRecord,
    segment: &Segment,
) -> WorkerResult<String> {
    let video_id = &record.video_id;

    let image_url = ctx
        .storage
        .presign_get(&record.image_key, IMAGE_URL_TTL)
        .await?;

    let webhook_url = match ctx.config.webhook_config() {
        Some((base, secret)) => Some(render_webhook_url(
            base,
            video_id.as_str(),
            segment.index,
            secret,
        )?),
        None => None,
    };

    let request = RenderRequest {
        image_url,
        prompt: segment.prompt.clone(),
        seed: record.seed,
        duration_seconds: SEGMENT_SECONDS,
        aspect_ratio: record.aspect_ratio.as_str().to_string(),
        webhook_url,
    };

    let request_id = match ctx.generation.submit(&request).await {
        Ok(id) => id,
        Err(e) if e.is_retryable() => return Err(e.into()),
        Err(e) => {
            let message = format!("Segment {} submission rejected: {}", segment.index, e);
            repo.update_segment_with(video_id, segment.index, |s| {
                if s.status.is_terminal() {
                    None
                } else {
                    Some(s.fail(message.clone()))
                }
            })
            .await?;
            return Err(WorkerError::render_failed(message));
        }
    };

    repo.update_segment_with(video_id, segment.index, |s| {
        Some(s.submitted(request_id.clone()))
    })
    .await?;

    info!(
        video_id = %video_id,
        segment = segment.index,
        request_id = %request_id,
        "Segment submitted"
    );
    Ok(request_id)
}

/// Poll the vendor until the request is terminal.
///
/// Returns the output URL on completion. Heartbeats are written every
/// iteration so the sweeper can tell a slow render from a dead worker.
/// Transient status-poll errors are tolerated until the deadline.
async fn poll_segment(
    ctx: &Arc<ProcessingContext>,
    repo: &VideoRepository,
    video_id: &VideoId,
    index: u32,
    request_id: &str,
) -> WorkerResult<String> {
    let deadline = Instant::now() + ctx.config.segment_timeout;
    let mut marked_in_progress = false;

    loop {
        if Instant::now() >= deadline {
            let message = format!(
                "Segment {} timed out after {}s",
                index,
                ctx.config.segment_timeout.as_secs()
            );
            repo.update_segment_with(video_id, index, |s| {
                if s.status.is_terminal() {
                    None
                } else {
                    Some(s.fail(message.clone()))
                }
            })
            .await?;
            return Err(WorkerError::render_failed(message));
        }

        ctx.status_cache.heartbeat(video_id).await.ok();

        let payload = match ctx.generation.status(request_id).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    video_id = %video_id,
                    segment = index,
                    error = %e,
                    "Status poll failed, will retry"
                );
                tokio::time::sleep(ctx.config.poll_interval).await;
                continue;
            }
        };

        match payload.parsed()? {
            RenderStatus::InQueue => {}
            RenderStatus::InProgress => {
                if !marked_in_progress {
                    marked_in_progress = true;
                    repo.update_segment_with(video_id, index, |s| match s.status {
                        SegmentStatus::InQueue => Some(s.in_progress()),
                        _ => None,
                    })
                    .await?;
                }
            }
            RenderStatus::Completed => {
                return Ok(ctx.generation.result(request_id).await?);
            }
            RenderStatus::Failed => {
                let message = payload
                    .error
                    .unwrap_or_else(|| format!("Segment {} failed at the vendor", index));
                repo.update_segment_with(video_id, index, |s| {
                    if s.status.is_terminal() {
                        None
                    } else {
                        Some(s.fail(message.clone()))
                    }
                })
                .await?;
                return Err(WorkerError::render_failed(message));
            }
        }

        tokio::time::sleep(ctx.config.poll_interval).await;
    }
}

/// Submit the completed segments to the merge vendor and park the video in
/// `merging`. The merge webhook finishes it.
async fn submit_merge(
    ctx: &Arc<ProcessingContext>,
    repo: &VideoRepository,
    record: &VideoRecord,
) -> WorkerResult<()> {
    let video_id = &record.video_id;

    let (base, secret) = ctx.config.webhook_config().ok_or_else(|| {
        WorkerError::config_error(
            "PUBLIC_BASE_URL and WEBHOOK_SIGNING_SECRET are required for merge callbacks",
        )
    })?;

    let mut segment_urls = Vec::with_capacity(record.segments.len());
    for segment in &record.segments {
        let key = segment.output_key.as_deref().ok_or_else(|| {
            WorkerError::job_failed(format!("Segment {} has no archived output", segment.index))
        })?;
        segment_urls.push(ctx.storage.presign_get(key, SEGMENT_URL_TTL).await?);
    }

    let webhook_url = merge_webhook_url(base, video_id.as_str(), secret)?;
    let merge_request_id = ctx.merge.submit(&segment_urls, &webhook_url).await?;

    advance(ctx, repo, video_id, record.status, VideoStatus::Merging).await?;
    // Keep heartbeating reality: the job ends here, so refresh once more
    // and leave the active record for the webhook (or the sweeper).
    ctx.status_cache.heartbeat(video_id).await.ok();

    info!(
        video_id = %video_id,
        merge_request_id = %merge_request_id,
        segments = segment_urls.len(),
        "Merge submitted, awaiting callback"
    );
    Ok(())
}

/// A single-segment video needs no merge; its archived segment is the
/// final asset.
async fn finish_single_segment(
    ctx: &Arc<ProcessingContext>,
    repo: &VideoRepository,
    record: &VideoRecord,
) -> WorkerResult<()> {
    let video_id = &record.video_id;

    let segment = record
        .segments
        .first()
        .ok_or_else(|| WorkerError::job_failed("Video has no segments"))?;
    let key = segment
        .output_key
        .as_deref()
        .ok_or_else(|| WorkerError::job_failed("Segment has no archived output"))?;

    repo.complete_if_active(video_id, segment.vendor_output_url.as_deref(), Some(key))
        .await?;

    ctx.progress.done(video_id).await.ok();
    ctx.status_cache.record_finished(video_id).await.ok();

    info!(video_id = %video_id, key = %key, "Video completed");
    Ok(())
}

/// Move the video forward one stage and tell pollers.
///
/// No-op when the transition is not a legal forward move, so resumed jobs
/// never drag a record backward.
async fn advance(
    ctx: &Arc<ProcessingContext>,
    repo: &VideoRepository,
    video_id: &VideoId,
    current: VideoStatus,
    next: VideoStatus,
) -> WorkerResult<()> {
    if !current.can_transition_to(next) {
        return Ok(());
    }
    repo.advance_status(video_id, next).await?;
    ctx.progress.stage(video_id, next).await.ok();
    Ok(())
}

/// Mark the video failed and close out its progress stream.
///
/// Credits stay charged; the record keeps the error for the UI.
async fn fail_video(
    ctx: &Arc<ProcessingContext>,
    repo: &VideoRepository,
    video_id: &VideoId,
    message: &str,
) {
    match repo.fail_if_active(video_id, message).await {
        Ok(true) => {
            ctx.progress.error(video_id, message).await.ok();
        }
        Ok(false) => {
            info!(video_id = %video_id, "Video already terminal, skipping failure mark");
        }
        Err(e) => {
            warn!(video_id = %video_id, error = %e, "Failed to mark video failed");
        }
    }
    ctx.status_cache.record_finished(video_id).await.ok();
}
