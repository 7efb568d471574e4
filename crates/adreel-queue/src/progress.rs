//! Progress events and worker liveness via Redis.
//!
//! Two concerns live here:
//! - [`ProgressChannel`]: per-video pub/sub events with a short replayable
//!   history, so a client polling late still sees what happened
//! - [`JobStatusCache`]: active-job records with heartbeats; the timeout
//!   sweeper reads these to fail renders whose worker went silent

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use adreel_models::{ActiveRenderJob, VideoId, VideoStatus};

use crate::error::QueueResult;

/// Heartbeat silence after which a job counts as stale.
pub const STALE_THRESHOLD_SECS: i64 = 300;

/// Jobs younger than this are never stale, so a worker gets time to emit
/// its first heartbeat after claiming.
pub const STALE_GRACE_PERIOD_SECS: i64 = 120;

/// TTL on active-job records. Normally the worker deletes the record when
/// the job finishes; the TTL cleans up after crashes.
pub const JOB_STATUS_TTL_SECS: u64 = 86400;

/// TTL on the per-video progress history list.
pub const PROGRESS_HISTORY_TTL_SECS: u64 = 3600;

/// Keep at most this many history entries per video.
const PROGRESS_HISTORY_MAX: isize = 200;

// ============================================================================
// Progress events
// ============================================================================

/// One progress update for a video.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressUpdate {
    /// Video moved to a new lifecycle stage
    Stage {
        status: VideoStatus,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One segment finished rendering
    SegmentRendered {
        index: u32,
        completed: u32,
        total: u32,
    },

    /// Generation finished successfully
    Done { video_id: String },

    /// Generation failed
    Error {
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ProgressUpdate {
    pub fn stage(status: VideoStatus) -> Self {
        ProgressUpdate::Stage {
            status,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn segment_rendered(index: u32, completed: u32, total: u32) -> Self {
        ProgressUpdate::SegmentRendered {
            index,
            completed,
            total,
        }
    }

    pub fn done(video_id: impl Into<String>) -> Self {
        ProgressUpdate::Done {
            video_id: video_id.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProgressUpdate::Error {
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// True for updates that end the video's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressUpdate::Done { .. } | ProgressUpdate::Error { .. })
    }
}

/// Progress event published to Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Video the update belongs to
    pub video_id: VideoId,
    /// The update itself
    pub update: ProgressUpdate,
}

/// Channel for publishing/subscribing to progress events.
pub struct ProgressChannel {
    client: redis::Client,
}

impl ProgressChannel {
    /// Create a new progress channel.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Get the channel name for a video.
    pub fn channel_name(video_id: &VideoId) -> String {
        format!("progress:{}", video_id)
    }

    fn history_key(video_id: &VideoId) -> String {
        format!("adreel:progress:history:{}", video_id)
    }

    /// Publish a progress event and append it to the video's history.
    pub async fn publish(&self, event: &ProgressEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(&event.video_id);
        let payload = serde_json::to_string(event)?;

        debug!("Publishing progress event to {}", channel);
        conn.publish::<_, _, ()>(&channel, &payload).await?;

        let history = Self::history_key(&event.video_id);
        conn.rpush::<_, _, ()>(&history, &payload).await?;
        conn.ltrim::<_, ()>(&history, -PROGRESS_HISTORY_MAX, -1).await?;
        conn.expire::<_, ()>(&history, PROGRESS_HISTORY_TTL_SECS as i64)
            .await?;

        Ok(())
    }

    /// Publish a stage change.
    pub async fn stage(&self, video_id: &VideoId, status: VideoStatus) -> QueueResult<()> {
        self.publish(&ProgressEvent {
            video_id: video_id.clone(),
            update: ProgressUpdate::stage(status),
        })
        .await
    }

    /// Publish a segment completion.
    pub async fn segment_rendered(
        &self,
        video_id: &VideoId,
        index: u32,
        completed: u32,
        total: u32,
    ) -> QueueResult<()> {
        self.publish(&ProgressEvent {
            video_id: video_id.clone(),
            update: ProgressUpdate::segment_rendered(index, completed, total),
        })
        .await
    }

    /// Publish done message.
    pub async fn done(&self, video_id: &VideoId) -> QueueResult<()> {
        self.publish(&ProgressEvent {
            video_id: video_id.clone(),
            update: ProgressUpdate::done(video_id.as_str()),
        })
        .await
    }

    /// Publish error message.
    pub async fn error(&self, video_id: &VideoId, message: impl Into<String>) -> QueueResult<()> {
        self.publish(&ProgressEvent {
            video_id: video_id.clone(),
            update: ProgressUpdate::error(message),
        })
        .await
    }

    /// Recent events for a video, oldest first.
    pub async fn history(&self, video_id: &VideoId) -> QueueResult<Vec<ProgressEvent>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Vec<String> = conn.lrange(Self::history_key(video_id), 0, -1).await?;

        Ok(raw
            .iter()
            .filter_map(|payload| serde_json::from_str(payload).ok())
            .collect())
    }

    /// Subscribe to progress events for a video.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
        video_id: &VideoId,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = ProgressEvent> + Send>>>
    {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = Self::channel_name(video_id);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}

// ============================================================================
// Active job tracking
// ============================================================================

/// Cache of in-flight render jobs, keyed by video.
///
/// Workers write a record on claim, refresh its heartbeat while polling the
/// vendor, and delete it on completion. The sweeper lists records and fails
/// anything stale.
pub struct JobStatusCache {
    client: redis::Client,
}

impl JobStatusCache {
    const ACTIVE_SET_KEY: &'static str = "adreel:jobs:active";

    /// Create a new status cache.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    fn job_key(video_id: &VideoId) -> String {
        format!("adreel:jobs:status:{}", video_id)
    }

    /// Record that a worker picked up a job.
    pub async fn record_started(&self, job: &ActiveRenderJob) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;

        conn.set_ex::<_, _, ()>(Self::job_key(&job.video_id), payload, JOB_STATUS_TTL_SECS)
            .await?;
        conn.sadd::<_, _, ()>(Self::ACTIVE_SET_KEY, job.video_id.as_str())
            .await?;

        Ok(())
    }

    /// Look up the active record for a video, if one exists.
    pub async fn get(&self, video_id: &VideoId) -> QueueResult<Option<ActiveRenderJob>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(Self::job_key(video_id)).await?;

        Ok(raw.and_then(|raw| serde_json::from_str(&raw).ok()))
    }

    /// Refresh the heartbeat on a job. Returns false when no record exists
    /// (the job already finished or was swept).
    pub async fn heartbeat(&self, video_id: &VideoId) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = Self::job_key(video_id);

        let raw: Option<String> = conn.get(&key).await?;
        let Some(raw) = raw else {
            return Ok(false);
        };

        let mut job: ActiveRenderJob = match serde_json::from_str(&raw) {
            Ok(job) => job,
            Err(e) => {
                warn!("Dropping malformed active-job record for {}: {}", video_id, e);
                self.record_finished(video_id).await?;
                return Ok(false);
            }
        };

        job.touch();
        let payload = serde_json::to_string(&job)?;
        conn.set_ex::<_, _, ()>(&key, payload, JOB_STATUS_TTL_SECS).await?;

        Ok(true)
    }

    /// Remove the record for a finished job.
    pub async fn record_finished(&self, video_id: &VideoId) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        conn.del::<_, ()>(Self::job_key(video_id)).await?;
        conn.srem::<_, _, ()>(Self::ACTIVE_SET_KEY, video_id.as_str())
            .await?;

        Ok(())
    }

    /// All active render jobs. Index entries whose record expired are
    /// pruned on the way through.
    pub async fn active_jobs(&self) -> QueueResult<Vec<ActiveRenderJob>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let video_ids: Vec<String> = conn.smembers(Self::ACTIVE_SET_KEY).await?;
        let mut jobs = Vec::with_capacity(video_ids.len());

        for video_id in video_ids {
            let key = format!("adreel:jobs:status:{}", video_id);
            let raw: Option<String> = conn.get(&key).await?;

            match raw {
                Some(raw) => match serde_json::from_str::<ActiveRenderJob>(&raw) {
                    Ok(job) => jobs.push(job),
                    Err(e) => {
                        warn!("Skipping malformed active-job record for {}: {}", video_id, e);
                        conn.del::<_, ()>(&key).await?;
                        conn.srem::<_, _, ()>(Self::ACTIVE_SET_KEY, &video_id).await?;
                    }
                },
                None => {
                    conn.srem::<_, _, ()>(Self::ACTIVE_SET_KEY, &video_id).await?;
                }
            }
        }

        Ok(jobs)
    }

    /// Number of active render jobs.
    pub async fn active_count(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let count: u64 = conn.scard(Self::ACTIVE_SET_KEY).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_update_serialization() {
        let update = ProgressUpdate::stage(VideoStatus::Rendering);
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"type\":\"stage\""));
        assert!(json.contains("\"status\":\"rendering\""));
    }

    #[test]
    fn test_segment_rendered_roundtrip() {
        let event = ProgressEvent {
            video_id: VideoId::from_string("video-1"),
            update: ProgressUpdate::segment_rendered(1, 2, 3),
        };
        let json = serde_json::to_string(&event).unwrap();
        let decoded: ProgressEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.video_id.as_str(), "video-1");
        match decoded.update {
            ProgressUpdate::SegmentRendered {
                index,
                completed,
                total,
            } => {
                assert_eq!((index, completed, total), (1, 2, 3));
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn test_terminal_updates() {
        assert!(ProgressUpdate::done("v").is_terminal());
        assert!(ProgressUpdate::error("boom").is_terminal());
        assert!(!ProgressUpdate::stage(VideoStatus::Merging).is_terminal());
        assert!(!ProgressUpdate::segment_rendered(0, 1, 3).is_terminal());
    }
}
