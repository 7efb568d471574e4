//! Job types for the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use adreel_models::{JobId, TeamId, VideoId};

/// Job to generate one video end to end.
///
/// This is the unit of work the worker pulls from the stream: expand the
/// prompt, render every segment, merge, archive. The video document is
/// created by the API before the job is enqueued, so the job only carries
/// identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderVideoJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Team that owns the video (and was charged for it)
    pub team_id: TeamId,
    /// Video document to drive
    pub video_id: VideoId,
    /// User who requested the generation
    pub requested_by: String,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl RenderVideoJob {
    /// Create a new render job.
    pub fn new(team_id: TeamId, video_id: VideoId, requested_by: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(),
            team_id,
            video_id,
            requested_by: requested_by.into(),
            created_at: Utc::now(),
        }
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("render:{}:{}", self.team_id, self.video_id)
    }
}

/// Generic job wrapper for queue storage.
///
/// Serialized with a `type` tag so new job kinds can be added without
/// breaking in-flight payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    /// Generate a full video from its stored parameters
    RenderVideo(RenderVideoJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::RenderVideo(j) => &j.job_id,
        }
    }

    pub fn team_id(&self) -> &TeamId {
        match self {
            QueueJob::RenderVideo(j) => &j.team_id,
        }
    }

    pub fn video_id(&self) -> &VideoId {
        match self {
            QueueJob::RenderVideo(j) => &j.video_id,
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::RenderVideo(j) => j.idempotency_key(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_job_serde_roundtrip() {
        let job = RenderVideoJob::new(
            TeamId::from_string("team-1"),
            VideoId::from_string("video-1"),
            "user-1",
        );

        let wrapper = QueueJob::RenderVideo(job.clone());
        let json = serde_json::to_string(&wrapper).expect("serialize QueueJob");
        assert!(json.contains("\"type\":\"render_video\""));

        let decoded: QueueJob = serde_json::from_str(&json).expect("deserialize QueueJob");
        match decoded {
            QueueJob::RenderVideo(j) => {
                assert_eq!(j.job_id, job.job_id);
                assert_eq!(j.team_id, job.team_id);
                assert_eq!(j.video_id, job.video_id);
                assert_eq!(j.requested_by, job.requested_by);
                assert_eq!(j.created_at, job.created_at);
            }
        }
    }

    #[test]
    fn test_idempotency_key_is_stable_per_video() {
        let a = RenderVideoJob::new(
            TeamId::from_string("team-1"),
            VideoId::from_string("video-1"),
            "user-1",
        );
        let b = RenderVideoJob::new(
            TeamId::from_string("team-1"),
            VideoId::from_string("video-1"),
            "user-2",
        );

        // Same team and video dedupe regardless of job id or requester.
        assert_eq!(a.idempotency_key(), b.idempotency_key());
        assert_ne!(a.job_id, b.job_id);
    }
}
