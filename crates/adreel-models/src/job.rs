//! Render job identifiers and liveness tracking.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::string_id;
use crate::team::TeamId;
use crate::video::VideoId;

string_id! {
    /// Unique identifier for a queued render job.
    pub struct JobId
}

/// Liveness record for an in-flight render job.
///
/// Workers write this to the status cache and refresh `last_heartbeat`
/// while they poll the vendor; the timeout sweeper fails anything whose
/// heartbeat goes stale.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ActiveRenderJob {
    /// Job being executed
    pub job_id: JobId,

    /// Team that owns the video
    pub team_id: TeamId,

    /// Video being generated
    pub video_id: VideoId,

    /// When the worker picked the job up
    pub started_at: DateTime<Utc>,

    /// Last time the worker reported progress
    pub last_heartbeat: DateTime<Utc>,
}

impl ActiveRenderJob {
    pub fn new(job_id: JobId, team_id: TeamId, video_id: VideoId) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            team_id,
            video_id,
            started_at: now,
            last_heartbeat: now,
        }
    }

    /// Refresh the heartbeat.
    pub fn touch(&mut self) {
        self.last_heartbeat = Utc::now();
    }

    /// Whether the job has gone silent. Jobs younger than `grace_secs`
    /// are never stale, so freshly claimed work isn't reaped before its
    /// first heartbeat.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold_secs: i64, grace_secs: i64) -> bool {
        let age = (now - self.started_at).num_seconds();
        if age < grace_secs {
            return false;
        }
        (now - self.last_heartbeat).num_seconds() > threshold_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job() -> ActiveRenderJob {
        ActiveRenderJob::new(
            JobId::new(),
            TeamId::from_string("team-1"),
            VideoId::from_string("video-1"),
        )
    }

    #[test]
    fn test_fresh_job_is_not_stale() {
        let j = job();
        assert!(!j.is_stale(Utc::now(), 300, 60));
    }

    #[test]
    fn test_grace_period_protects_new_jobs() {
        let mut j = job();
        // Heartbeat far in the past but the job just started.
        j.last_heartbeat = Utc::now() - Duration::seconds(1000);
        j.started_at = Utc::now() - Duration::seconds(30);
        assert!(!j.is_stale(Utc::now(), 300, 60));
    }

    #[test]
    fn test_silent_old_job_is_stale() {
        let mut j = job();
        j.started_at = Utc::now() - Duration::seconds(3600);
        j.last_heartbeat = Utc::now() - Duration::seconds(400);
        assert!(j.is_stale(Utc::now(), 300, 60));
    }

    #[test]
    fn test_touch_refreshes_heartbeat() {
        let mut j = job();
        j.started_at = Utc::now() - Duration::seconds(3600);
        j.last_heartbeat = Utc::now() - Duration::seconds(400);
        j.touch();
        assert!(!j.is_stale(Utc::now(), 300, 60));
    }
}
