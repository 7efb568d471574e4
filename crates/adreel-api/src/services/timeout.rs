//! Background sweeper for renders whose worker stopped heartbeating.
//!
//! Runs periodically to:
//! - Find active jobs with no recent heartbeat
//! - Fail videos whose worker died, and merges that missed their webhook
//! - Publish a terminal progress event for pollers
//! - Drop finished or orphaned entries from the active jobs set
//!
//! A job stays in the active set through the merge phase; the merge webhook
//! removes it on completion. A stale entry therefore means either a dead
//! worker or a merge callback that never arrived.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};

use adreel_firestore::{FirestoreClient, VideoRepository};
use adreel_models::{ActiveRenderJob, VideoStatus};
use adreel_queue::{
    JobStatusCache, ProgressChannel, STALE_GRACE_PERIOD_SECS, STALE_THRESHOLD_SECS,
};

use crate::metrics;

/// Interval between sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// How long a video may sit in `merging` after the worker's last heartbeat
/// before the merge webhook is considered lost.
const MERGE_DEADLINE_SECS: i64 = 600;

/// Message stored on videos failed by the sweeper.
const TIMEOUT_MESSAGE: &str =
    "Generation timed out. The worker may have crashed. Credits for this video are not refunded.";

/// Message for merges whose completion callback never arrived.
const MERGE_TIMEOUT_MESSAGE: &str =
    "Merging timed out waiting for the vendor callback. Credits for this video are not refunded.";

/// Stale render sweeper.
pub struct TimeoutSweeper {
    status_cache: Arc<JobStatusCache>,
    progress: Arc<ProgressChannel>,
    firestore: Arc<FirestoreClient>,
    enabled: bool,
}

impl TimeoutSweeper {
    /// Create a new sweeper. `ENABLE_STALE_DETECTION=false` disables it.
    pub fn new(
        status_cache: Arc<JobStatusCache>,
        progress: Arc<ProgressChannel>,
        firestore: Arc<FirestoreClient>,
    ) -> Self {
        let enabled = std::env::var("ENABLE_STALE_DETECTION")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        Self {
            status_cache,
            progress,
            firestore,
            enabled,
        }
    }

    /// Run the sweep loop until the process exits. Spawn as a background task.
    pub async fn run(&self) {
        if !self.enabled {
            info!("Stale render detection is disabled");
            return;
        }

        info!("Starting timeout sweeper (interval: {:?})", SWEEP_INTERVAL);

        let mut ticker = interval(SWEEP_INTERVAL);

        loop {
            ticker.tick().await;

            if let Err(e) = self.sweep().await {
                error!("Timeout sweep error: {}", e);
            }
        }
    }

    /// Run a single sweep cycle.
    async fn sweep(&self) -> anyhow::Result<()> {
        let active = self.status_cache.active_jobs().await?;

        if active.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut stale_count = 0u32;
        let mut recovered_count = 0u32;

        for job in active {
            if !job.is_stale(now, STALE_THRESHOLD_SECS, STALE_GRACE_PERIOD_SECS) {
                continue;
            }
            stale_count += 1;

            match self.recover(&job).await {
                Ok(true) => {
                    recovered_count += 1;
                    info!(
                        job_id = %job.job_id,
                        video_id = %job.video_id,
                        "Recovered stale render"
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    error!(job_id = %job.job_id, "Failed to recover stale render: {}", e);
                }
            }
        }

        if stale_count > 0 {
            info!(
                "Timeout sweep complete: {} stale, {} recovered",
                stale_count, recovered_count
            );
        }

        Ok(())
    }

    /// Decide what a stale active-set entry means and act on it.
    ///
    /// Returns `true` when a video was actually failed.
    async fn recover(&self, job: &ActiveRenderJob) -> anyhow::Result<bool> {
        let videos = VideoRepository::new((*self.firestore).clone(), job.team_id.clone());
        let now = Utc::now();

        let record = match videos.get(&job.video_id).await? {
            Some(r) => r,
            None => {
                // Record deleted while the job was in flight
                self.status_cache.record_finished(&job.video_id).await?;
                return Ok(false);
            }
        };

        if record.status.is_terminal() {
            // The webhook or worker finished it and only the set entry is left
            self.status_cache.record_finished(&job.video_id).await?;
            return Ok(false);
        }

        // Merging videos get a longer budget: the worker has already
        // handed off and the merge vendor may still call back.
        let message = if record.status == VideoStatus::Merging {
            let waited = (now - job.last_heartbeat).num_seconds();
            if waited <= MERGE_DEADLINE_SECS {
                return Ok(false);
            }
            warn!(
                video_id = %job.video_id,
                team_id = %job.team_id,
                waited_secs = waited,
                "Merge callback never arrived, failing video"
            );
            MERGE_TIMEOUT_MESSAGE
        } else {
            warn!(
                job_id = %job.job_id,
                video_id = %job.video_id,
                team_id = %job.team_id,
                last_heartbeat = %job.last_heartbeat,
                status = %record.status,
                "Detected stale render (no heartbeat)"
            );
            TIMEOUT_MESSAGE
        };

        let failed = videos.fail_if_active(&job.video_id, message).await?;
        if failed {
            self.progress.error(&job.video_id, message).await.ok();
            metrics::record_job_failed("render_video");
        }

        self.status_cache.record_finished(&job.video_id).await?;
        Ok(failed)
    }

    /// Run a single check (for manual invocation).
    pub async fn check_once(&self) -> anyhow::Result<(u32, u32)> {
        let active = self.status_cache.active_jobs().await?;
        let now = Utc::now();
        let mut stale_count = 0u32;
        let mut recovered_count = 0u32;

        for job in active {
            if job.is_stale(now, STALE_THRESHOLD_SECS, STALE_GRACE_PERIOD_SECS) {
                stale_count += 1;
                if matches!(self.recover(&job).await, Ok(true)) {
                    recovered_count += 1;
                }
            }
        }

        Ok((stale_count, recovered_count))
    }
}
