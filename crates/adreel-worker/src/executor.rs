//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use adreel_queue::{JobQueue, QueueJob};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::processor::{render_video, ProcessingContext};

/// Upper bound on jobs pulled per read, stalled or fresh.
const BATCH_SIZE: usize = 5;

/// How long a consume call blocks on an empty stream.
const CONSUME_BLOCK_MS: u64 = 1000;

/// Poll interval while waiting for a free slot or for drain.
const SLOT_POLL: Duration = Duration::from_millis(100);

/// Backoff after a failed consume round.
const CONSUME_BACKOFF: Duration = Duration::from_secs(5);

/// Pulls render jobs off the queue and runs them on a bounded pool.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: JobQueue) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.concurrency));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Run until shutdown is signalled, then drain in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            consumer = %self.consumer_name,
            concurrency = self.config.concurrency,
            "Starting job executor"
        );

        self.queue.init().await?;
        let ctx = Arc::new(ProcessingContext::new(self.config.clone()).await?);

        let reclaimer = tokio::spawn(Self::reclaim_stalled(
            Arc::clone(&self.queue),
            Arc::clone(&ctx),
            Arc::clone(&self.job_semaphore),
            self.consumer_name.clone(),
            self.config.claim_interval,
            self.config.claim_min_idle.as_millis() as u64,
            self.shutdown.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_batch(&ctx) => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {e}");
                        tokio::time::sleep(CONSUME_BACKOFF).await;
                    }
                }
            }
        }

        reclaimer.abort();

        info!("Waiting for in-flight jobs to finish");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.drain_in_flight()).await;

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// One read from the stream, dispatching everything it returns.
    async fn consume_batch(&self, ctx: &Arc<ProcessingContext>) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(SLOT_POLL).await;
            return Ok(());
        }

        let batch = self
            .queue
            .consume(&self.consumer_name, CONSUME_BLOCK_MS, available.min(BATCH_SIZE))
            .await?;

        for (message_id, job) in batch {
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;
            Self::spawn_job(Arc::clone(ctx), Arc::clone(&self.queue), permit, message_id, job);
        }

        Ok(())
    }

    /// Periodically take over deliveries stranded by crashed workers.
    async fn reclaim_stalled(
        queue: Arc<JobQueue>,
        ctx: Arc<ProcessingContext>,
        semaphore: Arc<Semaphore>,
        consumer_name: String,
        interval: Duration,
        min_idle_ms: u64,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let claimed = match queue
                        .claim_pending(&consumer_name, min_idle_ms, BATCH_SIZE)
                        .await
                    {
                        Ok(jobs) => jobs,
                        Err(e) => {
                            warn!("Failed to claim stalled jobs: {e}");
                            continue;
                        }
                    };
                    if claimed.is_empty() {
                        continue;
                    }

                    info!(count = claimed.len(), "Recovered stalled jobs");
                    for (message_id, job) in claimed {
                        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                            return;
                        };
                        Self::spawn_job(
                            Arc::clone(&ctx),
                            Arc::clone(&queue),
                            permit,
                            message_id,
                            job,
                        );
                    }
                }
            }
        }
    }

    /// Run a job on its own task, holding a concurrency permit for the
    /// duration.
    fn spawn_job(
        ctx: Arc<ProcessingContext>,
        queue: Arc<JobQueue>,
        permit: OwnedSemaphorePermit,
        message_id: String,
        job: QueueJob,
    ) {
        tokio::spawn(async move {
            let _permit = permit;
            Self::execute_job(ctx, queue, message_id, job).await;
        });
    }

    async fn execute_job(
        ctx: Arc<ProcessingContext>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: QueueJob,
    ) {
        let job_id = job.job_id().to_string();
        info!(%job_id, "Executing job");

        match Self::process_job(Arc::clone(&ctx), &job).await {
            Ok(()) => Self::finish_job(&queue, &message_id, &job, &job_id).await,
            Err(e) => Self::retry_or_bury(&ctx, &queue, &message_id, &job, &job_id, e).await,
        }
    }

    async fn finish_job(queue: &JobQueue, message_id: &str, job: &QueueJob, job_id: &str) {
        info!(%job_id, "Job completed");
        if let Err(e) = queue.ack(message_id).await {
            error!(%job_id, "Failed to ack job: {e}");
        }
        // Allow the same video to be enqueued again later.
        if let Err(e) = queue.clear_dedup(job).await {
            warn!(%job_id, "Failed to clear dedup key: {e}");
        }
    }

    async fn retry_or_bury(
        ctx: &Arc<ProcessingContext>,
        queue: &JobQueue,
        message_id: &str,
        job: &QueueJob,
        job_id: &str,
        error: WorkerError,
    ) {
        error!(%job_id, "Job failed: {error}");

        let budget = queue.max_retries();
        if error.is_retryable() {
            // If the retry counter is unreadable, bury instead of looping.
            let attempts = queue.increment_retry(message_id).await.unwrap_or(u32::MAX);
            if attempts < budget {
                info!(%job_id, attempts, budget, "Job left pending for redelivery");
                return;
            }
            warn!(%job_id, budget, "Retry budget exhausted, dead-lettering");
        } else {
            // Redelivery cannot fix these.
            warn!(%job_id, "Non-retryable failure, dead-lettering");
        }
        if let Err(e) = queue.dlq(message_id, job, &error.to_string()).await {
            error!(%job_id, "Failed to dead-letter job: {e}");
        }
        // Clear dedup so the video can be re-queued manually.
        if let Err(e) = queue.clear_dedup(job).await {
            warn!(%job_id, "Failed to clear dedup key: {e}");
        }

        Self::fail_dead_lettered(ctx, job, &error).await;
    }

    /// A dead-lettered job will never run again on its own, so the video it
    /// was driving must not stay live. Best-effort: the sweeper catches
    /// anything missed here.
    async fn fail_dead_lettered(ctx: &Arc<ProcessingContext>, job: &QueueJob, error: &WorkerError) {
        let video_id = job.video_id();
        let message = format!("Render job failed permanently: {}", error);

        let repo = ctx.video_repo(job.team_id());
        match repo.fail_if_active(video_id, &message).await {
            Ok(true) => {
                info!(video_id = %video_id, "Marked dead-lettered video failed");
            }
            Ok(false) => {}
            Err(e) => {
                warn!(video_id = %video_id, error = %e, "Failed to mark dead-lettered video failed");
            }
        }
        ctx.progress.error(video_id, message).await.ok();
        ctx.status_cache.record_finished(video_id).await.ok();
    }

    /// Block until every permit is back, i.e. no job is running.
    async fn drain_in_flight(&self) {
        while self.job_semaphore.available_permits() < self.config.concurrency {
            tokio::time::sleep(SLOT_POLL).await;
        }
    }

    async fn process_job(ctx: Arc<ProcessingContext>, job: &QueueJob) -> WorkerResult<()> {
        match job {
            QueueJob::RenderVideo(j) => render_video(&ctx, j).await,
        }
    }
}
