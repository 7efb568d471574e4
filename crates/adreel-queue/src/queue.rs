//! Render job queue on Redis Streams.
//!
//! Jobs are appended to a stream and handed to workers through a consumer
//! group, so a delivery stays pending until the worker acks it. Stalled
//! deliveries are recovered with `XAUTOCLAIM`; duplicate enqueues are fenced
//! with a short-lived `SET NX` key per video.

use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamPendingReply, StreamReadOptions,
    StreamReadReply,
};
use redis::{AsyncCommands, ExistenceCheck, SetExpiry, SetOptions};
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::{QueueJob, RenderVideoJob};

/// Dedup keys outlive any reasonable render so a crashed API retry
/// cannot double-enqueue the same video.
const DEDUP_TTL_SECS: u64 = 3600;

/// Retry counters expire on their own once a message stops being redelivered.
const RETRY_TTL_SECS: i64 = 86_400;

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream the API appends render jobs to
    pub stream_name: String,
    /// Consumer group workers read through
    pub consumer_group: String,
    /// Stream that collects jobs past their retry budget
    pub dlq_stream_name: String,
    /// Delivery attempts before a job is dead-lettered
    pub max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "adreel:jobs".to_string(),
            consumer_group: "adreel:workers".to_string(),
            dlq_stream_name: "adreel:dlq".to_string(),
            max_retries: 3,
        }
    }
}

impl QueueConfig {
    /// Read the configuration from the environment, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: env_string("REDIS_URL", &defaults.redis_url),
            stream_name: env_string("QUEUE_STREAM", &defaults.stream_name),
            consumer_group: env_string("QUEUE_CONSUMER_GROUP", &defaults.consumer_group),
            dlq_stream_name: env_string("QUEUE_DLQ_STREAM", &defaults.dlq_stream_name),
            max_retries: env_parse("QUEUE_MAX_RETRIES", defaults.max_retries),
        }
    }
}

/// Handle to the render job stream.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    async fn conn(&self) -> QueueResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn dedup_key(&self, idempotency_key: &str) -> String {
        format!("adreel:dedup:{idempotency_key}")
    }

    fn retry_key(&self, message_id: &str) -> String {
        format!("adreel:retry:{message_id}")
    }

    /// Create the consumer group, tolerating one that already exists.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let created: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(&self.config.stream_name, &self.config.consumer_group, "$")
            .await;

        match created {
            Ok(()) => info!(group = %self.config.consumer_group, "Created consumer group"),
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(group = %self.config.consumer_group, "Consumer group already exists");
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Enqueue a render job.
    pub async fn enqueue_render(&self, job: RenderVideoJob) -> QueueResult<String> {
        self.enqueue(QueueJob::RenderVideo(job)).await
    }

    async fn enqueue(&self, job: QueueJob) -> QueueResult<String> {
        let mut conn = self.conn().await?;

        let payload = serde_json::to_string(&job)?;
        let idempotency_key = job.idempotency_key();
        let dedup_key = self.dedup_key(&idempotency_key);

        // SET NX reserves the key and detects a duplicate in one step.
        let reserved: bool = conn
            .set_options(
                &dedup_key,
                "1",
                SetOptions::default()
                    .conditional_set(ExistenceCheck::NX)
                    .with_expiration(SetExpiry::EX(DEDUP_TTL_SECS)),
            )
            .await?;
        if !reserved {
            warn!(%idempotency_key, "Rejected duplicate render job");
            return Err(QueueError::duplicate_job(idempotency_key));
        }

        let appended: Result<String, redis::RedisError> = conn
            .xadd(
                &self.config.stream_name,
                "*",
                &[("job", payload.as_str()), ("key", idempotency_key.as_str())],
            )
            .await;

        let message_id = match appended {
            Ok(id) => id,
            Err(e) => {
                // Release the reservation so the caller can retry.
                conn.del::<_, ()>(&dedup_key).await.ok();
                return Err(QueueError::Redis(e));
            }
        };

        info!(job_id = %job.job_id(), %message_id, "Enqueued render job");
        Ok(message_id)
    }

    /// Remove the dedup key for a job so the same video can be re-enqueued.
    ///
    /// Called after a job reaches a terminal outcome (acked or dead-lettered).
    pub async fn clear_dedup(&self, job: &QueueJob) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(self.dedup_key(&job.idempotency_key()))
            .await?;
        Ok(())
    }

    /// Acknowledge a delivered job and drop it from the stream.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        conn.xack::<_, _, _, ()>(
            &self.config.stream_name,
            &self.config.consumer_group,
            &[message_id],
        )
        .await?;
        conn.xdel::<_, _, ()>(&self.config.stream_name, &[message_id])
            .await?;

        debug!(%message_id, "Acknowledged job");
        Ok(())
    }

    /// Move a job to the dead letter stream.
    pub async fn dlq(&self, message_id: &str, job: &QueueJob, error: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(job)?;

        conn.xadd::<_, _, _, _, ()>(
            &self.config.dlq_stream_name,
            "*",
            &[
                ("job", payload.as_str()),
                ("error", error),
                ("original_id", message_id),
            ],
        )
        .await?;

        // Drop the original only once the copy is in the DLQ.
        self.ack(message_id).await?;

        warn!(job_id = %job.job_id(), error, "Dead-lettered job");
        Ok(())
    }

    /// Number of jobs waiting in the stream.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.xlen(&self.config.stream_name).await?)
    }

    /// Number of dead-lettered jobs.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.xlen(&self.config.dlq_stream_name).await?)
    }

    /// Number of delivered-but-unacked messages in the consumer group.
    pub async fn pending_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let pending: StreamPendingReply = conn
            .xpending(&self.config.stream_name, &self.config.consumer_group)
            .await?;
        Ok(pending.count() as u64)
    }

    /// Read new jobs through the consumer group, blocking up to `block_ms`
    /// when the stream is empty. Returns `(message_id, job)` pairs.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueJob)>> {
        let mut conn = self.conn().await?;

        let options = StreamReadOptions::default()
            .group(&self.config.consumer_group, consumer_name)
            .count(count)
            .block(block_ms as usize);
        let reply: StreamReadReply = conn
            .xread_options(&[&self.config.stream_name], &[">"], &options)
            .await?;

        let entries: Vec<StreamId> = reply.keys.into_iter().flat_map(|key| key.ids).collect();
        self.decode_entries(entries).await
    }

    /// Take over deliveries that have sat unacked past `min_idle_ms`. This
    /// recovers jobs from crashed workers.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueJob)>> {
        let mut conn = self.conn().await?;

        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(
                &self.config.stream_name,
                &self.config.consumer_group,
                consumer_name,
                min_idle_ms,
                "0-0",
                StreamAutoClaimOptions::default().count(count),
            )
            .await?;

        if !reply.claimed.is_empty() {
            debug!(claimed = reply.claimed.len(), "Auto-claimed stalled deliveries");
        }
        self.decode_entries(reply.claimed).await
    }

    /// Pair stream entries with their decoded jobs. Entries that do not
    /// decode are acked away so they cannot wedge the group.
    async fn decode_entries(&self, entries: Vec<StreamId>) -> QueueResult<Vec<(String, QueueJob)>> {
        let mut jobs = Vec::with_capacity(entries.len());

        for entry in entries {
            let Some(payload) = entry.get::<String>("job") else {
                warn!(message_id = %entry.id, "Stream entry has no job field");
                self.ack(&entry.id).await.ok();
                continue;
            };
            match serde_json::from_str::<QueueJob>(&payload) {
                Ok(job) => jobs.push((entry.id, job)),
                Err(e) => {
                    warn!(message_id = %entry.id, "Discarding undecodable job payload: {e}");
                    self.ack(&entry.id).await.ok();
                }
            }
        }

        Ok(jobs)
    }

    /// Bump and return the delivery retry counter for a message.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.conn().await?;
        let key = self.retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, RETRY_TTL_SECS).await?;
        Ok(count)
    }

    /// Delivery attempts allowed before dead-lettering.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}
