//! Redis/Queue integration tests.

use std::time::Duration;

/// Test Redis connection and basic operations.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_connection() {
    dotenvy::dotenv().ok();

    let queue = adreel_queue::JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    // Test queue length (should not error)
    let len = queue.len().await.expect("Failed to get queue length");
    println!("Queue length: {}", len);
}

/// Test job enqueue and dequeue cycle.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_job_enqueue_dequeue() {
    use adreel_models::{TeamId, VideoId};
    use adreel_queue::RenderVideoJob;

    dotenvy::dotenv().ok();

    let queue = adreel_queue::JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    // Create a test job
    let job = RenderVideoJob::new(
        TeamId::from_string("test_team_123"),
        VideoId::new(),
        "test_user_123",
    );
    let job_id = job.job_id.clone();

    // Enqueue
    let message_id = queue.enqueue_render(job).await.expect("Failed to enqueue");
    println!("Enqueued job {} with message ID {}", job_id, message_id);

    // Consume
    let consumer_name = "test-consumer";
    let jobs = queue
        .consume(consumer_name, 1000, 1)
        .await
        .expect("Failed to consume");

    assert_eq!(jobs.len(), 1);
    let (msg_id, consumed_job) = &jobs[0];
    assert_eq!(consumed_job.job_id(), &job_id);

    // Acknowledge
    queue.ack(msg_id).await.expect("Failed to ack");
    println!("Job {} acknowledged", job_id);
}

/// Test that re-enqueueing the same video is rejected until the first job
/// settles.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_dedup() {
    use adreel_models::{TeamId, VideoId};
    use adreel_queue::{QueueJob, RenderVideoJob};

    dotenvy::dotenv().ok();

    let queue = adreel_queue::JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let team_id = TeamId::from_string("test_dedup_team");
    let video_id = VideoId::new();

    let first = RenderVideoJob::new(team_id.clone(), video_id.clone(), "test_user");
    queue
        .enqueue_render(first.clone())
        .await
        .expect("Failed to enqueue first job");

    // Same video again: rejected as a duplicate
    let second = RenderVideoJob::new(team_id, video_id, "test_user");
    let err = queue
        .enqueue_render(second)
        .await
        .expect_err("Duplicate enqueue should fail");
    assert!(err.is_duplicate());

    // After the dedup key is cleared the video can be queued again
    queue
        .clear_dedup(&QueueJob::RenderVideo(first.clone()))
        .await
        .expect("Failed to clear dedup");
    queue
        .enqueue_render(first)
        .await
        .expect("Failed to re-enqueue after clear");
}

/// Test DLQ functionality.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_dlq() {
    use adreel_models::{TeamId, VideoId};
    use adreel_queue::{QueueJob, RenderVideoJob};

    dotenvy::dotenv().ok();

    let queue = adreel_queue::JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    // Create and enqueue a job
    let job = RenderVideoJob::new(
        TeamId::from_string("test_dlq_team"),
        VideoId::new(),
        "test_dlq_user",
    );
    let job_id = job.job_id.clone();

    let message_id = queue
        .enqueue_render(job.clone())
        .await
        .expect("Failed to enqueue");

    // Consume it
    let consumer_name = "test-dlq-consumer";
    let jobs = queue
        .consume(consumer_name, 1000, 1)
        .await
        .expect("Failed to consume");
    assert!(!jobs.is_empty());

    // Move to DLQ
    let queue_job = QueueJob::RenderVideo(job);
    queue
        .dlq(&message_id, &queue_job, "Test error")
        .await
        .expect("Failed to move to DLQ");

    // Check DLQ length increased
    let dlq_len = queue.dlq_len().await.expect("Failed to get DLQ length");
    assert!(dlq_len > 0);
    println!("DLQ length: {} (job {})", dlq_len, job_id);
}

/// Test progress channel pub/sub.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_progress_channel() {
    use adreel_models::{VideoId, VideoStatus};
    use futures_util::StreamExt;

    dotenvy::dotenv().ok();

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let progress =
        adreel_queue::ProgressChannel::new(&redis_url).expect("Failed to create progress channel");
    let subscriber_channel =
        adreel_queue::ProgressChannel::new(&redis_url).expect("Failed to create progress channel");

    let video_id = VideoId::new();

    // Subscribe in a separate task
    let video_id_clone = video_id.clone();
    let subscriber = tokio::spawn(async move {
        let mut stream = subscriber_channel
            .subscribe(&video_id_clone)
            .await
            .expect("Failed to subscribe");
        let mut events = Vec::new();

        // Collect events with timeout
        let timeout = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(event) = stream.next().await {
                events.push(event);
                if events.len() >= 2 {
                    break;
                }
            }
        });

        let _ = timeout.await;
        events
    });

    // Give subscriber time to connect
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Publish some events
    progress
        .stage(&video_id, VideoStatus::Rendering)
        .await
        .ok();
    progress.segment_rendered(&video_id, 0, 1, 2).await.ok();

    // Wait for subscriber
    let events = subscriber.await.expect("Subscriber task failed");
    println!("Received {} events", events.len());

    // Events also land in the replayable history list
    let history = progress
        .history(&video_id)
        .await
        .expect("Failed to read history");
    assert!(history.len() >= 2);
}

/// Test active job tracking.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_job_status_cache() {
    use adreel_models::{ActiveRenderJob, JobId, TeamId, VideoId};

    dotenvy::dotenv().ok();

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let cache =
        adreel_queue::JobStatusCache::new(&redis_url).expect("Failed to create status cache");

    let video_id = VideoId::new();
    let job = ActiveRenderJob::new(
        JobId::new(),
        TeamId::from_string("test_status_team"),
        video_id.clone(),
    );

    // Record and read back
    cache
        .record_started(&job)
        .await
        .expect("Failed to record job start");
    let fetched = cache.get(&video_id).await.expect("Failed to get job");
    assert!(fetched.is_some());
    assert_eq!(fetched.unwrap().video_id, video_id);

    // Heartbeat succeeds while the record exists
    let beat = cache.heartbeat(&video_id).await.expect("Failed to heartbeat");
    assert!(beat);

    // Finish removes the record; later heartbeats report the loss
    cache
        .record_finished(&video_id)
        .await
        .expect("Failed to record finish");
    let gone = cache.get(&video_id).await.expect("Failed to get job");
    assert!(gone.is_none());

    let beat = cache.heartbeat(&video_id).await.expect("Failed to heartbeat");
    assert!(!beat);
}
