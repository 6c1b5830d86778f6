//! Redis Streams integration tests.
//!
//! Run with `REDIS_URL` pointing at a disposable instance.

use std::time::Duration;

use vdet_queue::{DetectVideoJob, JobQueue, QueueConfig, QueueError};

/// A queue on streams no other test or worker touches.
async fn isolated_queue() -> JobQueue {
    dotenvy::dotenv().ok();

    let suffix = uuid::Uuid::new_v4();
    let config = QueueConfig {
        stream_name: format!("vdet:test:{}", suffix),
        dlq_stream_name: format!("vdet:test:{}:dlq", suffix),
        consumer_group: "vdet-test".to_string(),
        block_ms: 100,
        visibility_timeout: Duration::from_millis(50),
        ..QueueConfig::from_env()
    };
    let queue = JobQueue::new(config).expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");
    queue
}

fn job() -> DetectVideoJob {
    DetectVideoJob::new(
        uuid::Uuid::new_v4().to_string(),
        "data/uploads/in.mp4",
        "data/results/in.mp4",
    )
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_connection() {
    let queue = isolated_queue().await;
    queue.ping().await.expect("Failed to ping");
    assert_eq!(queue.len().await.expect("Failed to get queue length"), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_consume_ack() {
    let queue = isolated_queue().await;
    let job = job();
    let task_id = job.task_id.clone();

    queue.enqueue_detect(job).await.expect("Failed to enqueue");

    let jobs = queue.consume("consumer-a", 1).await.expect("Failed to consume");
    assert_eq!(jobs.len(), 1);
    let (message_id, consumed) = &jobs[0];
    assert_eq!(consumed.task_id(), task_id);

    queue.ack(message_id).await.expect("Failed to ack");
    queue.clear_dedup(consumed).await.expect("Failed to clear dedup");
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_duplicate_enqueue_is_rejected() {
    let queue = isolated_queue().await;
    let job = job();

    queue.enqueue_detect(job.clone()).await.expect("Failed to enqueue");
    let err = queue.enqueue_detect(job).await.unwrap_err();
    assert!(matches!(err, QueueError::Duplicate(_)));
    assert_eq!(queue.len().await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_abandoned_message_is_claimed() {
    let queue = isolated_queue().await;
    queue.enqueue_detect(job()).await.expect("Failed to enqueue");

    let first = queue.consume("crashed", 1).await.unwrap();
    assert_eq!(first.len(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let claimed = queue.claim_pending("survivor", 10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].0, first[0].0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_dlq() {
    let queue = isolated_queue().await;
    queue.enqueue_detect(job()).await.expect("Failed to enqueue");

    let (message_id, job) = queue.consume("consumer-a", 1).await.unwrap().remove(0);
    for attempt in 1..=queue.max_retries() {
        assert_eq!(queue.increment_retry(&message_id).await.unwrap(), attempt);
    }

    queue
        .dlq(&message_id, &job, "engine crashed")
        .await
        .expect("Failed to move to DLQ");
    assert_eq!(queue.dlq_len().await.unwrap(), 1);
    assert_eq!(queue.len().await.unwrap(), 0);
}
