//! Job queue using Redis Streams.

use std::time::Duration;

use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::{DetectVideoJob, QueueJob};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Max deliveries before DLQ
    pub max_retries: u32,
    /// Idle time after which another consumer may claim a message
    pub visibility_timeout: Duration,
    /// XREADGROUP block time
    pub block_ms: u64,
    /// Lifetime of the enqueue dedup marker
    pub dedup_ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vdet:tasks".to_string(),
            consumer_group: "vdet-workers".to_string(),
            dlq_stream_name: "vdet:tasks:dlq".to_string(),
            max_retries: 3,
            visibility_timeout: Duration::from_secs(3600), // detection runs are long
            block_ms: 5000,
            dedup_ttl_secs: 86400,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_retries: env_parse("QUEUE_MAX_RETRIES").unwrap_or(defaults.max_retries),
            visibility_timeout: env_parse("QUEUE_VISIBILITY_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.visibility_timeout),
            block_ms: env_parse("QUEUE_BLOCK_MS").unwrap_or(defaults.block_ms),
            dedup_ttl_secs: env_parse("QUEUE_DEDUP_TTL_SECS").unwrap_or(defaults.dedup_ttl_secs),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn dedup_key(job: &QueueJob) -> String {
    format!("vdet:dedup:{}", job.task_id())
}

fn retry_key(message_id: &str) -> String {
    format!("vdet:retry:{}", message_id)
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Round-trip to Redis.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    /// Enqueue a detection job.
    pub async fn enqueue_detect(&self, job: DetectVideoJob) -> QueueResult<String> {
        self.enqueue(QueueJob::DetectVideo(job)).await
    }

    /// Enqueue a job.
    async fn enqueue(&self, job: QueueJob) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(&job)?;
        let idempotency_key = job.idempotency_key();

        // SET NX doubles as the duplicate check
        let dedup_key = dedup_key(&job);
        let fresh: Option<String> = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl_secs)
            .query_async(&mut conn)
            .await?;
        if fresh.is_none() {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::duplicate(idempotency_key));
        }

        let result: Result<String, redis::RedisError> = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await;

        let message_id = match result {
            Ok(id) => id,
            Err(e) => {
                // Release the marker so the caller can try again
                conn.del::<_, ()>(&dedup_key).await.ok();
                return Err(QueueError::enqueue_failed(e.to_string()));
            }
        };

        info!(
            task_id = %job.task_id(),
            message_id = %message_id,
            "Enqueued job"
        );

        Ok(message_id)
    }

    /// Remove the dedup marker for a job.
    pub async fn clear_dedup(&self, job: &QueueJob) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(dedup_key(job)).await?;
        Ok(())
    }

    /// Acknowledge a job (mark as completed).
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        conn.del::<_, ()>(retry_key(message_id)).await?;

        debug!("Acknowledged job: {}", message_id);
        Ok(())
    }

    /// Move a job to the dead letter queue.
    pub async fn dlq(&self, message_id: &str, job: &QueueJob, error: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;

        warn!(task_id = %job.task_id(), "Moved job to DLQ: {}", error);
        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Read new messages for this consumer.
    pub async fn consume(
        &self,
        consumer_name: &str,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueJob)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(self.config.block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entries = result
            .map(|reply| reply.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();

        Ok(self.decode_entries(entries).await)
    }

    /// Claim messages idle past the visibility timeout.
    /// This handles jobs from crashed workers.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueJob)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let min_idle_ms = self.config.visibility_timeout.as_millis() as u64;
        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let jobs = self.decode_entries(reply.claimed).await;
        for (_, job) in &jobs {
            info!(task_id = %job.task_id(), "Claimed pending job");
        }
        Ok(jobs)
    }

    /// Decode stream entries, acking any that cannot be parsed.
    async fn decode_entries(&self, entries: Vec<StreamId>) -> Vec<(String, QueueJob)> {
        let mut jobs = Vec::with_capacity(entries.len());

        for entry in entries {
            match decode_entry(&entry) {
                Ok(job) => {
                    debug!(task_id = %job.task_id(), "Consumed job {}", entry.id);
                    jobs.push((entry.id, job));
                }
                Err(e) => {
                    warn!("Failed to parse job payload {}: {}", entry.id, e);
                    // Ack the malformed message to prevent reprocessing
                    self.ack(&entry.id).await.ok();
                }
            }
        }

        jobs
    }

    /// Increment the delivery failure count for a message.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, 86400).await?;
        Ok(count)
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

fn decode_entry(entry: &StreamId) -> QueueResult<QueueJob> {
    match entry.map.get("job") {
        Some(redis::Value::BulkString(payload)) => Ok(serde_json::from_slice(payload)?),
        Some(redis::Value::SimpleString(payload)) => Ok(serde_json::from_str(payload)?),
        _ => Err(QueueError::enqueue_failed("message has no job field")),
    }
}
