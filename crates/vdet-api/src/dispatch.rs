//! Hand-off of accepted uploads to the worker queue.

use async_trait::async_trait;

use vdet_queue::{DetectVideoJob, JobQueue, QueueResult};

/// Sink for detection jobs.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Enqueue a job, returning the queue's message id.
    async fn dispatch(&self, job: DetectVideoJob) -> QueueResult<String>;

    /// Reachability probe for readiness checks.
    async fn ping(&self) -> QueueResult<()>;
}

#[async_trait]
impl TaskDispatcher for JobQueue {
    async fn dispatch(&self, job: DetectVideoJob) -> QueueResult<String> {
        self.enqueue_detect(job).await
    }

    async fn ping(&self) -> QueueResult<()> {
        JobQueue::ping(self).await
    }
}
