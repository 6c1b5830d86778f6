//! Queue consumer driving the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vdet_models::TaskId;
use vdet_queue::{JobQueue, QueueJob};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::TaskLogger;
use crate::workflow::Orchestrator;

/// What to do with a message after its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Ack,
    /// Leave pending; redelivered once the visibility timeout lapses
    Retry,
    DeadLetter,
}

fn disposition(result: &WorkerResult<()>, attempts: u32, max_retries: u32) -> Disposition {
    match result {
        Ok(()) => Disposition::Ack,
        Err(e) if e.is_permanent() => Disposition::Ack,
        Err(_) if attempts >= max_retries => Disposition::DeadLetter,
        Err(_) => Disposition::Retry,
    }
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    orchestrator: Arc<Orchestrator>,
    task_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(queue: JobQueue, orchestrator: Orchestrator) -> Self {
        let config = orchestrator.config().clone();
        let task_semaphore = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            orchestrator: Arc::new(orchestrator),
            task_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Consume until shutdown, then wait for in-flight runs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent tasks",
            self.consumer_name, self.config.max_concurrent_tasks
        );

        self.queue.init().await?;

        let claim_task = self.spawn_claim_loop();
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight tasks to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_tasks())
            .await
            .is_err()
        {
            warn!(
                "In-flight tasks still running after {:?}, exiting",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically claim messages abandoned by crashed consumers.
    fn spawn_claim_loop(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let orchestrator = Arc::clone(&self.orchestrator);
        let semaphore = Arc::clone(&self.task_semaphore);
        let consumer_name = self.consumer_name.clone();
        let claim_interval = self.config.claim_interval;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let available = semaphore.available_permits();
                        if available == 0 {
                            continue;
                        }
                        match queue.claim_pending(&consumer_name, available).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Claimed {} pending jobs", jobs.len());
                                for (message_id, job) in jobs {
                                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                        break;
                                    };
                                    let orchestrator = Arc::clone(&orchestrator);
                                    let queue = Arc::clone(&queue);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(orchestrator, queue, message_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Failed to claim pending jobs: {}", e),
                        }
                    }
                }
            }
        })
    }

    /// Consume and dispatch new messages.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.task_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self.queue.consume(&self.consumer_name, available).await?;
        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let permit = Arc::clone(&self.task_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::config_error("task semaphore closed"))?;
            let orchestrator = Arc::clone(&self.orchestrator);
            let queue = Arc::clone(&self.queue);

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(orchestrator, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Run one message and settle it with the queue.
    async fn execute_job(
        orchestrator: Arc<Orchestrator>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: QueueJob,
    ) {
        let logger = TaskLogger::from_string(job.task_id(), "dispatch");
        let result = Self::process_job(&orchestrator, &job).await;

        let attempts = match &result {
            Err(e) if !e.is_permanent() => queue.increment_retry(&message_id).await.unwrap_or_else(|re| {
                warn!("Failed to record retry for {}: {}", message_id, re);
                u32::MAX
            }),
            _ => 0,
        };

        match disposition(&result, attempts, queue.max_retries()) {
            Disposition::Ack => {
                if let Err(e) = &result {
                    counter!("vdet_jobs_rejected_total").increment(1);
                    logger.log_error(&format!("Rejecting message {}: {}", message_id, e));
                }
                if let Err(e) = queue.ack(&message_id).await {
                    error!("Failed to ack message {}: {}", message_id, e);
                }
                if let Err(e) = queue.clear_dedup(&job).await {
                    warn!("Failed to clear dedup key for task {}: {}", job.task_id(), e);
                }
            }
            Disposition::Retry => {
                if let Err(e) = &result {
                    logger.log_warning(&format!(
                        "Run failed, will be redelivered (attempt {}/{}): {}",
                        attempts,
                        queue.max_retries(),
                        e
                    ));
                }
            }
            Disposition::DeadLetter => {
                let reason = result.err().map(|e| e.to_string()).unwrap_or_default();
                counter!("vdet_jobs_dead_lettered_total").increment(1);
                logger.log_error(&format!(
                    "Exceeded {} attempts, moving to DLQ: {}",
                    queue.max_retries(),
                    reason
                ));
                if let Err(e) = queue.dlq(&message_id, &job, &reason).await {
                    error!("Failed to move message {} to DLQ: {}", message_id, e);
                }
                if let Err(e) = queue.clear_dedup(&job).await {
                    warn!("Failed to clear dedup key for task {}: {}", job.task_id(), e);
                }
            }
        }
    }

    async fn process_job(orchestrator: &Orchestrator, job: &QueueJob) -> WorkerResult<()> {
        match job {
            QueueJob::DetectVideo(j) => {
                let task_id = TaskId::parse(&j.task_id)?;
                orchestrator.run(&task_id, &j.input_path, &j.output_path).await
            }
        }
    }

    /// Wait for all in-flight runs to complete.
    async fn wait_for_tasks(&self) {
        while self.task_semaphore.available_permits() < self.config.max_concurrent_tasks {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
