//! Detection pipeline for a single task.
//!
//! One call to [`Orchestrator::run`] takes a queued task through
//! detection, artifact upload and the terminal ledger write. Local files
//! belonging to the run are removed whichever way it ends.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::Instrument;

use vdet_firestore::{FirestoreClient, TaskLedger, TaskRepository};
use vdet_media::{CliDetector, DetectionRequest, Detector, DetectorConfig};
use vdet_models::{AnalyticsReport, Task, TaskId, TaskStatus, VideoMeta};
use vdet_storage::{analytics_key, video_result_key, ArtifactGateway, S3Client};
use vdet_warehouse::AnalyticsWarehouse;

use crate::analytics::aggregate;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::TaskLogger;

/// Runs the detection pipeline against its collaborators.
pub struct Orchestrator {
    ledger: TaskLedger,
    detector: Arc<dyn Detector>,
    gateway: ArtifactGateway,
    warehouse: Arc<dyn AnalyticsWarehouse>,
    config: WorkerConfig,
}

impl Orchestrator {
    pub fn new(
        ledger: TaskLedger,
        detector: Arc<dyn Detector>,
        gateway: ArtifactGateway,
        warehouse: Arc<dyn AnalyticsWarehouse>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            ledger,
            detector,
            gateway,
            warehouse,
            config,
        }
    }

    /// Wire up Firestore, S3, the detection engine and the warehouse from
    /// the environment.
    pub async fn from_env(config: WorkerConfig) -> WorkerResult<Self> {
        let firestore = FirestoreClient::from_env()
            .await
            .map_err(|e| WorkerError::config_error(format!("Firestore: {}", e)))?;
        let ledger = TaskLedger::new(Arc::new(TaskRepository::new(firestore)));

        let detector = CliDetector::new(DetectorConfig::from_env())
            .map_err(|e| WorkerError::config_error(format!("Detector: {}", e)))?;

        let s3 = S3Client::from_env()
            .map_err(|e| WorkerError::config_error(format!("Storage: {}", e)))?;
        let gateway = ArtifactGateway::new(Arc::new(s3));

        let warehouse = vdet_warehouse::from_env()
            .await
            .map_err(|e| WorkerError::config_error(format!("Warehouse: {}", e)))?;

        Ok(Self::new(
            ledger,
            Arc::new(detector),
            gateway,
            warehouse,
            config,
        ))
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Process one task end to end.
    ///
    /// Returns `Ok` for every run that reached a terminal status, including
    /// failed detections, and for tasks that are absent or no longer
    /// queued. An `Err` means the ledger could not be written.
    pub async fn run(
        &self,
        task_id: &TaskId,
        input_path: &Path,
        output_path: &Path,
    ) -> WorkerResult<()> {
        let logger = TaskLogger::new(task_id, "detect_video");
        let span = logger.create_span();
        self.run_task(task_id, input_path, output_path, &logger)
            .instrument(span)
            .await
    }

    async fn run_task(
        &self,
        task_id: &TaskId,
        input_path: &Path,
        output_path: &Path,
        logger: &TaskLogger,
    ) -> WorkerResult<()> {
        let Some(mut task) = self.ledger.get(task_id).await? else {
            logger.log_warning("Task not found in ledger, ignoring dispatch");
            counter!("vdet_tasks_skipped_total", "reason" => "not_found").increment(1);
            return Ok(());
        };

        if task.status != TaskStatus::Queued {
            logger.log_warning(&format!("Task is already {}, ignoring dispatch", task.status));
            counter!("vdet_tasks_skipped_total", "reason" => "not_queued").increment(1);
            return Ok(());
        }

        logger.log_start(&task.input_filename);
        let start = Instant::now();

        if let Err(e) = self.ledger.mark_processing(&mut task).await {
            logger.log_error(&format!("Failed to mark task processing: {}", e));
            return Err(e.into());
        }

        let analytics_path = self.config.analytics_path(task_id);
        let outcome = self
            .execute(&task, input_path, output_path, &analytics_path, logger)
            .await;

        let terminal_write = match &outcome {
            Ok(video_key) => self.ledger.mark_completed(&mut task, video_key.as_str()).await,
            Err(e) => {
                logger.log_error(&e.to_string());
                self.ledger.mark_failed(&mut task, e.to_string()).await
            }
        };

        ArtifactGateway::cleanup_all(&[input_path, output_path, analytics_path.as_path()]).await;

        if let Err(e) = terminal_write {
            logger.log_error(&format!("Failed to record terminal status: {}", e));
            return Err(e.into());
        }

        histogram!("vdet_task_duration_seconds").record(start.elapsed().as_secs_f64());
        match outcome {
            Ok(video_key) => {
                counter!("vdet_tasks_completed_total").increment(1);
                logger.log_completion(&format!("Result stored at {}", video_key));
            }
            Err(_) => {
                counter!("vdet_tasks_failed_total").increment(1);
            }
        }
        Ok(())
    }

    /// Primary path. The first error short-circuits the remaining steps.
    async fn execute(
        &self,
        task: &Task,
        input_path: &Path,
        output_path: &Path,
        analytics_path: &Path,
        logger: &TaskLogger,
    ) -> WorkerResult<String> {
        let frames = self
            .detect(task, input_path, output_path, analytics_path)
            .await?;
        logger.log_step("detect", &format!("Processed {} frames", frames));

        let video_key = video_result_key(output_path)?;
        self.gateway.upload(output_path, &video_key).await?;
        logger.log_step("upload", &format!("Uploaded annotated video to {}", video_key));

        if tokio::fs::try_exists(analytics_path).await.unwrap_or(false) {
            let report_key = analytics_key(&task.id);
            self.gateway.upload(analytics_path, &report_key).await?;
            logger.log_step("upload", &format!("Uploaded analytics to {}", report_key));

            self.forward_to_warehouse(&task.id, analytics_path, logger)
                .await;
        }

        Ok(video_key)
    }

    /// Run the detector on the blocking pool, aggregate its frames and
    /// write the analytics artifact. Returns the number of frames seen.
    async fn detect(
        &self,
        task: &Task,
        input_path: &Path,
        output_path: &Path,
        analytics_path: &Path,
    ) -> WorkerResult<u64> {
        let detector = Arc::clone(&self.detector);
        let request = DetectionRequest::new(input_path, output_path)
            .with_confidence(self.config.confidence_threshold);
        let source_filename = task.input_filename.clone();
        let analytics_path = analytics_path.to_path_buf();

        let start = Instant::now();
        let result = tokio::task::spawn_blocking(move || -> WorkerResult<u64> {
            let run = detector.detect(&request)?;
            let meta = VideoMeta::new(
                source_filename,
                run.info.fps,
                run.info.total_frames,
                (run.info.width, run.info.height),
            );

            let mut frames = 0u64;
            let report = aggregate(run.frames.inspect(|_| frames += 1), meta)?;
            if frames == 0 {
                return Err(WorkerError::detection("no frames were processed"));
            }

            write_report(&analytics_path, &report)?;
            Ok(frames)
        })
        .await
        .map_err(|e| WorkerError::detection(format!("detection worker aborted: {}", e)))?;

        histogram!("vdet_detection_duration_seconds").record(start.elapsed().as_secs_f64());
        result
    }

    /// Best-effort warehouse insert. Failures are logged and dropped.
    async fn forward_to_warehouse(&self, task_id: &TaskId, analytics_path: &Path, logger: &TaskLogger) {
        let result: Result<(), String> = async {
            let bytes = tokio::fs::read(analytics_path)
                .await
                .map_err(|e| format!("failed to read analytics artifact: {}", e))?;
            let report: AnalyticsReport = serde_json::from_slice(&bytes)
                .map_err(|e| format!("failed to parse analytics artifact: {}", e))?;
            self.warehouse
                .insert_report(task_id, &report)
                .await
                .map_err(|e| e.to_string())
        }
        .await;

        match result {
            Ok(()) => logger.log_step("warehouse", "Report forwarded to warehouse"),
            Err(e) => {
                counter!("vdet_warehouse_forward_failures_total").increment(1);
                logger.log_warning(&format!("Warehouse insert failed: {}", e));
            }
        }
    }
}

fn write_report(path: &Path, report: &AnalyticsReport) -> WorkerResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            WorkerError::analytics(format!("failed to create {}: {}", parent.display(), e))
        })?;
    }
    let json = serde_json::to_vec_pretty(report)
        .map_err(|e| WorkerError::analytics(format!("failed to encode report: {}", e)))?;
    std::fs::write(path, json)
        .map_err(|e| WorkerError::analytics(format!("failed to write {}: {}", path.display(), e)))
}
