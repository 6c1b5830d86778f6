//! Job types for the queue.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run detection for one task.
///
/// The task id travels as the raw string from the message so that a
/// malformed id reaches the worker and can be rejected there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectVideoJob {
    pub task_id: String,
    /// Uploaded source video on shared disk
    pub input_path: PathBuf,
    /// Where the engine writes the annotated video
    pub output_path: PathBuf,
    pub enqueued_at: DateTime<Utc>,
}

impl DetectVideoJob {
    pub fn new(
        task_id: impl Into<String>,
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            input_path: input_path.into(),
            output_path: output_path.into(),
            enqueued_at: Utc::now(),
        }
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("detect:{}", self.task_id)
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    DetectVideo(DetectVideoJob),
}

impl QueueJob {
    pub fn task_id(&self) -> &str {
        match self {
            QueueJob::DetectVideo(j) => &j.task_id,
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::DetectVideo(j) => j.idempotency_key(),
        }
    }
}

impl From<DetectVideoJob> for QueueJob {
    fn from(job: DetectVideoJob) -> Self {
        QueueJob::DetectVideo(job)
    }
}
