//! Structured task logging utilities.

use tracing::{error, info, warn, Span};
use vdet_models::TaskId;

/// Logger carrying the task id and operation on every event.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    operation: String,
}

impl TaskLogger {
    /// Create a logger for a task and operation (e.g. "detect_video").
    pub fn new(task_id: &TaskId, operation: &str) -> Self {
        Self::from_string(&task_id.to_string(), operation)
    }

    /// Create a logger from a raw id, e.g. one that failed to parse.
    pub fn from_string(task_id: &str, operation: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task started: {}", message
        );
    }

    /// Log a pipeline step.
    pub fn log_step(&self, step: &str, message: &str) {
        info!(
            task_id = %self.task_id,
            operation = %self.operation,
            step = step,
            "{}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task completed: {}", message
        );
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span wrapping one pipeline run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "task",
            task_id = %self.task_id,
            operation = %self.operation
        )
    }
}
