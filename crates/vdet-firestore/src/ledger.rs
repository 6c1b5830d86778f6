//! Task ledger.
//!
//! Every status change goes through [`TaskLedger`], which rejects
//! transitions that would move a task backwards and writes the new state
//! before updating the caller's copy.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::info;

use vdet_models::{Task, TaskId, TaskStatus};

use crate::error::FirestoreError;
use crate::FirestoreResult;

/// Upper bound on stored failure text.
pub const MAX_ERROR_MESSAGE_LEN: usize = 1000;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("task {task_id}: illegal transition {from} -> {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("ledger store error: {0}")]
    Store(#[from] FirestoreError),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Store(e) => e.is_retryable(),
            LedgerError::InvalidTransition { .. } => false,
        }
    }
}

/// Single-entity persistence keyed by task id.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: &Task) -> FirestoreResult<()>;

    async fn fetch(&self, id: &TaskId) -> FirestoreResult<Option<Task>>;

    /// Persist status, result reference and error message of `task`.
    async fn write_status(&self, task: &Task) -> FirestoreResult<()>;
}

/// Durable task records with status-transition helpers.
#[derive(Clone)]
pub struct TaskLedger {
    store: Arc<dyn TaskStore>,
}

impl TaskLedger {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Create a QUEUED task for an uploaded file.
    pub async fn create(&self, input_filename: impl Into<String>) -> LedgerResult<Task> {
        let task = Task::new(input_filename);
        self.store.insert(&task).await?;
        info!(task_id = %task.id, filename = %task.input_filename, "Created task");
        Ok(task)
    }

    pub async fn get(&self, id: &TaskId) -> LedgerResult<Option<Task>> {
        Ok(self.store.fetch(id).await?)
    }

    pub async fn mark_processing(&self, task: &mut Task) -> LedgerResult<()> {
        self.transition(task, TaskStatus::Processing, None, None).await
    }

    pub async fn mark_completed(
        &self,
        task: &mut Task,
        result_reference: impl Into<String>,
    ) -> LedgerResult<()> {
        self.transition(task, TaskStatus::Completed, Some(result_reference.into()), None)
            .await
    }

    pub async fn mark_failed(
        &self,
        task: &mut Task,
        error_message: impl AsRef<str>,
    ) -> LedgerResult<()> {
        let message = truncate_message(error_message.as_ref());
        self.transition(task, TaskStatus::Failed, None, Some(message))
            .await
    }

    async fn transition(
        &self,
        task: &mut Task,
        next: TaskStatus,
        result_reference: Option<String>,
        error_message: Option<String>,
    ) -> LedgerResult<()> {
        if !task.status.can_transition_to(next) {
            return Err(LedgerError::InvalidTransition {
                task_id: task.id,
                from: task.status,
                to: next,
            });
        }

        let updated = Task {
            status: next,
            result_reference,
            error_message,
            ..task.clone()
        };
        self.store.write_status(&updated).await?;

        info!(
            task_id = %task.id,
            from = %task.status,
            to = %next,
            at = %Utc::now().to_rfc3339(),
            "Task status updated"
        );
        *task = updated;
        Ok(())
    }
}

fn truncate_message(message: &str) -> String {
    let message = message.trim();
    if message.len() <= MAX_ERROR_MESSAGE_LEN {
        return message.to_string();
    }
    let mut end = MAX_ERROR_MESSAGE_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &message[..end])
}
