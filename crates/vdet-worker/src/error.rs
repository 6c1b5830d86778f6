//! Worker error types.

use thiserror::Error;

use vdet_firestore::LedgerError;
use vdet_media::MediaError;
use vdet_models::TaskIdError;
use vdet_queue::QueueError;
use vdet_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Ledger unavailable; the run cannot continue safely.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Detection failed: {0}")]
    Detection(String),

    #[error("Upload failed: {0}")]
    Upload(#[from] StorageError),

    #[error("Analytics artifact error: {0}")]
    Analytics(String),

    #[error("{0}")]
    InvalidTaskId(#[from] TaskIdError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl WorkerError {
    pub fn detection(msg: impl Into<String>) -> Self {
        Self::Detection(msg.into())
    }

    pub fn analytics(msg: impl Into<String>) -> Self {
        Self::Analytics(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Retrying the message cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(self, WorkerError::InvalidTaskId(_) | WorkerError::ConfigError(_))
    }

    /// The run stopped without writing a terminal status.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WorkerError::Ledger(_))
    }
}

impl From<MediaError> for WorkerError {
    fn from(e: MediaError) -> Self {
        WorkerError::Detection(e.detail())
    }
}
