//! Error types for detection.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Detection engine not found: {0}")]
    EngineNotFound(String),

    #[error("Detection engine failed: {message}")]
    EngineFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Detection failed: {0}")]
    DetectionFailed(String),

    #[error("Malformed engine output: {0}")]
    Protocol(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn engine_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::EngineFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Message including captured stderr, for user-facing failure text.
    pub fn detail(&self) -> String {
        match self {
            MediaError::EngineFailed {
                stderr: Some(stderr),
                ..
            } if !stderr.trim().is_empty() => format!("{} ({})", self, stderr.trim()),
            other => other.to_string(),
        }
    }
}
