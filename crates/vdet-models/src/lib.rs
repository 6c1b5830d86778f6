//! Shared data models for the video detection backend.
//!
//! This crate provides Serde-serializable types for:
//! - Tasks and their status lifecycle
//! - Per-frame detections and the aggregated analytics report

pub mod analytics;
pub mod task;

pub use analytics::{AnalysisSummary, AnalyticsReport, FrameDetection, VideoMeta};
pub use task::{Task, TaskId, TaskIdError, TaskStatus};
