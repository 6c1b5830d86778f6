//! Analytics report types.
//!
//! Field names on the wire follow the JSON artifact format consumed by the
//! reporting side (`frame_id`, `total_detections`, ...), while the Rust
//! names describe what the values are.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Object counts for a single frame that contained at least one detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDetection {
    /// Zero-based frame index
    #[serde(rename = "frame_id")]
    pub frame_index: u64,
    /// Position of the frame in the video
    #[serde(rename = "timestamp")]
    pub timestamp_seconds: f64,
    /// Label -> occurrences within this frame
    #[serde(rename = "objects")]
    pub object_counts: IndexMap<String, u64>,
}

/// Properties of the analysed video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub source_filename: String,
    pub fps: f64,
    #[serde(rename = "total_frames")]
    pub total_frame_count: u64,
    /// (width, height) in pixels
    pub resolution: (u32, u32),
    pub duration_seconds: f64,
}

impl VideoMeta {
    /// Build metadata, deriving the duration from frame count and fps.
    pub fn new(
        source_filename: impl Into<String>,
        fps: f64,
        total_frame_count: u64,
        resolution: (u32, u32),
    ) -> Self {
        Self {
            source_filename: source_filename.into(),
            fps,
            total_frame_count,
            resolution,
            duration_seconds: duration_for(total_frame_count, fps),
        }
    }

    /// Timestamp of a frame, or 0 when the frame rate is unknown.
    pub fn timestamp_for(&self, frame_index: u64) -> f64 {
        duration_for(frame_index, self.fps)
    }
}

fn duration_for(frames: u64, fps: f64) -> f64 {
    if fps > 0.0 && fps.is_finite() {
        frames as f64 / fps
    } else {
        0.0
    }
}

/// Totals across the whole video.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisSummary {
    #[serde(rename = "total_detections")]
    pub total_detection_count: u64,
    /// Labels in order of first occurrence
    pub unique_classes: Vec<String>,
    pub dominant_class: Option<String>,
    pub class_distribution: IndexMap<String, u64>,
}

/// Full analytics report for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub meta: VideoMeta,
    pub summary: AnalysisSummary,
    pub time_series: Vec<FrameDetection>,
}
