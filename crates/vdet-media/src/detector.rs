//! Detector contract.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::MediaResult;

/// Default minimum confidence for a detection to be reported.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;

/// Input to one detection run.
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    pub input_path: PathBuf,
    /// Where the annotated video is written
    pub output_path: PathBuf,
    pub confidence_threshold: f32,
}

impl DetectionRequest {
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_confidence(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }
}

/// Container properties reported by the engine before the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub fps: f64,
    pub total_frames: u64,
    pub width: u32,
    pub height: u32,
}

/// One classified object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    pub confidence: f32,
}

/// Detections for one frame, in the order the engine emitted them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFrame {
    pub index: u64,
    #[serde(default)]
    pub detections: Vec<DetectedObject>,
}

impl DetectedFrame {
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.detections.iter().map(|d| d.label.as_str())
    }
}

/// Lazy, single-pass stream of frames. An `Err` item ends the run.
pub type FrameStream = Box<dyn Iterator<Item = MediaResult<DetectedFrame>> + Send>;

/// A started detection run.
pub struct DetectionRun {
    pub info: VideoInfo,
    pub frames: FrameStream,
}

impl std::fmt::Debug for DetectionRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionRun").field("info", &self.info).finish_non_exhaustive()
    }
}

/// Frame-by-frame object detector.
///
/// Implementations block the calling thread; run them on a blocking pool.
pub trait Detector: Send + Sync {
    fn detect(&self, request: &DetectionRequest) -> MediaResult<DetectionRun>;
}
