//! Detection engine adapter.
//!
//! The detector runs an external engine that writes the annotated video
//! and streams per-frame detections back as newline-delimited JSON. The
//! frame stream is lazy and blocking; callers drive it off the async
//! runtime.

pub mod detector;
pub mod engine;
pub mod error;
pub mod protocol;

pub use detector::{
    DetectedFrame, DetectedObject, DetectionRequest, DetectionRun, Detector, FrameStream,
    VideoInfo, DEFAULT_CONFIDENCE_THRESHOLD,
};
pub use engine::{CliDetector, DetectorConfig};
pub use error::{MediaError, MediaResult};
