//! Engine stdout protocol.
//!
//! One JSON object per line:
//!
//! ```text
//! {"type":"meta","fps":30.0,"total_frames":900,"width":1920,"height":1080}
//! {"type":"frame","index":0,"detections":[{"label":"car","confidence":0.91}]}
//! {"type":"error","message":"cuda out of memory"}
//! ```
//!
//! Lines that do not start with `{` are engine chatter and are ignored, as
//! are JSON events of any other `type` (progress reports and the like).

use serde::Deserialize;

use crate::detector::{DetectedFrame, VideoInfo};
use crate::error::{MediaError, MediaResult};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Meta(VideoInfo),
    Frame(DetectedFrame),
    Error { message: String },
}

/// Wire form, with a catch-all for event types this side does not consume.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Meta(VideoInfo),
    Frame(DetectedFrame),
    Error {
        message: String,
    },
    #[serde(other)]
    Unknown,
}

/// Parse one stdout line. `Ok(None)` for blank lines, non-JSON chatter and
/// unrecognised event types.
pub fn parse_line(line: &str) -> MediaResult<Option<EngineEvent>> {
    let line = line.trim();
    if !line.starts_with('{') {
        return Ok(None);
    }
    let event: WireEvent = serde_json::from_str(line)
        .map_err(|e| MediaError::protocol(format!("{}: {}", e, truncate(line, 200))))?;
    Ok(match event {
        WireEvent::Meta(info) => Some(EngineEvent::Meta(info)),
        WireEvent::Frame(frame) => Some(EngineEvent::Frame(frame)),
        WireEvent::Error { message } => Some(EngineEvent::Error { message }),
        WireEvent::Unknown => None,
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
