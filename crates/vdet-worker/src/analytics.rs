//! Per-frame detections to analytics report.

use indexmap::IndexMap;

use vdet_media::{DetectedFrame, MediaResult};
use vdet_models::{AnalysisSummary, AnalyticsReport, FrameDetection, VideoMeta};

/// Incremental report builder fed one frame at a time.
#[derive(Debug)]
pub struct AnalyticsAggregator {
    meta: VideoMeta,
    totals: IndexMap<String, u64>,
    time_series: Vec<FrameDetection>,
    frames_processed: u64,
}

impl AnalyticsAggregator {
    pub fn new(meta: VideoMeta) -> Self {
        Self {
            meta,
            totals: IndexMap::new(),
            time_series: Vec::new(),
            frames_processed: 0,
        }
    }

    /// Count one frame's labels. Frames without detections only advance
    /// the processed-frame count.
    pub fn push_frame(&mut self, frame: &DetectedFrame) {
        self.frames_processed += 1;

        let mut counts: IndexMap<String, u64> = IndexMap::new();
        for label in frame.labels() {
            *counts.entry(label.to_string()).or_insert(0) += 1;
        }
        if counts.is_empty() {
            return;
        }

        for (label, count) in &counts {
            *self.totals.entry(label.clone()).or_insert(0) += count;
        }
        self.time_series.push(FrameDetection {
            frame_index: frame.index,
            timestamp_seconds: self.meta.timestamp_for(frame.index),
            object_counts: counts,
        });
    }

    /// Frames seen so far, with or without detections.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn finish(self) -> AnalyticsReport {
        let summary = AnalysisSummary {
            total_detection_count: self.totals.values().sum(),
            unique_classes: self.totals.keys().cloned().collect(),
            dominant_class: dominant_class(&self.totals),
            class_distribution: self.totals,
        };

        AnalyticsReport {
            meta: self.meta,
            summary,
            time_series: self.time_series,
        }
    }
}

/// Highest count wins; ties go to the label seen first.
fn dominant_class(totals: &IndexMap<String, u64>) -> Option<String> {
    let mut best: Option<(&String, u64)> = None;
    for (label, &count) in totals {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label.clone())
}

/// Drain a frame stream into a report. Stops at the first stream error.
pub fn aggregate<I>(frames: I, meta: VideoMeta) -> MediaResult<AnalyticsReport>
where
    I: IntoIterator<Item = MediaResult<DetectedFrame>>,
{
    let mut aggregator = AnalyticsAggregator::new(meta);
    for frame in frames {
        aggregator.push_frame(&frame?);
    }
    Ok(aggregator.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdet_media::{DetectedObject, MediaError};

    fn frame(index: u64, labels: &[&str]) -> MediaResult<DetectedFrame> {
        Ok(DetectedFrame {
            index,
            detections: labels
                .iter()
                .map(|l| DetectedObject {
                    label: l.to_string(),
                    confidence: 0.9,
                })
                .collect(),
        })
    }

    fn meta() -> VideoMeta {
        VideoMeta::new("junction.mp4", 10.0, 20, (1920, 1080))
    }

    #[test]
    fn test_car_and_truck_summary() {
        let report = aggregate(
            vec![frame(0, &["car", "car"]), frame(1, &["car", "truck"])],
            meta(),
        )
        .unwrap();

        assert_eq!(report.summary.total_detection_count, 4);
        assert_eq!(report.summary.class_distribution.get("car"), Some(&3));
        assert_eq!(report.summary.class_distribution.get("truck"), Some(&1));
        assert_eq!(report.summary.dominant_class.as_deref(), Some("car"));
        assert_eq!(report.summary.unique_classes, vec!["car", "truck"]);
        assert_eq!(report.time_series.len(), 2);
        assert_eq!(report.time_series[1].frame_index, 1);
        assert_eq!(report.time_series[1].timestamp_seconds, 0.1);
        assert_eq!(report.meta.duration_seconds, 2.0);
    }

    #[test]
    fn test_frames_without_detections() {
        let mut aggregator = AnalyticsAggregator::new(meta());
        for i in 0..5 {
            aggregator.push_frame(&frame(i, &[]).unwrap());
        }
        assert_eq!(aggregator.frames_processed(), 5);

        let report = aggregator.finish();
        assert!(report.time_series.is_empty());
        assert_eq!(report.summary.total_detection_count, 0);
        assert!(report.summary.dominant_class.is_none());
        assert!(report.summary.unique_classes.is_empty());
    }

    #[test]
    fn test_empty_frames_are_skipped_in_series() {
        let report = aggregate(
            vec![frame(0, &[]), frame(1, &["bus"]), frame(2, &[]), frame(3, &["bus", "car"])],
            meta(),
        )
        .unwrap();

        let indices: Vec<u64> = report.time_series.iter().map(|f| f.frame_index).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn test_dominant_class_tie_goes_to_first_seen() {
        let report = aggregate(
            vec![frame(0, &["truck"]), frame(1, &["car"]), frame(2, &["car", "truck"])],
            meta(),
        )
        .unwrap();
        assert_eq!(report.summary.dominant_class.as_deref(), Some("truck"));
    }

    #[test]
    fn test_frame_counts_keep_detection_order() {
        let report = aggregate(vec![frame(0, &["truck", "car", "truck"])], meta()).unwrap();
        let keys: Vec<&String> = report.time_series[0].object_counts.keys().collect();
        assert_eq!(keys, vec!["truck", "car"]);
        assert_eq!(report.time_series[0].object_counts["truck"], 2);
    }

    #[test]
    fn test_output_is_deterministic() {
        let frames = || vec![frame(0, &["car", "bus"]), frame(4, &["bus", "car", "bike"])];
        let a = serde_json::to_string(&aggregate(frames(), meta()).unwrap()).unwrap();
        let b = serde_json::to_string(&aggregate(frames(), meta()).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stream_error_stops_aggregation() {
        let frames = vec![frame(0, &["car"]), Err(MediaError::detection_failed("decoder died"))];
        assert!(aggregate(frames, meta()).is_err());
    }
}
