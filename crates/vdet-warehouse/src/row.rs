//! Flattened warehouse row for one report.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use vdet_models::{AnalyticsReport, TaskId};

use crate::error::WarehouseResult;

/// One row of the `daily_reports` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub task_id: String,
    pub filename: String,
    pub processed_at: String,
    pub duration_seconds: f64,
    pub total_vehicles: u64,
    /// `"none"` when nothing was detected
    pub dominant_class: String,
    /// Class distribution encoded as a JSON object string
    pub class_distribution_json: String,
}

impl ReportRow {
    pub fn from_report(
        task_id: &TaskId,
        report: &AnalyticsReport,
        processed_at: DateTime<Utc>,
    ) -> WarehouseResult<Self> {
        Ok(Self {
            task_id: task_id.to_string(),
            filename: report.meta.source_filename.clone(),
            processed_at: processed_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            duration_seconds: report.meta.duration_seconds,
            total_vehicles: report.summary.total_detection_count,
            dominant_class: report
                .summary
                .dominant_class
                .clone()
                .unwrap_or_else(|| "none".to_string()),
            class_distribution_json: serde_json::to_string(&report.summary.class_distribution)?,
        })
    }
}
