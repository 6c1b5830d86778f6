//! Artifact key conventions.
//!
//! Keys are reproducible from the run inputs alone:
//! - annotated video: `results/<output-file-basename>`
//! - analytics report: `analytics/<task_id>.json`

use std::path::Path;

use vdet_models::TaskId;

use crate::error::{StorageError, StorageResult};

/// Key for the annotated video produced at `output_path`.
pub fn video_result_key(output_path: impl AsRef<Path>) -> StorageResult<String> {
    let output_path = output_path.as_ref();
    let name = output_path
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            StorageError::invalid_key(format!(
                "output path has no file name: {}",
                output_path.display()
            ))
        })?;
    Ok(format!("results/{}", name))
}

/// Key for the analytics report of a task.
pub fn analytics_key(task_id: &TaskId) -> String {
    format!("analytics/{}.json", task_id)
}

/// Content type from the file extension.
pub fn content_type_for(path: impl AsRef<Path>) -> &'static str {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}
