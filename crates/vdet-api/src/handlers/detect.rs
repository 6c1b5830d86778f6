//! Video submission.

use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vdet_queue::{DetectVideoJob, QueueError, QueueResult};
use vdet_storage::ArtifactGateway;

use crate::dispatch::TaskDispatcher;
use crate::error::{ApiError, ApiResult};
use crate::metrics::record_task_submitted;
use crate::security::{sanitize_filename, upload_extension};
use crate::state::AppState;

/// Multipart field carrying the video.
const FILE_FIELD: &str = "file";

/// Enqueue attempts before a submission is given up.
const ENQUEUE_ATTEMPTS: u32 = 3;

/// Base delay between enqueue attempts (milliseconds).
const ENQUEUE_RETRY_BASE_DELAY_MS: u64 = 100;

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: String,
    pub status: String,
}

/// An upload written to a temporary file in the upload directory.
struct ReceivedUpload {
    temp_path: PathBuf,
    filename: String,
    size: u64,
}

/// Accept a video upload, record the task and hand it to the workers.
pub async fn submit_detection(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some(FILE_FIELD) {
            upload = Some(receive_upload(&state.config.upload_dir, field).await?);
            break;
        }
    }
    let upload = upload.ok_or_else(|| ApiError::bad_request("Missing 'file' field"))?;

    let task = match state.ledger.create(upload.filename.as_str()).await {
        Ok(task) => task,
        Err(e) => {
            ArtifactGateway::cleanup(&upload.temp_path).await;
            return Err(e.into());
        }
    };

    let extension = upload_extension(&upload.filename);
    let input_path = state
        .config
        .upload_dir
        .join(format!("{}.{}", task.id, extension));
    let output_path = state
        .config
        .results_dir
        .join(format!("{}.{}", task.id, extension));

    if let Err(e) = tokio::fs::rename(&upload.temp_path, &input_path).await {
        ArtifactGateway::cleanup(&upload.temp_path).await;
        return Err(e.into());
    }

    let job = DetectVideoJob::new(task.id.to_string(), input_path.clone(), output_path);
    match dispatch_with_retry(state.dispatcher.as_ref(), job).await {
        Ok(message_id) => {
            record_task_submitted(upload.size);
            info!(
                task_id = %task.id,
                message_id = %message_id,
                filename = %upload.filename,
                bytes = upload.size,
                "Queued detection task"
            );
            Ok((
                StatusCode::ACCEPTED,
                Json(SubmitResponse {
                    task_id: task.id.to_string(),
                    status: task.status.as_str().to_string(),
                }),
            ))
        }
        Err(e) => {
            // QUEUED has no transition to FAILED, so the task stays QUEUED
            // with no job behind it
            warn!(task_id = %task.id, error = %e, "Failed to enqueue detection task");
            ArtifactGateway::cleanup(&input_path).await;
            Err(e.into())
        }
    }
}

/// Enqueue with a short linear backoff. Duplicates are not retried.
async fn dispatch_with_retry(
    dispatcher: &dyn TaskDispatcher,
    job: DetectVideoJob,
) -> QueueResult<String> {
    let mut attempt = 1;
    loop {
        match dispatcher.dispatch(job.clone()).await {
            Ok(message_id) => return Ok(message_id),
            Err(e @ QueueError::Duplicate(_)) => return Err(e),
            Err(e) if attempt < ENQUEUE_ATTEMPTS => {
                debug!(
                    task_id = %job.task_id,
                    attempt,
                    error = %e,
                    "Enqueue failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(
                    ENQUEUE_RETRY_BASE_DELAY_MS * attempt as u64,
                ))
                .await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Stream the field to `<dir>/.incoming-<uuid>.part`.
async fn receive_upload(dir: &Path, mut field: Field<'_>) -> ApiResult<ReceivedUpload> {
    let filename = sanitize_filename(field.file_name().unwrap_or_default());
    let temp_path = dir.join(format!(".incoming-{}.part", Uuid::new_v4()));

    let size = match write_field(&temp_path, &mut field).await {
        Ok(size) => size,
        Err(e) => {
            ArtifactGateway::cleanup(&temp_path).await;
            return Err(e);
        }
    };

    if size == 0 {
        ArtifactGateway::cleanup(&temp_path).await;
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }

    Ok(ReceivedUpload {
        temp_path,
        filename,
        size,
    })
}

async fn write_field(path: &Path, field: &mut Field<'_>) -> ApiResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut size = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?
    {
        file.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(size)
}
