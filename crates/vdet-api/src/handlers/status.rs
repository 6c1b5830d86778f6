//! Task status lookup.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use vdet_models::{TaskId, TaskStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
    /// Presigned URL of the annotated video, present once completed
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
}

pub async fn get_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let task_id =
        TaskId::parse(&task_id).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let task = state
        .ledger
        .get(&task_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    let result_url = match (&task.status, task.result_reference.as_deref()) {
        (TaskStatus::Completed, Some(key)) => {
            let url = state
                .gateway
                .presign(key, state.config.presign_ttl_secs)
                .await;
            Some(url).filter(|u| !u.is_empty())
        }
        _ => None,
    };

    Ok(Json(StatusResponse {
        task_id: task.id.to_string(),
        status: task.status,
        result_url,
        error_message: task.error_message,
        created_at: task.created_at.to_rfc3339(),
    }))
}
