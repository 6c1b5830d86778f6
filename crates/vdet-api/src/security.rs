//! Request authentication and upload name handling.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, Response};
use axum::middleware::Next;
use axum::response::IntoResponse;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the shared API key.
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Extension used when the upload name has none we can trust.
const DEFAULT_EXTENSION: &str = "mp4";

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Reject requests whose `X-API-KEY` does not match the configured key.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    let authorized = match (state.config.api_key.as_deref(), provided) {
        (Some(expected), Some(provided)) => {
            constant_time_eq(expected.as_bytes(), provided.as_bytes())
        }
        _ => false,
    };

    if !authorized {
        warn!(path = %request.uri().path(), "Rejected request with missing or invalid API key");
        return ApiError::forbidden("Could not validate credentials").into_response();
    }

    next.run(request).await
}

/// Final path component of a client-supplied filename.
pub fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned: String = base.chars().filter(|c| !c.is_control()).take(255).collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        format!("upload.{}", DEFAULT_EXTENSION)
    } else {
        cleaned
    }
}

/// Lowercase extension of an upload name, or `mp4` when absent or unusual.
pub fn upload_extension(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}
