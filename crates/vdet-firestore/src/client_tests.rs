//! Client and repository tests against a mock Firestore endpoint.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vdet_models::{Task, TaskId, TaskStatus};

use crate::client::{FirestoreClient, FirestoreConfig};
use crate::error::FirestoreError;
use crate::ledger::{TaskLedger, TaskStore};
use crate::retry::RetryConfig;
use crate::task_repo::TaskRepository;
use crate::token_cache::TokenCache;

const DOCS: &str = "/v1/projects/test-project/databases/testdb/documents";

fn test_config() -> FirestoreConfig {
    FirestoreConfig {
        project_id: "test-project".to_string(),
        database_id: "testdb".to_string(),
        emulator_host: None,
        timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
        retry: RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
    }
}

fn repository(server: &MockServer) -> TaskRepository {
    let client =
        FirestoreClient::with_origin(test_config(), &server.uri(), TokenCache::fixed("test-token"))
            .unwrap();
    TaskRepository::new(client)
}

fn task_document(id: &TaskId, status: &str) -> serde_json::Value {
    json!({
        "name": format!("projects/test-project/databases/testdb/documents/tasks/{}", id),
        "fields": {
            "status": {"stringValue": status},
            "input_filename": {"stringValue": "junction.mp4"},
            "result_url": {"stringValue": "results/junction.mp4"},
            "error_message": {"nullValue": null},
            "created_at": {"timestampValue": "2024-05-01T10:00:00Z"}
        }
    })
}

#[test]
fn test_error_from_http_status() {
    assert!(matches!(
        FirestoreError::from_http_status(429, "slow down"),
        FirestoreError::RateLimited(_)
    ));
    assert!(matches!(
        FirestoreError::from_http_status(503, "unavailable"),
        FirestoreError::ServerError(503, _)
    ));
    assert!(matches!(
        FirestoreError::from_http_status(404, "missing"),
        FirestoreError::NotFound(_)
    ));
    assert!(matches!(
        FirestoreError::from_http_status(409, "conflict"),
        FirestoreError::AlreadyExists(_)
    ));
    assert!(matches!(
        FirestoreError::from_http_status(400, "bad"),
        FirestoreError::RequestFailed(_)
    ));
}

#[test]
fn test_error_retryability() {
    assert!(FirestoreError::from_http_status(500, "boom").is_retryable());
    assert!(FirestoreError::from_http_status(429, "slow").is_retryable());
    assert!(!FirestoreError::from_http_status(400, "bad").is_retryable());
    assert!(!FirestoreError::from_http_status(404, "missing").is_retryable());
    assert_eq!(FirestoreError::RateLimited(2000).retry_after_ms(), Some(2000));
    assert_eq!(
        FirestoreError::ServerError(502, "bad gateway".into()).http_status(),
        Some(502)
    );
}

#[tokio::test]
async fn test_fetch_missing_task_returns_none() {
    let server = MockServer::start().await;
    let id = TaskId::new();

    Mock::given(method("GET"))
        .and(path(format!("{}/tasks/{}", DOCS, id)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": {"status": "NOT_FOUND"}})))
        .mount(&server)
        .await;

    let repo = repository(&server);
    assert!(repo.fetch(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_fetch_parses_task_document() {
    let server = MockServer::start().await;
    let id = TaskId::new();

    Mock::given(method("GET"))
        .and(path(format!("{}/tasks/{}", DOCS, id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_document(&id, "completed")))
        .mount(&server)
        .await;

    let task = repository(&server).fetch(&id).await.unwrap().unwrap();
    assert_eq!(task.id, id);
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.input_filename, "junction.mp4");
    assert_eq!(task.result_reference.as_deref(), Some("results/junction.mp4"));
    assert!(task.error_message.is_none());
}

#[tokio::test]
async fn test_fetch_retries_server_errors() {
    let server = MockServer::start().await;
    let id = TaskId::new();
    let doc_path = format!("{}/tasks/{}", DOCS, id);

    Mock::given(method("GET"))
        .and(path(doc_path.clone()))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(doc_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_document(&id, "queued")))
        .mount(&server)
        .await;

    let task = repository(&server).fetch(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
}

#[tokio::test]
async fn test_insert_creates_document_with_id() {
    let server = MockServer::start().await;
    let task = Task::new("junction.mp4");

    Mock::given(method("POST"))
        .and(path(format!("{}/tasks", DOCS)))
        .and(query_param("documentId", task.id.to_string()))
        .and(body_partial_json(json!({
            "fields": {
                "status": {"stringValue": "queued"},
                "input_filename": {"stringValue": "junction.mp4"}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_document(&task.id, "queued")))
        .expect(1)
        .mount(&server)
        .await;

    repository(&server).insert(&task).await.unwrap();
}

#[tokio::test]
async fn test_ledger_status_write_uses_update_mask() {
    let server = MockServer::start().await;
    let mut task = Task::new("junction.mp4");
    task.status = TaskStatus::Processing;

    Mock::given(method("PATCH"))
        .and(path(format!("{}/tasks/{}", DOCS, task.id)))
        .and(query_param("updateMask.fieldPaths", "status"))
        .and(query_param("updateMask.fieldPaths", "result_url"))
        .and(query_param("currentDocument.exists", "true"))
        .and(body_partial_json(json!({
            "fields": {
                "status": {"stringValue": "completed"},
                "result_url": {"stringValue": "results/out.mp4"}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_document(&task.id, "completed")))
        .expect(1)
        .mount(&server)
        .await;

    let ledger = TaskLedger::new(std::sync::Arc::new(repository(&server)));
    ledger.mark_completed(&mut task, "results/out.mp4").await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_status_write_on_missing_document_fails() {
    let server = MockServer::start().await;
    let mut task = Task::new("junction.mp4");

    Mock::given(method("PATCH"))
        .and(path(format!("{}/tasks/{}", DOCS, task.id)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let ledger = TaskLedger::new(std::sync::Arc::new(repository(&server)));
    let err = ledger.mark_processing(&mut task).await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(task.status, TaskStatus::Queued);
}
