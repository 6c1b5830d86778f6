//! Router tests against in-memory collaborators.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use vdet_firestore::{FirestoreResult, TaskLedger, TaskStore};
use vdet_models::{Task, TaskId, TaskStatus};
use vdet_queue::{DetectVideoJob, QueueError, QueueResult};
use vdet_storage::{ArtifactGateway, ObjectStore, StorageError, StorageResult};

use crate::config::ApiConfig;
use crate::dispatch::TaskDispatcher;
use crate::routes::create_router;
use crate::security::API_KEY_HEADER;
use crate::state::AppState;

const KEY: &str = "test-key";
const BOUNDARY: &str = "vdet-test-boundary";

#[derive(Default)]
struct MemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, task: &Task) -> FirestoreResult<()> {
        self.tasks.lock().unwrap().insert(task.id, task.clone());
        Ok(())
    }

    async fn fetch(&self, id: &TaskId) -> FirestoreResult<Option<Task>> {
        Ok(self.tasks.lock().unwrap().get(id).cloned())
    }

    async fn write_status(&self, task: &Task) -> FirestoreResult<()> {
        self.tasks.lock().unwrap().insert(task.id, task.clone());
        Ok(())
    }
}

#[derive(Default)]
struct FakeObjectStore {
    fail_presign: AtomicBool,
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn put_file(&self, _path: &Path, _key: &str, _content_type: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        if self.fail_presign.load(Ordering::SeqCst) {
            return Err(StorageError::presign_failed("signing key missing"));
        }
        Ok(format!("https://storage.test/{}?ttl={}", key, ttl.as_secs()))
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    jobs: Mutex<Vec<DetectVideoJob>>,
    fail: AtomicBool,
    /// Dispatches that fail before one goes through
    transient_failures: AtomicUsize,
    attempts: AtomicUsize,
}

#[async_trait]
impl TaskDispatcher for RecordingDispatcher {
    async fn dispatch(&self, job: DetectVideoJob) -> QueueResult<String> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(QueueError::enqueue_failed("redis unavailable"));
        }
        let pending = self.transient_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_failures.store(pending - 1, Ordering::SeqCst);
            return Err(QueueError::enqueue_failed("connection reset"));
        }
        self.jobs.lock().unwrap().push(job);
        Ok("1-0".to_string())
    }

    async fn ping(&self) -> QueueResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(QueueError::enqueue_failed("redis unavailable"));
        }
        Ok(())
    }
}

struct Harness {
    app: Router,
    ledger: TaskLedger,
    store: Arc<MemoryTaskStore>,
    objects: Arc<FakeObjectStore>,
    dispatcher: Arc<RecordingDispatcher>,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self::with_key(Some(KEY))
    }

    fn with_key(api_key: Option<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let upload_dir = dir.path().join("uploads");
        let results_dir = dir.path().join("results");
        std::fs::create_dir_all(&upload_dir).unwrap();
        std::fs::create_dir_all(&results_dir).unwrap();

        let config = ApiConfig {
            api_key: api_key.map(str::to_string),
            upload_dir,
            results_dir,
            ..ApiConfig::default()
        };

        let store = Arc::new(MemoryTaskStore::default());
        let objects = Arc::new(FakeObjectStore::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let ledger = TaskLedger::new(store.clone());

        let state = AppState::new(
            config,
            ledger.clone(),
            ArtifactGateway::new(objects.clone()),
            dispatcher.clone(),
        );

        Self {
            app: create_router(state, None),
            ledger,
            store,
            objects,
            dispatcher,
            dir,
        }
    }

    fn upload_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("uploads")
    }

    fn uploads(&self) -> Vec<String> {
        std::fs::read_dir(self.upload_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    fn jobs(&self) -> Vec<DetectVideoJob> {
        self.dispatcher.jobs.lock().unwrap().clone()
    }

    fn task_count(&self) -> usize {
        self.store.tasks.lock().unwrap().len()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }
}

fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: video/mp4\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn submit(key: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/detect")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(key) = key {
        builder = builder.header(API_KEY_HEADER, key);
    }
    builder.body(Body::from(body)).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_submit_requires_api_key() {
    let h = Harness::new();
    let body = || multipart_body("file", "junction.mp4", b"video");

    let (status, json) = h.send(submit(None, body())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["detail"], "Could not validate credentials");

    let (status, _) = h.send(submit(Some("wrong-key"), body())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(h.task_count(), 0);
    assert!(h.jobs().is_empty());
}

#[tokio::test]
async fn test_submit_refused_when_no_key_configured() {
    let h = Harness::with_key(None);
    let (status, _) = h
        .send(submit(Some(""), multipart_body("file", "junction.mp4", b"video")))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_submit_without_file_field() {
    let h = Harness::new();
    let (status, json) = h
        .send(submit(Some(KEY), multipart_body("attachment", "junction.mp4", b"video")))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["detail"], "Missing 'file' field");
    assert_eq!(h.task_count(), 0);
}

#[tokio::test]
async fn test_submit_empty_file() {
    let h = Harness::new();
    let (status, _) = h
        .send(submit(Some(KEY), multipart_body("file", "junction.mp4", b"")))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.task_count(), 0);
    assert!(h.uploads().is_empty());
}

#[tokio::test]
async fn test_submit_creates_task_and_job() {
    let h = Harness::new();
    let (status, json) = h
        .send(submit(Some(KEY), multipart_body("file", "Junction.MOV", b"video-bytes")))
        .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "queued");

    let task_id = TaskId::parse(json["task_id"].as_str().unwrap()).unwrap();
    let task = h.ledger.get(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
    assert_eq!(task.input_filename, "Junction.MOV");

    let jobs = h.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].task_id, task_id.to_string());
    assert_eq!(jobs[0].input_path, h.upload_dir().join(format!("{}.mov", task_id)));
    assert_eq!(
        jobs[0].output_path,
        h.dir.path().join("results").join(format!("{}.mov", task_id))
    );
    assert_eq!(std::fs::read(&jobs[0].input_path).unwrap(), b"video-bytes");
    assert_eq!(h.uploads(), vec![format!("{}.mov", task_id)]);
}

#[tokio::test]
async fn test_submit_enqueue_failure_removes_upload() {
    let h = Harness::new();
    h.dispatcher.fail.store(true, Ordering::SeqCst);

    let (status, _) = h
        .send(submit(Some(KEY), multipart_body("file", "junction.mp4", b"video")))
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(h.uploads().is_empty());
    assert_eq!(h.dispatcher.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_submit_survives_transient_enqueue_failure() {
    let h = Harness::new();
    h.dispatcher.transient_failures.store(2, Ordering::SeqCst);

    let (status, json) = h
        .send(submit(Some(KEY), multipart_body("file", "junction.mp4", b"video")))
        .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "queued");
    assert_eq!(h.dispatcher.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(h.dispatcher.jobs.lock().unwrap().len(), 1);
    assert_eq!(h.uploads().len(), 1);
}

#[tokio::test]
async fn test_status_rejects_malformed_id() {
    let h = Harness::new();
    let (status, _) = h.send(get("/api/v1/status/not-a-task")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_unknown_task() {
    let h = Harness::new();
    let (status, json) = h
        .send(get(&format!("/api/v1/status/{}", TaskId::new())))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["detail"], "Task not found");
}

#[tokio::test]
async fn test_status_of_queued_task() {
    let h = Harness::new();
    let task = h.ledger.create("junction.mp4").await.unwrap();

    let (status, json) = h.send(get(&format!("/api/v1/status/{}", task.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["task_id"], task.id.to_string());
    assert_eq!(json["status"], "queued");
    assert!(json["result_url"].is_null());
    assert!(json["error_message"].is_null());
    assert_eq!(json["created_at"], task.created_at.to_rfc3339());
}

#[tokio::test]
async fn test_status_of_completed_task_has_result_url() {
    let h = Harness::new();
    let mut task = h.ledger.create("junction.mp4").await.unwrap();
    h.ledger.mark_processing(&mut task).await.unwrap();
    h.ledger
        .mark_completed(&mut task, "results/out.mp4")
        .await
        .unwrap();

    let (status, json) = h.send(get(&format!("/api/v1/status/{}", task.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert_eq!(
        json["result_url"],
        "https://storage.test/results/out.mp4?ttl=3600"
    );
}

#[tokio::test]
async fn test_status_presign_failure_yields_null_url() {
    let h = Harness::new();
    h.objects.fail_presign.store(true, Ordering::SeqCst);
    let mut task = h.ledger.create("junction.mp4").await.unwrap();
    h.ledger.mark_processing(&mut task).await.unwrap();
    h.ledger
        .mark_completed(&mut task, "results/out.mp4")
        .await
        .unwrap();

    let (status, json) = h.send(get(&format!("/api/v1/status/{}", task.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert!(json["result_url"].is_null());
}

#[tokio::test]
async fn test_status_of_failed_task() {
    let h = Harness::new();
    let mut task = h.ledger.create("junction.mp4").await.unwrap();
    h.ledger.mark_processing(&mut task).await.unwrap();
    h.ledger
        .mark_failed(&mut task, "detection failed: engine crashed")
        .await
        .unwrap();

    let (_, json) = h.send(get(&format!("/api/v1/status/{}", task.id))).await;
    assert_eq!(json["status"], "failed");
    assert_eq!(json["error_message"], "detection failed: engine crashed");
    assert!(json["result_url"].is_null());
}

#[tokio::test]
async fn test_health_and_ready() {
    let h = Harness::new();

    let response = h.app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert!(response.headers().contains_key("x-request-id"));

    let (status, json) = h.send(get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ready");

    h.dispatcher.fail.store(true, Ordering::SeqCst);
    let (status, json) = h.send(get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["checks"]["queue"]["status"], "error");
    assert_eq!(json["checks"]["ledger"]["status"], "ok");
}
