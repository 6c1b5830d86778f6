//! In-memory collaborators for pipeline tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use vdet_firestore::{FirestoreError, FirestoreResult, TaskStore};
use vdet_media::{
    DetectedFrame, DetectedObject, DetectionRequest, DetectionRun, Detector, MediaError,
    MediaResult, VideoInfo,
};
use vdet_models::{AnalyticsReport, Task, TaskId};
use vdet_storage::{ObjectStore, StorageError, StorageResult};
use vdet_warehouse::{AnalyticsWarehouse, WarehouseError, WarehouseResult};

#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
    pub status_writes: AtomicUsize,
    pub fail_status_writes: AtomicBool,
    /// Status writes beyond this many fail
    pub write_budget: Mutex<Option<usize>>,
}

impl MemoryTaskStore {
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.tasks.lock().unwrap().get(id).cloned()
    }

    pub fn writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    pub fn fail_writes_after(&self, successful: usize) {
        *self.write_budget.lock().unwrap() = Some(successful);
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, task: &Task) -> FirestoreResult<()> {
        self.tasks.lock().unwrap().insert(task.id, task.clone());
        Ok(())
    }

    async fn fetch(&self, id: &TaskId) -> FirestoreResult<Option<Task>> {
        Ok(self.task(id))
    }

    async fn write_status(&self, task: &Task) -> FirestoreResult<()> {
        let exhausted = self
            .write_budget
            .lock()
            .unwrap()
            .is_some_and(|budget| self.writes() >= budget);
        if exhausted || self.fail_status_writes.load(Ordering::SeqCst) {
            return Err(FirestoreError::from_http_status(503, "ledger unavailable"));
        }
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        self.tasks.lock().unwrap().insert(task.id, task.clone());
        Ok(())
    }
}

/// Object store that records uploaded keys.
#[derive(Default)]
pub struct RecordingObjectStore {
    pub uploads: Mutex<Vec<String>>,
    /// Uploads to keys with this prefix fail
    pub fail_prefix: Mutex<Option<String>>,
}

impl RecordingObjectStore {
    pub fn keys(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn fail_uploads_under(&self, prefix: &str) {
        *self.fail_prefix.lock().unwrap() = Some(prefix.to_string());
    }
}

#[async_trait]
impl ObjectStore for RecordingObjectStore {
    async fn put_file(&self, _path: &Path, key: &str, _content_type: &str) -> StorageResult<()> {
        if let Some(prefix) = self.fail_prefix.lock().unwrap().as_deref() {
            if key.starts_with(prefix) {
                return Err(StorageError::upload_failed("bucket is read-only"));
            }
        }
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        Ok(format!("https://storage.test/{}?ttl={}", key, ttl.as_secs()))
    }
}

#[derive(Default)]
pub struct FakeWarehouse {
    pub inserts: Mutex<Vec<(TaskId, AnalyticsReport)>>,
    pub fail: AtomicBool,
}

impl FakeWarehouse {
    pub fn failing() -> Self {
        let warehouse = Self::default();
        warehouse.fail.store(true, Ordering::SeqCst);
        warehouse
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.lock().unwrap().len()
    }
}

#[async_trait]
impl AnalyticsWarehouse for FakeWarehouse {
    async fn insert_report(&self, task_id: &TaskId, report: &AnalyticsReport) -> WarehouseResult<()> {
        self.inserts.lock().unwrap().push((*task_id, report.clone()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(WarehouseError::Http {
                status: 500,
                body: "backend error".into(),
            });
        }
        Ok(())
    }
}

/// What a scripted detector does when invoked.
#[derive(Clone)]
pub enum Script {
    /// Write the output video and yield these frames
    Frames(Vec<Vec<&'static str>>),
    /// Fail before producing anything
    Fail(&'static str),
    /// Yield some frames then fail mid-stream
    FailAfter(Vec<Vec<&'static str>>, &'static str),
}

pub struct ScriptedDetector {
    script: Script,
    pub calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn to_frames(labels: Vec<Vec<&'static str>>) -> Vec<MediaResult<DetectedFrame>> {
    labels
        .into_iter()
        .enumerate()
        .map(|(i, frame)| {
            Ok(DetectedFrame {
                index: i as u64,
                detections: frame
                    .into_iter()
                    .map(|label| DetectedObject {
                        label: label.to_string(),
                        confidence: 0.9,
                    })
                    .collect(),
            })
        })
        .collect()
}

impl Detector for ScriptedDetector {
    fn detect(&self, request: &DetectionRequest) -> MediaResult<DetectionRun> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let info = VideoInfo {
            fps: 10.0,
            total_frames: 2,
            width: 1280,
            height: 720,
        };

        let frames = match self.script.clone() {
            Script::Fail(message) => return Err(MediaError::detection_failed(message)),
            Script::Frames(labels) => to_frames(labels),
            Script::FailAfter(labels, message) => {
                let mut frames = to_frames(labels);
                frames.push(Err(MediaError::detection_failed(message)));
                frames
            }
        };

        std::fs::write(&request.output_path, b"annotated")?;
        Ok(DetectionRun {
            info,
            frames: Box::new(frames.into_iter()),
        })
    }
}
