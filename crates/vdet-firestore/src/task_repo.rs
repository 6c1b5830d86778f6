//! Task documents in the `tasks` collection.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use vdet_models::{Task, TaskId, TaskStatus};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::ledger::TaskStore;
use crate::types::{Document, ToFirestoreValue, Value};

pub const TASKS_COLLECTION: &str = "tasks";

const STATUS_FIELDS: [&str; 4] = ["status", "result_url", "error_message", "updated_at"];

/// Repository for task documents.
#[derive(Clone)]
pub struct TaskRepository {
    client: FirestoreClient,
}

impl TaskRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &FirestoreClient {
        &self.client
    }
}

#[async_trait]
impl TaskStore for TaskRepository {
    async fn insert(&self, task: &Task) -> FirestoreResult<()> {
        // Not retried: a replayed create would surface as AlreadyExists
        self.client
            .create_document(TASKS_COLLECTION, &task.id.to_string(), task_to_fields(task))
            .await?;
        debug!(task_id = %task.id, "Inserted task document");
        Ok(())
    }

    async fn fetch(&self, id: &TaskId) -> FirestoreResult<Option<Task>> {
        let doc_id = id.to_string();
        let doc = self
            .client
            .with_retry("get_task", || {
                self.client.get_document(TASKS_COLLECTION, &doc_id)
            })
            .await?;

        doc.map(|d| document_to_task(&d, id)).transpose()
    }

    async fn write_status(&self, task: &Task) -> FirestoreResult<()> {
        let doc_id = task.id.to_string();
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), task.status.as_str().to_firestore_value());
        fields.insert("result_url".to_string(), task.result_reference.to_firestore_value());
        fields.insert("error_message".to_string(), task.error_message.to_firestore_value());
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

        self.client
            .with_retry("update_task_status", || {
                self.client
                    .update_document(TASKS_COLLECTION, &doc_id, fields.clone(), &STATUS_FIELDS)
            })
            .await?;
        Ok(())
    }
}

fn task_to_fields(task: &Task) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("status".to_string(), task.status.as_str().to_firestore_value());
    fields.insert("input_filename".to_string(), task.input_filename.to_firestore_value());
    fields.insert("result_url".to_string(), task.result_reference.to_firestore_value());
    fields.insert("error_message".to_string(), task.error_message.to_firestore_value());
    fields.insert("created_at".to_string(), task.created_at.to_firestore_value());
    fields.insert("updated_at".to_string(), task.created_at.to_firestore_value());
    fields
}

fn document_to_task(doc: &Document, id: &TaskId) -> FirestoreResult<Task> {
    let status = doc
        .get::<String>("status")
        .ok_or_else(|| FirestoreError::invalid_response(format!("task {} has no status", id)))?;
    let status: TaskStatus = status
        .parse()
        .map_err(|e: String| FirestoreError::invalid_response(format!("task {}: {}", id, e)))?;

    Ok(Task {
        id: *id,
        status,
        input_filename: doc.get::<String>("input_filename").unwrap_or_default(),
        result_reference: doc.get::<String>("result_url"),
        error_message: doc.get::<String>("error_message"),
        created_at: doc
            .get::<DateTime<Utc>>("created_at")
            .unwrap_or_else(Utc::now),
    })
}
