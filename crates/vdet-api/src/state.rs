//! Application state.

use std::sync::Arc;

use vdet_firestore::{FirestoreClient, TaskLedger, TaskRepository};
use vdet_queue::JobQueue;
use vdet_storage::{ArtifactGateway, S3Client};

use crate::config::ApiConfig;
use crate::dispatch::TaskDispatcher;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub ledger: TaskLedger,
    pub gateway: ArtifactGateway,
    pub dispatcher: Arc<dyn TaskDispatcher>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        ledger: TaskLedger,
        gateway: ArtifactGateway,
        dispatcher: Arc<dyn TaskDispatcher>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            ledger,
            gateway,
            dispatcher,
        }
    }

    /// Connect to Firestore, S3 and Redis using the environment.
    pub async fn from_env(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let firestore = FirestoreClient::from_env().await?;
        let storage = S3Client::from_env()?;
        let queue = JobQueue::from_env()?;
        queue.init().await?;

        Ok(Self::new(
            config,
            TaskLedger::new(Arc::new(TaskRepository::new(firestore))),
            ArtifactGateway::new(Arc::new(storage)),
            Arc::new(queue),
        ))
    }
}
