//! Analytics warehouse sink.
//!
//! Reports are flattened into one summary row per task and streamed into
//! the `daily_reports` table with BigQuery's `insertAll`. When no dataset
//! is configured a disabled sink is used and inserts are skipped.

pub mod client;
pub mod config;
pub mod error;
pub mod row;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use vdet_models::{AnalyticsReport, TaskId};

pub use client::{BigQueryWarehouse, WarehouseAuth};
pub use config::WarehouseConfig;
pub use error::{WarehouseError, WarehouseResult};
pub use row::ReportRow;

/// Destination for finished analytics reports.
#[async_trait]
pub trait AnalyticsWarehouse: Send + Sync {
    async fn insert_report(&self, task_id: &TaskId, report: &AnalyticsReport) -> WarehouseResult<()>;
}

/// Sink used when no warehouse is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledWarehouse;

#[async_trait]
impl AnalyticsWarehouse for DisabledWarehouse {
    async fn insert_report(&self, task_id: &TaskId, _report: &AnalyticsReport) -> WarehouseResult<()> {
        warn!(task_id = %task_id, "Analytics warehouse not configured, skipping insert");
        Ok(())
    }
}

/// Build the warehouse sink described by the environment.
pub async fn from_env() -> WarehouseResult<Arc<dyn AnalyticsWarehouse>> {
    match WarehouseConfig::from_env() {
        Some(config) => Ok(Arc::new(BigQueryWarehouse::from_service_account(config)?)),
        None => Ok(Arc::new(DisabledWarehouse)),
    }
}
