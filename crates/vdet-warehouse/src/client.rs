//! BigQuery streaming-insert client.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use metrics::{counter, histogram};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, Instrument};

use vdet_models::{AnalyticsReport, TaskId};

use crate::config::WarehouseConfig;
use crate::error::{WarehouseError, WarehouseResult};
use crate::row::ReportRow;
use crate::AnalyticsWarehouse;

const BIGQUERY_INSERT_SCOPE: &str = "https://www.googleapis.com/auth/bigquery.insertdata";

/// Credentials for the insert request.
pub enum WarehouseAuth {
    Provider(Arc<dyn TokenProvider>),
    /// Fixed bearer token (emulator, tests)
    Static(String),
}

impl WarehouseAuth {
    async fn token(&self) -> WarehouseResult<String> {
        match self {
            WarehouseAuth::Static(token) => Ok(token.clone()),
            WarehouseAuth::Provider(provider) => provider
                .token(&[BIGQUERY_INSERT_SCOPE])
                .await
                .map(|t| t.as_str().to_string())
                .map_err(|e| WarehouseError::auth(format!("Failed to obtain auth token: {}", e))),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllRequest<'a> {
    kind: &'static str,
    rows: Vec<InsertRow<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertRow<'a> {
    insert_id: &'a str,
    json: &'a ReportRow,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<RowErrors>,
}

#[derive(Debug, Deserialize)]
struct RowErrors {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

/// Streams report rows into BigQuery.
pub struct BigQueryWarehouse {
    http: Client,
    config: WarehouseConfig,
    auth: WarehouseAuth,
}

impl BigQueryWarehouse {
    pub fn new(config: WarehouseConfig, auth: WarehouseAuth) -> WarehouseResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("vdet-warehouse/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config, auth })
    }

    /// Authenticate with the service account in `GOOGLE_APPLICATION_CREDENTIALS`.
    pub fn from_service_account(config: WarehouseConfig) -> WarehouseResult<Self> {
        let account = CustomServiceAccount::from_env()
            .map_err(|e| WarehouseError::auth(format!("Failed to load service account: {}", e)))?
            .ok_or_else(|| WarehouseError::config("GOOGLE_APPLICATION_CREDENTIALS not set"))?;
        Self::new(config, WarehouseAuth::Provider(Arc::new(account)))
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    /// Insert one row; the task id doubles as the dedup insert id.
    pub async fn insert_row(&self, row: &ReportRow) -> WarehouseResult<()> {
        let url = self.config.insert_all_url();
        let body = InsertAllRequest {
            kind: "bigquery#tableDataInsertAllRequest",
            rows: vec![InsertRow {
                insert_id: &row.task_id,
                json: row,
            }],
        };

        let span = info_span!("warehouse_insert", table = %self.config.table_ref(), task_id = %row.task_id);
        let start = Instant::now();

        let result: WarehouseResult<()> = async {
            let token = self.auth.token().await?;
            let response = self
                .http
                .post(&url)
                .bearer_auth(token)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(WarehouseError::Http {
                    status: status.as_u16(),
                    body: text,
                });
            }

            let parsed: InsertAllResponse = if text.trim().is_empty() {
                InsertAllResponse::default()
            } else {
                serde_json::from_str(&text)?
            };
            check_insert_errors(&parsed)
        }
        .instrument(span)
        .await;

        histogram!("vdet_warehouse_insert_seconds").record(start.elapsed().as_secs_f64());
        if result.is_err() {
            counter!("vdet_warehouse_insert_failures_total").increment(1);
        }
        result
    }
}

fn check_insert_errors(response: &InsertAllResponse) -> WarehouseResult<()> {
    if response.insert_errors.is_empty() {
        return Ok(());
    }

    let detail = response
        .insert_errors
        .iter()
        .flat_map(|row| {
            row.errors
                .iter()
                .map(move |e| format!("row {}: {} ({})", row.index, e.message, e.reason))
        })
        .collect::<Vec<_>>()
        .join("; ");
    Err(WarehouseError::InsertErrors(detail))
}

#[async_trait]
impl AnalyticsWarehouse for BigQueryWarehouse {
    async fn insert_report(&self, task_id: &TaskId, report: &AnalyticsReport) -> WarehouseResult<()> {
        let row = ReportRow::from_report(task_id, report, Utc::now())?;
        debug!(task_id = %task_id, dominant_class = %row.dominant_class, "Inserting report row");
        self.insert_row(&row).await?;
        info!(task_id = %task_id, table = %self.config.table_ref(), "Report inserted into warehouse");
        Ok(())
    }
}
