//! Warehouse configuration.

use std::time::Duration;

pub const DEFAULT_TABLE: &str = "daily_reports";
const DEFAULT_API_BASE: &str = "https://bigquery.googleapis.com";

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
    /// API origin, overridable for local emulators
    pub api_base: String,
    pub timeout: Duration,
}

impl WarehouseConfig {
    pub fn new(project_id: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: DEFAULT_TABLE.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// `None` when the project or dataset is not set.
    pub fn from_env() -> Option<Self> {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|s| !s.trim().is_empty());

        let mut config = Self::new(non_empty("GCP_PROJECT_ID")?, non_empty("BQ_DATASET_ID")?);
        if let Some(table) = non_empty("BQ_TABLE_ID") {
            config.table_id = table;
        }
        if let Some(base) = non_empty("BQ_API_BASE") {
            config.api_base = base;
        }
        if let Some(secs) = non_empty("BQ_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            config.timeout = Duration::from_secs(secs);
        }
        Some(config)
    }

    /// Fully qualified table name, `project.dataset.table`.
    pub fn table_ref(&self) -> String {
        format!("{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }

    pub fn insert_all_url(&self) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/datasets/{}/tables/{}/insertAll",
            self.api_base.trim_end_matches('/'),
            self.project_id,
            self.dataset_id,
            self.table_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_requires_dataset() {
        std::env::set_var("GCP_PROJECT_ID", "traffic");
        std::env::remove_var("BQ_DATASET_ID");
        assert!(WarehouseConfig::from_env().is_none());

        std::env::set_var("BQ_DATASET_ID", "analytics");
        let config = WarehouseConfig::from_env().unwrap();
        assert_eq!(config.table_ref(), "traffic.analytics.daily_reports");
        assert_eq!(
            config.insert_all_url(),
            "https://bigquery.googleapis.com/bigquery/v2/projects/traffic/datasets/analytics/tables/daily_reports/insertAll"
        );

        std::env::remove_var("BQ_DATASET_ID");
        std::env::remove_var("GCP_PROJECT_ID");
    }
}
