//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vdet_media::DEFAULT_CONFIDENCE_THRESHOLD;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum pipeline runs in flight
    pub max_concurrent_tasks: usize,
    /// Minimum detection confidence passed to the engine
    pub confidence_threshold: f32,
    /// Directory for intermediate analytics artifacts
    pub analytics_dir: PathBuf,
    /// How often the worker should scan for orphaned pending messages
    pub claim_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Port for the Prometheus scrape endpoint, disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 2,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            analytics_dir: PathBuf::from("data/analytics"),
            claim_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(60),
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_tasks: env_parse("WORKER_MAX_CONCURRENT_TASKS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_tasks),
            confidence_threshold: env_parse("DETECTION_CONFIDENCE")
                .filter(|c: &f32| (0.0..=1.0).contains(c))
                .unwrap_or(defaults.confidence_threshold),
            analytics_dir: std::env::var("ANALYTICS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.analytics_dir),
            claim_interval: env_parse("WORKER_CLAIM_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_interval),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            metrics_port: env_parse("WORKER_METRICS_PORT"),
        }
    }

    /// Local path of the analytics artifact for a task.
    pub fn analytics_path(&self, task_id: &vdet_models::TaskId) -> PathBuf {
        self.analytics_dir.join(format!("{}.json", task_id))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
