//! API configuration.

use std::path::PathBuf;

use vdet_storage::DEFAULT_PRESIGN_TTL_SECS;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Shared secret expected in `X-API-KEY`; submissions are refused when unset
    pub api_key: Option<String>,
    /// Where uploaded videos are stored until the worker picks them up
    pub upload_dir: PathBuf,
    /// Where the worker writes annotated videos
    pub results_dir: PathBuf,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size
    pub max_body_size: usize,
    /// Lifetime of result URLs
    pub presign_ttl_secs: u64,
    /// Environment (development/production)
    pub environment: String,
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_key: None,
            upload_dir: PathBuf::from("data/uploads"),
            results_dir: PathBuf::from("data/results"),
            cors_origins: vec!["*".to_string()],
            max_body_size: 512 * 1024 * 1024, // 512MB
            presign_ttl_secs: DEFAULT_PRESIGN_TTL_SECS,
            environment: "development".to_string(),
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            api_key: std::env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            results_dir: std::env::var("RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.results_dir),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_body_size: env_parse("API_MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            presign_ttl_secs: env_parse("S3_PRESIGN_TTL_SECS").unwrap_or(defaults.presign_ttl_secs),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
