//! Artifact store gateway.
//!
//! Moves files between local transient storage and the object store.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::histogram;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::keys::content_type_for;
use crate::store::ObjectStore;

/// Default lifetime of presigned URLs.
pub const DEFAULT_PRESIGN_TTL_SECS: u64 = 3600;

/// Gateway over an [`ObjectStore`].
#[derive(Clone)]
pub struct ArtifactGateway {
    store: Arc<dyn ObjectStore>,
}

impl ArtifactGateway {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Upload `local_path` under `remote_key` and return the key.
    ///
    /// The local file is left in place.
    pub async fn upload(
        &self,
        local_path: impl AsRef<Path>,
        remote_key: &str,
    ) -> StorageResult<String> {
        let local_path = local_path.as_ref();
        if remote_key.is_empty() {
            return Err(StorageError::invalid_key("empty remote key"));
        }

        match tokio::fs::metadata(local_path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(StorageError::upload_failed(format!(
                    "{} is not a file",
                    local_path.display()
                )))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::not_found(local_path.display().to_string()))
            }
            Err(e) => return Err(StorageError::Io(e)),
        }

        let start = Instant::now();
        self.store
            .put_file(local_path, remote_key, content_type_for(local_path))
            .await?;
        histogram!("vdet_upload_duration_seconds").record(start.elapsed().as_secs_f64());

        Ok(remote_key.to_string())
    }

    /// Presigned GET URL for `remote_key`, or an empty string on failure.
    pub async fn presign(&self, remote_key: &str, ttl_seconds: u64) -> String {
        match self
            .store
            .presign(remote_key, Duration::from_secs(ttl_seconds))
            .await
        {
            Ok(url) => url,
            Err(e) => {
                warn!(key = remote_key, error = %e, "Failed to presign object");
                String::new()
            }
        }
    }

    /// Delete a local file if present. Errors are logged, never returned.
    pub async fn cleanup(local_path: impl AsRef<Path>) {
        let local_path = local_path.as_ref();
        match tokio::fs::remove_file(local_path).await {
            Ok(()) => info!(path = %local_path.display(), "Removed temporary file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %local_path.display(), "Temporary file already absent")
            }
            Err(e) => warn!(
                path = %local_path.display(),
                error = %e,
                "Failed to remove temporary file"
            ),
        }
    }

    /// Delete every path in `paths`.
    pub async fn cleanup_all<P: AsRef<Path>>(paths: &[P]) {
        for path in paths {
            Self::cleanup(path).await;
        }
    }
}
