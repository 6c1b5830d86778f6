//! Object store capability.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::S3Client;
use crate::error::StorageResult;

/// Remote object storage as seen by the pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write the file at `path` under `key`.
    async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()>;

    /// Produce a time-limited GET URL for `key`.
    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    /// Lightweight reachability probe.
    async fn check_connectivity(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()> {
        self.upload_file(path, key, content_type).await
    }

    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        self.presign_get(key, ttl).await
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        S3Client::check_connectivity(self).await
    }
}
