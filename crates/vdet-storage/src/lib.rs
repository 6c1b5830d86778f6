//! Artifact storage for the detection pipeline.
//!
//! This crate provides:
//! - An S3-compatible object store client (MinIO, R2, AWS S3)
//! - The [`ObjectStore`] capability used by the pipeline
//! - [`ArtifactGateway`]: upload, presign and local cleanup
//! - Deterministic artifact key helpers

pub mod client;
pub mod error;
pub mod gateway;
pub mod keys;
pub mod store;

pub use client::{S3Client, S3Config};
pub use error::{StorageError, StorageResult};
pub use gateway::{ArtifactGateway, DEFAULT_PRESIGN_TTL_SECS};
pub use keys::{analytics_key, content_type_for, video_result_key};
pub use store::ObjectStore;
