//! Firestore-backed task ledger.
//!
//! This crate provides:
//! - A Firestore REST client (service account or emulator auth)
//! - [`TaskRepository`]: task documents in the `tasks` collection
//! - [`TaskLedger`]: the only way task status is changed
//! - Retry with exponential backoff, request metrics

pub mod client;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod retry;
pub mod task_repo;
pub mod token_cache;
pub mod types;

#[cfg(test)]
mod client_tests;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use ledger::{LedgerError, LedgerResult, TaskLedger, TaskStore};
pub use task_repo::TaskRepository;
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
