//! Detection pipeline worker.
//!
//! This crate provides:
//! - The per-task workflow orchestrator
//! - Analytics aggregation over detected frames
//! - A queue executor with bounded concurrency and graceful shutdown

pub mod analytics;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use analytics::{aggregate, AnalyticsAggregator};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::TaskLogger;
pub use workflow::Orchestrator;
