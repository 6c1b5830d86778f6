//! Axum HTTP API server.
//!
//! This crate provides:
//! - Video submission and task status endpoints
//! - Shared-key authentication and security headers
//! - Prometheus metrics

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod state;

#[cfg(test)]
mod routes_tests;

pub use config::ApiConfig;
pub use dispatch::TaskDispatcher;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
