//! Axum HTTP API server.
//!
//! This crate provides:
//! - Background analysis runs with progress polling
//! - Summary, ranking and highlight queries over finished runs
//! - Series and per-frame detection reads straight from the timeline store
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
