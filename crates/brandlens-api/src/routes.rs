//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    get_detections, get_highlights, get_progress, get_series, get_summary, get_timeline_stats,
    health, rank, start_analysis,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let analysis_routes = Router::new()
        .route("/analyze", post(start_analysis))
        .route("/runs/:run_id/progress", get(get_progress));

    // Readable while a run is in flight
    let timeline_routes = Router::new()
        .route("/runs/:run_id/series", get(get_series))
        .route("/runs/:run_id/detections/:frame", get(get_detections))
        .route("/runs/:run_id/timeline", get(get_timeline_stats));

    // Need the finalized summary
    let summary_routes = Router::new()
        .route("/runs/:run_id/summary", get(get_summary))
        .route("/runs/:run_id/rank", get(rank))
        .route("/runs/:run_id/highlights", get(get_highlights));

    let api_routes = Router::new()
        .merge(analysis_routes)
        .merge(timeline_routes)
        .merge(summary_routes);

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
