//! Read access to finished and in-flight runs.
//!
//! Series, detections and timeline stats read the timeline store directly
//! and work while a run is still in progress. Summary, ranking and
//! highlights need the finalized summary.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use brandlens_analytics::{best_windows, find_brand, HighlightWindow};
use brandlens_models::{
    rank_brands, DetectionRecord, FrameIndex, RankDirection, RankingResult, SeriesMetric,
    VideoSummary,
};
use brandlens_storage::{auto_stride, read_summary, FrameRange, TimelineReader};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_HIGHLIGHT_TOTAL_S: f64 = 5.0;
const DEFAULT_HIGHLIGHT_SEGMENT_S: f64 = 1.0;

async fn load_summary(state: &AppState, run_id: &str) -> ApiResult<VideoSummary> {
    let layout = state.layout(run_id)?;
    read_summary(layout.summary_json())
        .await
        .map_err(|e| match e {
            brandlens_storage::StorageError::NotFound(_) => {
                ApiError::not_found(format!("summary for run {}", run_id))
            }
            other => other.into(),
        })
}

fn parse_metric(metric: Option<&str>, default: SeriesMetric) -> ApiResult<SeriesMetric> {
    match metric {
        Some(m) => m.parse().map_err(ApiError::bad_request),
        None => Ok(default),
    }
}

// ============================================================================
// Summary and ranking
// ============================================================================

pub async fn get_summary(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<VideoSummary>> {
    Ok(Json(load_summary(&state, &run_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct RankQuery {
    #[serde(default = "default_rank_metric")]
    pub metric: String,
    pub top_n: Option<usize>,
    pub direction: Option<String>,
}

fn default_rank_metric() -> String {
    "percentage".to_string()
}

/// Rank brands by a summary metric. Unknown metrics return an empty result
/// with a message rather than an error.
pub async fn rank(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<RankQuery>,
) -> ApiResult<Json<RankingResult>> {
    let summary = load_summary(&state, &run_id).await?;
    let direction: RankDirection = query
        .direction
        .as_deref()
        .unwrap_or("desc")
        .parse()
        .unwrap_or_default();
    Ok(Json(rank_brands(&summary, &query.metric, query.top_n, direction)))
}

// ============================================================================
// Timeline reads
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    pub brand: String,
    pub metric: Option<String>,
    pub start: Option<FrameIndex>,
    pub end: Option<FrameIndex>,
    pub stride: Option<u64>,
    pub max_points: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeriesResponse {
    pub brand: String,
    pub metric: SeriesMetric,
    /// Resolved range; absent when nothing in the request is readable
    pub range: Option<FrameRange>,
    pub values: Vec<f64>,
}

/// One brand's series over a frame range. Without an explicit stride the
/// range is sampled down to `max_points`.
pub async fn get_series(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<SeriesQuery>,
) -> ApiResult<Json<SeriesResponse>> {
    let metric = parse_metric(query.metric.as_deref(), SeriesMetric::Coverage)?;
    let reader = state.timeline(&run_id).await?;
    let result = read_series(&state, &reader, &query, metric).await;
    reader.close().await;
    result.map(Json)
}

async fn read_series(
    state: &AppState,
    reader: &TimelineReader,
    query: &SeriesQuery,
    metric: SeriesMetric,
) -> ApiResult<SeriesResponse> {
    let stride = match query.stride {
        Some(stride) => stride.max(1),
        None => {
            let max_frame = reader.max_frame().await?;
            let start = query.start.unwrap_or(1).max(1);
            let end = query.end.unwrap_or(max_frame).min(max_frame);
            let max_points = query
                .max_points
                .filter(|n| *n > 0)
                .unwrap_or(state.config.default_max_points);
            auto_stride(start, end, max_points)
        }
    };

    let slice = reader
        .series_slice(&query.brand, metric, query.start, query.end, stride)
        .await?;
    Ok(SeriesResponse {
        brand: query.brand.clone(),
        metric,
        range: slice.range,
        values: slice.values,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetectionsResponse {
    pub frame: FrameIndex,
    pub detections: Vec<DetectionRecord>,
}

/// Exact detections for one frame.
pub async fn get_detections(
    State(state): State<AppState>,
    Path((run_id, frame)): Path<(String, FrameIndex)>,
) -> ApiResult<Json<DetectionsResponse>> {
    let reader = state.timeline(&run_id).await?;
    let detections = reader.detections(frame).await;
    reader.close().await;
    Ok(Json(DetectionsResponse {
        frame,
        detections: detections?,
    }))
}

/// Frames in which each brand was present.
pub async fn get_timeline_stats(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<BTreeMap<String, Vec<FrameIndex>>>> {
    let reader = state.timeline(&run_id).await?;
    let stats = reader.timeline_stats().await;
    reader.close().await;
    Ok(Json(stats?))
}

// ============================================================================
// Highlights
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HighlightQuery {
    pub brand: String,
    pub metric: Option<String>,
    pub total_s: Option<f64>,
    pub segment_s: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HighlightResponse {
    /// Brand as stored, after fuzzy matching the query
    pub brand: String,
    pub metric: SeriesMetric,
    pub windows: Vec<HighlightWindow>,
}

/// Best non-overlapping windows for a brand, chronological.
pub async fn get_highlights(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<HighlightQuery>,
) -> ApiResult<Json<HighlightResponse>> {
    let metric = parse_metric(query.metric.as_deref(), SeriesMetric::Coverage)?;
    let segment_s = query.segment_s.unwrap_or(DEFAULT_HIGHLIGHT_SEGMENT_S);
    let total_s = query.total_s.unwrap_or(DEFAULT_HIGHLIGHT_TOTAL_S);
    if !(segment_s.is_finite() && total_s.is_finite() && segment_s > 0.0 && total_s > 0.0) {
        return Err(ApiError::bad_request(
            "total_s and segment_s must be positive and finite",
        ));
    }

    let summary = load_summary(&state, &run_id).await?;
    let reader = state.timeline(&run_id).await?;
    let result = async {
        let brands = reader.brands().await?;
        let brand = find_brand(&query.brand, brands.iter().map(String::as_str))
            .map(str::to_string)
            .ok_or_else(|| ApiError::not_found(format!("brand '{}'", query.brand)))?;
        let series = reader.series(&brand, metric, None, None, 1).await?;
        Ok::<_, ApiError>((brand, series))
    }
    .await;
    reader.close().await;
    let (brand, series) = result?;

    let windows = best_windows(&series, summary.video_metadata.fps, total_s, segment_s);
    Ok(Json(HighlightResponse {
        brand,
        metric,
        windows,
    }))
}
