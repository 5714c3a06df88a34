//! Starting runs and polling their progress.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use brandlens_models::{JobMode, ProgressSnapshot, RunState};
use brandlens_storage::read_summary;
use brandlens_worker::AnalysisRequest;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Request to analyse a video or image.
#[derive(Debug, Deserialize, Validate)]
pub struct AnalyzeRequest {
    /// Local path or http(s) URL
    #[validate(length(min = 1, max = 4096))]
    pub source: String,
    #[serde(default)]
    pub mode: JobMode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub job_id: String,
    /// Content hash of the source; names the run's artifacts
    pub run_id: String,
    pub mode: JobMode,
    pub status: RunState,
    pub progress_url: String,
}

/// Start a run in the background. Returns 409 while a run over the same
/// content is in progress, in either mode or under any path.
pub async fn start_analysis(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<(StatusCode, Json<AnalyzeResponse>)> {
    request.validate()?;

    let prepared = state
        .analyzer
        .prepare(&AnalysisRequest {
            mode: request.mode,
            source: request.source,
        })
        .await?;

    let run_id = prepared.key().content_hash.clone();
    let response = AnalyzeResponse {
        job_id: prepared.handle.job_id.to_string(),
        progress_url: format!("/api/runs/{}/progress", run_id),
        run_id,
        mode: request.mode,
        status: RunState::Idle,
    };
    info!(job_id = %response.job_id, run_id = %response.run_id, "Analysis accepted");

    let analyzer = state.analyzer.clone();
    tokio::spawn(async move {
        // Failures are recorded on the run's progress tracker.
        if let Err(e) = analyzer.run(prepared).await {
            warn!(error = %e, "Background analysis failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Progress of a run. Runs finished before this process started report
/// completion from their summary file.
pub async fn get_progress(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<ProgressSnapshot>> {
    let layout = state.layout(&run_id)?;
    if let Some(run) = state.registry().run(&run_id) {
        return Ok(Json(run.tracker.snapshot()));
    }

    let summary = read_summary(layout.summary_json())
        .await
        .map_err(|_| ApiError::not_found(format!("run {}", run_id)))?;
    let frames = summary.video_metadata.total_frames;
    Ok(Json(ProgressSnapshot {
        stage: RunState::Complete,
        message: "Analysis complete".to_string(),
        current_frame: frames,
        total_frames: Some(frames),
        percentage: 100.0,
        detection_elapsed_s: summary
            .processing_info
            .map(|info| info.detection_seconds)
            .unwrap_or_default(),
        error: None,
        updated_at: chrono::Utc::now(),
    }))
}
