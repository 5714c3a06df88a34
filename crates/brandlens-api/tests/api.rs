//! Router-level tests over a run fixture written straight to storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use brandlens_api::{create_router, ApiConfig, AppState};
use brandlens_detector::{Detector, DetectorResult};
use brandlens_models::{
    AliasMap, BrandStats, DetectionRecord, Frame, RawDetection, VideoMetadata, VideoSummary,
};
use brandlens_storage::{write_summary, RunLayout, TimelineWriter};
use brandlens_worker::{BrandAnalyzer, WorkerConfig};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const RUN_ID: &str = "abc123";

struct NoopDetector;

#[async_trait]
impl Detector for NoopDetector {
    async fn detect_batch(&self, frames: &[Frame]) -> DetectorResult<Vec<Vec<RawDetection>>> {
        Ok(vec![Vec::new(); frames.len()])
    }

    fn name(&self) -> &str {
        "noop"
    }
}

fn record(brand: &str) -> DetectionRecord {
    DetectionRecord {
        brand: brand.to_string(),
        polygon: [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]],
        bbox: [0.0, 0.0, 10.0, 10.0],
    }
}

/// Ten frames at 2 fps. Acme is on screen for frames 1-4 and Globex for
/// frames 7-10.
async fn write_fixture(results_dir: &std::path::Path) {
    let layout = RunLayout::new(results_dir, RUN_ID);
    let mut writer = TimelineWriter::create(layout.timeline_db(), 4).await.unwrap();
    for frame in 1..=10u64 {
        if frame <= 4 {
            writer
                .record(frame, "Acme", 20.0, 40.0, &[record("Acme")])
                .await
                .unwrap();
        }
        if frame >= 7 {
            writer
                .record(frame, "Globex", 5.0, 10.0, &[record("Globex")])
                .await
                .unwrap();
        }
    }
    writer.close().await.unwrap();

    let mut summary = VideoSummary {
        video_metadata: VideoMetadata {
            duration: 5.0,
            fps: 2.0,
            total_frames: 10,
            width: 100,
            height: 100,
        },
        ..Default::default()
    };
    summary.logo_stats.insert(
        "Acme".into(),
        BrandStats {
            frames: 4,
            time: 2.0,
            detections: 4,
            percentage: 40.0,
            ..Default::default()
        },
    );
    summary.logo_stats.insert(
        "Globex".into(),
        BrandStats {
            frames: 4,
            time: 2.0,
            detections: 4,
            percentage: 30.0,
            ..Default::default()
        },
    );
    write_summary(layout.summary_json(), &summary).await.unwrap();
}

async fn app() -> (Router, TempDir) {
    let dir = TempDir::new().unwrap();
    let results_dir = dir.path().join("results");
    write_fixture(&results_dir).await;

    let config = WorkerConfig {
        results_dir,
        ..Default::default()
    };
    let analyzer = BrandAnalyzer::new(config, Arc::new(NoopDetector))
        .unwrap()
        .with_aliases(AliasMap::new(HashMap::new()));
    let state = AppState::new(ApiConfig::default(), analyzer);
    (create_router(state, None), dir)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let (app, _dir) = app().await;
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["active_jobs"], 0);
}

#[tokio::test]
async fn test_unknown_and_invalid_runs() {
    let (app, _dir) = app().await;

    let (status, body) = get(&app, "/api/runs/ffff/summary").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());

    let (status, _) = get(&app, "/api/runs/ffff/series?brand=Acme").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app, "/api/runs/not-a-hash/summary").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_summary_and_ranking() {
    let (app, _dir) = app().await;

    let (status, body) = get(&app, &format!("/api/runs/{RUN_ID}/summary")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["video_metadata"]["total_frames"], 10);
    assert_eq!(body["logo_stats"]["Acme"]["frames"], 4);

    let (status, body) = get(&app, &format!("/api/runs/{RUN_ID}/rank?top_n=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["brand"], "Acme");

    let (_, body) = get(&app, &format!("/api/runs/{RUN_ID}/rank?direction=asc")).await;
    assert_eq!(body["items"][0]["brand"], "Globex");
}

#[tokio::test]
async fn test_series_is_dense_and_strided() {
    let (app, _dir) = app().await;

    let (status, body) = get(&app, &format!("/api/runs/{RUN_ID}/series?brand=Acme")).await;
    assert_eq!(status, StatusCode::OK);
    let values: Vec<f64> = serde_json::from_value(body["values"].clone()).unwrap();
    assert_eq!(values.len(), 10);
    assert_eq!(&values[..5], &[20.0, 20.0, 20.0, 20.0, 0.0]);
    assert_eq!(body["range"]["end"], 10);

    let (_, body) = get(
        &app,
        &format!("/api/runs/{RUN_ID}/series?brand=Globex&metric=prominence&start=6&stride=2"),
    )
    .await;
    let values: Vec<f64> = serde_json::from_value(body["values"].clone()).unwrap();
    assert_eq!(values, vec![0.0, 10.0, 10.0]);

    let (_, body) = get(
        &app,
        &format!("/api/runs/{RUN_ID}/series?brand=Acme&max_points=5"),
    )
    .await;
    assert_eq!(body["range"]["stride"], 2);
    assert_eq!(body["values"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_series_rejects_unknown_metric() {
    let (app, _dir) = app().await;
    let (status, _) = get(
        &app,
        &format!("/api/runs/{RUN_ID}/series?brand=Acme&metric=loudness"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_brand_reads_empty() {
    let (app, _dir) = app().await;
    let (status, body) = get(&app, &format!("/api/runs/{RUN_ID}/series?brand=Initech")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["values"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_frame_detections_and_timeline() {
    let (app, _dir) = app().await;

    let (status, body) = get(&app, &format!("/api/runs/{RUN_ID}/detections/2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["frame"], 2);
    assert_eq!(body["detections"][0]["brand"], "Acme");

    let (_, body) = get(&app, &format!("/api/runs/{RUN_ID}/detections/5")).await;
    assert!(body["detections"].as_array().unwrap().is_empty());

    let (_, body) = get(&app, &format!("/api/runs/{RUN_ID}/timeline")).await;
    assert_eq!(body["Acme"], serde_json::json!([1, 2, 3, 4]));
    assert_eq!(body["Globex"], serde_json::json!([7, 8, 9, 10]));
}

#[tokio::test]
async fn test_highlights_match_brand_loosely() {
    let (app, _dir) = app().await;

    let (status, body) = get(
        &app,
        &format!("/api/runs/{RUN_ID}/highlights?brand=acme&total_s=1&segment_s=1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["brand"], "Acme");
    let windows = body["windows"].as_array().unwrap();
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0]["start_frame"], 0);

    let (status, _) = get(&app, &format!("/api/runs/{RUN_ID}/highlights?brand=Initech")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(
        &app,
        &format!("/api/runs/{RUN_ID}/highlights?brand=Acme&segment_s=0"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_highlight_totals_are_bounded() {
    let (app, _dir) = app().await;

    let (status, _) = get(
        &app,
        &format!("/api/runs/{RUN_ID}/highlights?brand=Acme&total_s=inf"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Ten frames at 2 fps hold at most five disjoint one-second windows.
    let (status, body) = get(
        &app,
        &format!("/api/runs/{RUN_ID}/highlights?brand=Acme&total_s=1e300"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["windows"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_finished_run_progress() {
    let (app, _dir) = app().await;
    let (status, body) = get(&app, &format!("/api/runs/{RUN_ID}/progress")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stage"], "complete");
    assert_eq!(body["percentage"], 100.0);
    assert_eq!(body["current_frame"], 10);
}

#[tokio::test]
async fn test_analyze_rejects_bad_sources() {
    let (app, dir) = app().await;

    let (status, _) = post_json(&app, "/api/analyze", serde_json::json!({ "source": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = dir.path().join("missing.mp4");
    let (status, body) = post_json(
        &app,
        "/api/analyze",
        serde_json::json!({ "source": missing.display().to_string() }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let (status, _) = post_json(
        &app,
        "/api/analyze",
        serde_json::json!({ "source": dir.path().display().to_string() }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[cfg(unix)]
#[tokio::test]
async fn test_analyze_rejects_device_files() {
    let (app, _dir) = app().await;
    let (status, _) = post_json(
        &app,
        "/api/analyze",
        serde_json::json!({ "source": "/dev/zero" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analyze_accepts_and_reports_run_id() {
    let (app, dir) = app().await;
    let source = dir.path().join("clip.mp4");
    std::fs::write(&source, b"not really a video").unwrap();

    let (status, body) = post_json(
        &app,
        "/api/analyze",
        serde_json::json!({ "source": source.display().to_string(), "mode": "video" }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = body["run_id"].as_str().unwrap();
    assert_eq!(run_id.len(), 64);
    assert_eq!(
        body["progress_url"],
        format!("/api/runs/{run_id}/progress")
    );
}
