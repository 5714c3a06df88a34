//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use brandlens_analytics::calculator::{DEFAULT_HIGH_PROMINENCE, DEFAULT_MIN_DETECTIONS};
use brandlens_storage::DEFAULT_COMMIT_INTERVAL;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Frames per detector call
    pub batch_size: usize,
    /// Capacity of the decoded-frame queue feeding inference
    pub frame_queue_capacity: usize,
    /// Capacity of the inference-result queue feeding aggregation, in batches
    pub result_queue_capacity: usize,
    /// Brands with fewer detections are left out of the summary
    pub min_detections: u64,
    /// Prominence counted towards high-prominence dwell time
    pub high_prominence_threshold: f64,
    /// Detections below this confidence are ignored
    pub min_confidence: f32,
    /// Root directory for per-run artifacts
    pub results_dir: PathBuf,
    /// Render detection overlays into `output.mp4`
    pub render_overlay: bool,
    /// Frames per timeline store transaction
    pub commit_interval: u64,
    /// Timeout for ffprobe and manifest requests
    pub probe_timeout: Duration,
    /// Frame size assumed when a remote stream cannot be probed
    pub fallback_width: u32,
    pub fallback_height: u32,
    /// Frame rate assumed when a remote stream cannot be probed
    pub fallback_fps: f64,
    /// JSON alias table; the built-in table is used when unset
    pub alias_map_path: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let batch_size = 8;
        Self {
            batch_size,
            frame_queue_capacity: batch_size * 2,
            result_queue_capacity: 2,
            min_detections: DEFAULT_MIN_DETECTIONS,
            high_prominence_threshold: DEFAULT_HIGH_PROMINENCE,
            min_confidence: 0.25,
            results_dir: PathBuf::from("results"),
            render_overlay: false,
            commit_interval: DEFAULT_COMMIT_INTERVAL,
            probe_timeout: Duration::from_secs(15),
            fallback_width: 1280,
            fallback_height: 720,
            fallback_fps: 30.0,
            alias_map_path: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let batch_size = std::env::var("WORKER_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.batch_size);

        Self {
            batch_size,
            frame_queue_capacity: std::env::var("WORKER_FRAME_QUEUE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(batch_size * 2),
            result_queue_capacity: std::env::var("WORKER_RESULT_QUEUE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.result_queue_capacity),
            min_detections: std::env::var("WORKER_MIN_DETECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_detections),
            high_prominence_threshold: std::env::var("WORKER_HIGH_PROMINENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.high_prominence_threshold),
            min_confidence: std::env::var("WORKER_MIN_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_confidence),
            results_dir: std::env::var("WORKER_RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.results_dir),
            render_overlay: std::env::var("WORKER_RENDER_OVERLAY")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.render_overlay),
            commit_interval: std::env::var("WORKER_COMMIT_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &u64| *n > 0)
                .unwrap_or(defaults.commit_interval),
            probe_timeout: Duration::from_secs(
                std::env::var("WORKER_PROBE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            ),
            fallback_width: std::env::var("WORKER_FALLBACK_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fallback_width),
            fallback_height: std::env::var("WORKER_FALLBACK_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fallback_height),
            fallback_fps: std::env::var("WORKER_FALLBACK_FPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fallback_fps),
            alias_map_path: std::env::var("WORKER_ALIAS_MAP").ok().map(PathBuf::from),
        }
    }

    /// Batch size and queue capacities floored at one.
    pub fn normalized(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self.frame_queue_capacity = self.frame_queue_capacity.max(1);
        self.result_queue_capacity = self.result_queue_capacity.max(1);
        self.commit_interval = self.commit_interval.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_frame_queue_is_twice_batch() {
        let config = WorkerConfig::default();
        assert_eq!(config.frame_queue_capacity, config.batch_size * 2);
        assert_eq!(config.min_detections, 50);
    }

    #[test]
    fn test_normalized_floors_zero_sizes() {
        let config = WorkerConfig {
            batch_size: 0,
            frame_queue_capacity: 0,
            result_queue_capacity: 0,
            commit_interval: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.frame_queue_capacity, 1);
        assert_eq!(config.result_queue_capacity, 1);
        assert_eq!(config.commit_interval, 1);
    }
}
