//! Progress reporting types.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::RunState;

/// One progress report from a pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: RunState,
    pub message: String,
    pub frame: Option<u64>,
    pub total_frames: Option<u64>,
    pub percentage: Option<f64>,
}

impl ProgressUpdate {
    pub fn new(stage: RunState, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            frame: None,
            total_frames: None,
            percentage: None,
        }
    }

    /// Attach frame position; the percentage is derived when the total is known.
    pub fn with_frame(mut self, frame: u64, total_frames: Option<u64>) -> Self {
        self.frame = Some(frame);
        self.total_frames = total_frames;
        self.percentage = total_frames
            .filter(|total| *total > 0)
            .map(|total| (frame as f64 / total as f64 * 100.0).min(100.0));
        self
    }

    pub fn with_percentage(mut self, percentage: f64) -> Self {
        self.percentage = Some(percentage);
        self
    }
}

/// Point-in-time view of a run's progress.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ProgressSnapshot {
    pub stage: RunState,
    pub message: String,
    pub current_frame: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,
    /// Monotonically non-decreasing within a run
    pub percentage: f64,
    /// Seconds since the first inference result, frozen once detection ends
    pub detection_elapsed_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}
