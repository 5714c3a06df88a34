//! Whole-video analytics summary.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Basic properties of the analysed video.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct VideoMetadata {
    /// Duration in seconds
    pub duration: f64,
    pub fps: f64,
    pub total_frames: u64,
    pub width: u32,
    pub height: u32,
}

impl VideoMetadata {
    /// Seconds represented by one frame, zero for stills.
    pub fn frame_time(&self) -> f64 {
        if self.fps > 0.0 {
            1.0 / self.fps
        } else {
            0.0
        }
    }
}

/// Finalized exposure statistics for one brand. Percentages are in `[0, 100]`,
/// times in seconds, everything rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct BrandStats {
    pub frames: u64,
    pub time: f64,
    pub detections: u64,
    pub percentage: f64,
    pub coverage_avg_present: f64,
    pub coverage_avg_overall: f64,
    pub coverage_max: f64,
    pub prominence_avg_present: f64,
    pub prominence_max: f64,
    pub prominence_high_time: f64,
    pub share_of_voice_avg_present: f64,
    pub share_of_voice_solo_time: f64,
    pub share_of_voice_solo_percentage: f64,
}

/// How the run was produced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ProcessingInfo {
    pub detector: String,
    pub batch_size: usize,
    /// Seconds spent between the first inference result and post-processing
    pub detection_seconds: f64,
    pub frames_dropped: u64,
    pub oom_fallbacks: u64,
}

/// The finalized per-video summary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct VideoSummary {
    pub video_metadata: VideoMetadata,
    pub logo_stats: BTreeMap<String, BrandStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_info: Option<ProcessingInfo>,
}

impl VideoSummary {
    pub fn brand(&self, name: &str) -> Option<&BrandStats> {
        self.logo_stats.get(name)
    }
}
