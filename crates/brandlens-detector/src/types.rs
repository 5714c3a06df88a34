//! Detector service request/response types.

use brandlens_models::{FrameIndex, RawDetection};
use serde::{Deserialize, Serialize};

/// One JPEG-encoded frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedFrame {
    pub index: FrameIndex,
    pub width: u32,
    pub height: u32,
    /// Base64 JPEG
    pub image: String,
}

/// Request for batch detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    pub frames: Vec<EncodedFrame>,
    /// Minimum confidence the service should report
    pub confidence: f32,
}

/// Detections for one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameDetections {
    pub index: FrameIndex,
    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

/// Response from batch detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    pub results: Vec<FrameDetections>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub model: Option<String>,
}
