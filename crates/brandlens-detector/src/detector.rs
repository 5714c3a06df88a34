//! The detector seam.

use async_trait::async_trait;
use brandlens_models::{Frame, RawDetection};

use crate::error::DetectorResult;

/// A pretrained logo detector.
///
/// Implementations return exactly one detection list per input frame, in
/// input order.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect_batch(&self, frames: &[Frame]) -> DetectorResult<Vec<Vec<RawDetection>>>;

    /// Detector name for logging and run metadata.
    fn name(&self) -> &str;
}
