//! Messages carried between pipeline stages.

use brandlens_models::{Frame, RawDetection};

/// One queue item. A channel that closes without `EndOfStream` means the
/// sending stage failed.
#[derive(Debug)]
pub enum StageMessage<T> {
    Item(T),
    EndOfStream,
}

/// A frame with its detector output.
#[derive(Debug)]
pub struct InferredFrame {
    pub frame: Frame,
    pub detections: Vec<RawDetection>,
    /// Inference failed for this frame; it contributes as a frame with no
    /// detections.
    pub dropped: bool,
}

/// Result of one detector batch, in frame order.
pub type InferredBatch = Vec<InferredFrame>;
