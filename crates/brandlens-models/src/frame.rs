//! Decoded video frames.

/// 1-based frame index, strictly increasing within a run.
pub type FrameIndex = u64;

/// A decoded frame as packed RGB24 pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: FrameIndex,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(index: FrameIndex, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            index,
            width,
            height,
            data,
        }
    }

    /// A black frame, handy for tests and synthetic sources.
    pub fn blank(index: FrameIndex, width: u32, height: u32) -> Self {
        Self::new(index, width, height, vec![0; Self::byte_len(width, height)])
    }

    /// Bytes needed for one RGB24 frame.
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    /// Frame area in pixels.
    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }
}
