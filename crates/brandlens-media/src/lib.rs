//! Media plumbing for BrandLens.
//!
//! This crate provides:
//! - Source classification and content hashing
//! - FFprobe metadata with timeouts and stream fallbacks
//! - HLS master playlist resolution to the highest-resolution variant
//! - Raw RGB24 frame decoding through FFmpeg
//! - Detection overlay rendering and encoding

pub mod decoder;
pub mod error;
pub mod manifest;
pub mod overlay;
pub mod probe;
pub mod source;
mod stderr;

pub use decoder::{load_image, FfmpegDecoder, FrameSource, MemoryFrameSource};
pub use error::{MediaError, MediaResult};
pub use manifest::{parse_master_playlist, select_best_variant, ManifestResolver, Variant};
pub use overlay::{brand_color, draw_detections, FfmpegOverlayEncoder, OverlaySink};
pub use probe::{probe_or_fallback, probe_video, VideoInfo};
pub use source::VideoSource;
