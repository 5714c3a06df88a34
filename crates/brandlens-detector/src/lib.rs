//! Logo detector access.
//!
//! The detector model runs out of process. This crate defines the
//! [`Detector`] seam the pipeline depends on, an HTTP client for the
//! detection service, and the adapter that turns raw output into canonical
//! detections.

pub mod adapter;
pub mod client;
pub mod detector;
pub mod error;
pub mod types;

pub use adapter::DetectionAdapter;
pub use client::{DetectorConfig, HttpDetector};
pub use detector::Detector;
pub use error::{DetectorError, DetectorResult};
pub use types::{DetectRequest, DetectResponse, EncodedFrame, FrameDetections};
