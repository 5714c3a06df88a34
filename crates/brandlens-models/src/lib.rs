//! Shared data models for BrandLens.
//!
//! This crate provides Serde-serializable types for:
//! - Detection geometry and per-frame detection records
//! - Decoded frames
//! - Per-frame series points
//! - Whole-video summaries and brand rankings
//! - Job identity, run states and progress snapshots
//! - The raw-label to canonical-brand alias map

pub mod alias;
pub mod detection;
pub mod frame;
pub mod geometry;
pub mod job;
pub mod progress;
pub mod ranking;
pub mod series;
pub mod summary;

// Re-export common types
pub use alias::{AliasError, AliasMap};
pub use detection::{Detection, DetectionRecord, RawDetection};
pub use frame::{Frame, FrameIndex};
pub use geometry::{Geometry, GeometryError, Point, Shape};
pub use job::{JobId, JobKey, JobMode, RunState};
pub use progress::{ProgressSnapshot, ProgressUpdate};
pub use ranking::{rank_brands, RankDirection, RankMetric, RankedBrand, RankingResult};
pub use series::{SeriesMetric, SeriesPoint};
pub use summary::{BrandStats, ProcessingInfo, VideoMetadata, VideoSummary};
