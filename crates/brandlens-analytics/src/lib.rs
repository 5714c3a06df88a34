//! Brand exposure analytics.
//!
//! - [`MetricCalculator`]: turns each frame's detections into coverage,
//!   prominence and share-of-voice contributions and finalizes a summary
//! - [`prominence`]: the visual prominence score
//! - [`highlights`]: best time windows over a per-frame series

pub mod calculator;
pub mod highlights;
pub mod prominence;

pub use calculator::{BrandAccumulator, CalculatorConfig, FrameOutput, MetricCalculator};
pub use highlights::{best_window, best_windows, find_brand, HighlightWindow};
pub use prominence::prominence_score;

/// Round half away from zero to `decimals` places.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
