//! Brand exposure analysis worker.
//!
//! This crate provides:
//! - The three-stage analysis pipeline (extraction, inference, aggregation)
//! - Run orchestration from source to finalized summary
//! - The job identity lock and run registry
//! - Progress tracking and structured job logging

pub mod analyzer;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod registry;

pub use analyzer::{AnalysisRequest, BrandAnalyzer, PreparedRun, RunReport};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use pipeline::{run_pipeline, Aggregator, PipelineOutput, PipelineSettings};
pub use progress::{ProgressSink, ProgressTracker};
pub use registry::{JobGuard, JobRegistry, RunHandle};
