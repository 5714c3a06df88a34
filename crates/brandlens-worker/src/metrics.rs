//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; the API binary installs the
//! Prometheus recorder. Without a recorder these calls are no-ops.

use brandlens_models::JobMode;
use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const FRAMES_PROCESSED_TOTAL: &str = "brandlens_frames_processed_total";
    pub const FRAMES_DROPPED_TOTAL: &str = "brandlens_frames_dropped_total";
    pub const DETECTOR_OOM_FALLBACKS_TOTAL: &str = "brandlens_detector_oom_fallbacks_total";
    pub const DETECTOR_BATCH_SECONDS: &str = "brandlens_detector_batch_seconds";
    pub const JOBS_ACTIVE: &str = "brandlens_jobs_active";
    pub const JOBS_COMPLETED_TOTAL: &str = "brandlens_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "brandlens_jobs_failed_total";
    pub const JOBS_REJECTED_TOTAL: &str = "brandlens_jobs_rejected_total";
    pub const JOB_DURATION_SECONDS: &str = "brandlens_job_duration_seconds";
}

pub fn record_frames_processed(count: u64) {
    counter!(names::FRAMES_PROCESSED_TOTAL).increment(count);
}

pub fn record_frame_dropped() {
    counter!(names::FRAMES_DROPPED_TOTAL).increment(1);
}

pub fn record_oom_fallback() {
    counter!(names::DETECTOR_OOM_FALLBACKS_TOTAL).increment(1);
}

/// Record one detector call; `outcome` is "ok" or "error".
pub fn record_detector_batch(outcome: &'static str, duration_secs: f64) {
    histogram!(names::DETECTOR_BATCH_SECONDS, "outcome" => outcome).record(duration_secs);
}

pub fn set_active_jobs(count: usize) {
    gauge!(names::JOBS_ACTIVE).set(count as f64);
}

pub fn record_job_completed(mode: JobMode, duration_secs: f64) {
    let labels = [("mode", mode.as_str().to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_failed(mode: JobMode) {
    let labels = [("mode", mode.as_str().to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_job_rejected(mode: JobMode) {
    let labels = [("mode", mode.as_str().to_string())];
    counter!(names::JOBS_REJECTED_TOTAL, &labels).increment(1);
}
