//! Structured job logging.
//!
//! Every line carries the job ID, the job key and the current stage so a
//! single run can be followed through interleaved output from concurrent
//! jobs.

use brandlens_models::{JobId, JobKey, RunState};
use tracing::{error, info, warn, Span};

/// Lifecycle logger bound to one run.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    key: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, key: &JobKey) -> Self {
        Self {
            job_id: job_id.to_string(),
            key: key.to_string(),
        }
    }

    pub fn log_start(&self, source: &str) {
        info!(job_id = %self.job_id, key = %self.key, source = %source, "Job started");
    }

    pub fn log_stage(&self, stage: RunState, message: &str) {
        info!(
            job_id = %self.job_id,
            key = %self.key,
            stage = %stage,
            "{}", message
        );
    }

    pub fn log_warning(&self, stage: RunState, message: &str) {
        warn!(
            job_id = %self.job_id,
            key = %self.key,
            stage = %stage,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, key = %self.key, "Job failed: {}", message);
    }

    pub fn log_completion(&self, frames: u64, brands: usize, elapsed_s: f64) {
        info!(
            job_id = %self.job_id,
            key = %self.key,
            frames = frames,
            brands = brands,
            elapsed_s = elapsed_s,
            "Job completed"
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Span wrapping the run's stage tasks.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, key = %self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandlens_models::JobMode;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::from_string("job-1");
        let key = JobKey::new(JobMode::Image, "logo.png", "ff00");
        let logger = JobLogger::new(&job_id, &key);

        assert_eq!(logger.job_id(), "job-1");
        assert_eq!(logger.key, "image:ff00");
    }
}
