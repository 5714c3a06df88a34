//! Application state.

use std::sync::Arc;

use brandlens_storage::{RunLayout, StorageError, TimelineReader};
use brandlens_worker::{BrandAnalyzer, JobRegistry};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub analyzer: Arc<BrandAnalyzer>,
}

impl AppState {
    pub fn new(config: ApiConfig, analyzer: BrandAnalyzer) -> Self {
        Self {
            config,
            analyzer: Arc::new(analyzer),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        self.analyzer.registry()
    }

    /// Artifact layout for a run ID (the source content hash). IDs are
    /// restricted to hex so they cannot escape the results directory.
    pub fn layout(&self, run_id: &str) -> ApiResult<RunLayout> {
        if run_id.is_empty() || run_id.len() > 128 || !run_id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ApiError::bad_request(format!("invalid run id '{}'", run_id)));
        }
        Ok(RunLayout::new(&self.analyzer.config().results_dir, run_id))
    }

    /// Open a read handle on a run's timeline.
    pub async fn timeline(&self, run_id: &str) -> ApiResult<TimelineReader> {
        let layout = self.layout(run_id)?;
        TimelineReader::open(layout.timeline_db())
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => ApiError::not_found(format!("run {}", run_id)),
                other => other.into(),
            })
    }
}
