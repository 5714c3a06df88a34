//! Worker error types.

use brandlens_models::{AliasError, JobKey};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("A job for {0} is already running")]
    DuplicateJob(String),

    #[error("Source produced no frames: {0}")]
    EmptySource(String),

    #[error("Pipeline stage '{stage}' panicked: {message}")]
    StagePanicked { stage: &'static str, message: String },

    #[error("Pipeline stage '{0}' went away before end of stream")]
    ChannelClosed(&'static str),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] brandlens_media::MediaError),

    #[error("Detector error: {0}")]
    Detector(#[from] brandlens_detector::DetectorError),

    #[error("Storage error: {0}")]
    Storage(#[from] brandlens_storage::StorageError),

    #[error("Alias map error: {0}")]
    Alias(#[from] AliasError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn duplicate(key: &JobKey) -> Self {
        Self::DuplicateJob(key.to_string())
    }

    pub fn empty_source(source: impl Into<String>) -> Self {
        Self::EmptySource(source.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, WorkerError::DuplicateJob(_))
    }

    /// Secondary failure caused by another stage going away.
    pub fn is_channel_closed(&self) -> bool {
        matches!(self, WorkerError::ChannelClosed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandlens_models::JobMode;

    #[test]
    fn test_duplicate_message_names_key() {
        let key = JobKey::new(JobMode::Video, "clip.mp4", "abc123");
        let err = WorkerError::duplicate(&key);
        assert!(err.is_duplicate());
        assert_eq!(err.to_string(), "A job for video:abc123 is already running");
    }
}
