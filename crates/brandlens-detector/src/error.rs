//! Detector error types.

use thiserror::Error;

pub type DetectorResult<T> = Result<T, DetectorError>;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Detector service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Detector out of memory: {0}")]
    OutOfMemory(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Frame encoding failed: {0}")]
    Encode(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DetectorError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DetectorError::ServiceUnavailable(_) | DetectorError::Timeout(_) | DetectorError::Network(_)
        )
    }

    /// The batch did not fit in detector memory; smaller batches may succeed.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, DetectorError::OutOfMemory(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(DetectorError::OutOfMemory("cuda".into()).is_out_of_memory());
        assert!(!DetectorError::OutOfMemory("cuda".into()).is_retryable());
        assert!(DetectorError::ServiceUnavailable("down".into()).is_retryable());
        assert!(!DetectorError::InvalidResponse("bad".into()).is_retryable());
    }
}
