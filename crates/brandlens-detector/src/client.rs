//! Detector service HTTP client.

use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use brandlens_models::{Frame, FrameIndex, RawDetection};
use image::codecs::jpeg::JpegEncoder;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use crate::detector::Detector;
use crate::error::{DetectorError, DetectorResult};
use crate::types::{DetectRequest, DetectResponse, EncodedFrame, HealthResponse};

const JPEG_QUALITY: u8 = 90;

/// Configuration for the detector client.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Base URL of the detector service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries
    pub max_retries: u32,
    /// Minimum confidence requested from the service
    pub confidence: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 2,
            confidence: 0.25,
        }
    }
}

impl DetectorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("DETECTOR_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            timeout: Duration::from_secs(
                std::env::var("DETECTOR_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            max_retries: std::env::var("DETECTOR_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            confidence: std::env::var("DETECTOR_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.25),
        }
    }
}

/// Client for the detector service.
pub struct HttpDetector {
    http: Client,
    config: DetectorConfig,
}

impl HttpDetector {
    pub fn new(config: DetectorConfig) -> DetectorResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(DetectorError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> DetectorResult<Self> {
        Self::new(DetectorConfig::from_env())
    }

    /// Check if the detector service is healthy.
    pub async fn health_check(&self) -> DetectorResult<bool> {
        let url = format!("{}/health", self.config.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Detector health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Detector health check error: {}", e);
                Ok(false)
            }
        }
    }

    async fn post_detect(&self, url: &str, request: &DetectRequest) -> DetectorResult<DetectResponse> {
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DetectorError::Timeout(self.config.timeout.as_secs())
                } else {
                    DetectorError::Network(e)
                }
            })?;

        classify(response).await
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> DetectorResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = DetectorResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Detector request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(DetectorError::RequestFailed("Unknown error".to_string())))
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect_batch(&self, frames: &[Frame]) -> DetectorResult<Vec<Vec<RawDetection>>> {
        if frames.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/detect", self.config.base_url);
        let request = DetectRequest {
            frames: encode_frames(frames).await?,
            confidence: self.config.confidence,
        };

        debug!(frames = frames.len(), "Sending detection batch to {}", url);

        let response = self.with_retry(|| self.post_detect(&url, &request)).await?;
        align_results(frames, response)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Map a service response onto the error taxonomy.
async fn classify(response: Response) -> DetectorResult<DetectResponse> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::INSUFFICIENT_STORAGE || body.to_lowercase().contains("out of memory") {
        return Err(DetectorError::OutOfMemory(body));
    }
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return Err(DetectorError::ServiceUnavailable(body));
    }
    Err(DetectorError::RequestFailed(format!(
        "Detector service returned {}: {}",
        status, body
    )))
}

/// Order results by the request's frames; frames the service omitted get no detections.
fn align_results(frames: &[Frame], response: DetectResponse) -> DetectorResult<Vec<Vec<RawDetection>>> {
    let mut by_index: HashMap<FrameIndex, Vec<RawDetection>> = HashMap::with_capacity(response.results.len());
    for result in response.results {
        if by_index.insert(result.index, result.detections).is_some() {
            return Err(DetectorError::InvalidResponse(format!(
                "duplicate result for frame {}",
                result.index
            )));
        }
    }

    let aligned = frames
        .iter()
        .map(|f| by_index.remove(&f.index).unwrap_or_default())
        .collect();

    if !by_index.is_empty() {
        return Err(DetectorError::InvalidResponse(format!(
            "results for {} frames that were not requested",
            by_index.len()
        )));
    }
    Ok(aligned)
}

async fn encode_frames(frames: &[Frame]) -> DetectorResult<Vec<EncodedFrame>> {
    let owned: Vec<Frame> = frames.to_vec();
    tokio::task::spawn_blocking(move || -> DetectorResult<Vec<EncodedFrame>> {
        owned.iter().map(encode_frame).collect()
    })
        .await
        .map_err(|e| DetectorError::Encode(e.to_string()))?
}

fn encode_frame(frame: &Frame) -> DetectorResult<EncodedFrame> {
    let mut jpeg = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode(&frame.data, frame.width, frame.height, image::ColorType::Rgb8)
        .map_err(|e| DetectorError::Encode(format!("frame {}: {}", frame.index, e)))?;

    Ok(EncodedFrame {
        index: frame.index,
        width: frame.width,
        height: frame.height,
        image: base64::engine::general_purpose::STANDARD.encode(jpeg.into_inner()),
    })
}
