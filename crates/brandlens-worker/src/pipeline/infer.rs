//! Batched inference stage.
//!
//! This is the only stage that talks to the detector, so detector calls for
//! a job are serial. A failed batch is retried one frame at a time in the
//! same task; a frame that still fails is passed on with no detections, so
//! downstream always sees exactly one result per decoded frame.

use std::sync::Arc;
use std::time::Instant;

use brandlens_detector::{Detector, DetectorError};
use brandlens_models::{Frame, ProgressUpdate, RawDetection, RunState};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::pipeline::messages::{InferredBatch, InferredFrame, StageMessage};
use crate::progress::ProgressSink;

/// Counters reported by the inference stage.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InferenceStats {
    pub frames: u64,
    pub batches: u64,
    pub frames_dropped: u64,
    pub oom_fallbacks: u64,
}

pub async fn run_inference(
    detector: Arc<dyn Detector>,
    mut rx: mpsc::Receiver<StageMessage<Frame>>,
    tx: mpsc::Sender<StageMessage<InferredBatch>>,
    batch_size: usize,
    progress: Arc<dyn ProgressSink>,
) -> WorkerResult<InferenceStats> {
    let batch_size = batch_size.max(1);
    let mut stats = InferenceStats::default();
    let mut reported = false;

    loop {
        let (batch, ended) = next_batch(&mut rx, batch_size).await?;

        if !batch.is_empty() {
            if !reported {
                progress.report(ProgressUpdate::new(
                    RunState::Inferring,
                    format!("Running {} detector", detector.name()),
                ));
                reported = true;
            }

            let inferred = infer_batch(detector.as_ref(), batch, &mut stats).await;
            stats.batches += 1;
            if tx.send(StageMessage::Item(inferred)).await.is_err() {
                return Err(WorkerError::ChannelClosed("aggregation"));
            }
        }

        if ended {
            break;
        }
    }

    debug!(
        frames = stats.frames,
        batches = stats.batches,
        dropped = stats.frames_dropped,
        oom_fallbacks = stats.oom_fallbacks,
        "Inference finished"
    );
    if tx.send(StageMessage::EndOfStream).await.is_err() {
        return Err(WorkerError::ChannelClosed("aggregation"));
    }
    Ok(stats)
}

/// Block for up to `batch_size` frames. Returns whether end of stream was
/// reached.
async fn next_batch(
    rx: &mut mpsc::Receiver<StageMessage<Frame>>,
    batch_size: usize,
) -> WorkerResult<(Vec<Frame>, bool)> {
    let mut batch = Vec::with_capacity(batch_size);
    while batch.len() < batch_size {
        match rx.recv().await {
            Some(StageMessage::Item(frame)) => batch.push(frame),
            Some(StageMessage::EndOfStream) => return Ok((batch, true)),
            None => return Err(WorkerError::ChannelClosed("extraction")),
        }
    }
    Ok((batch, false))
}

async fn infer_batch(
    detector: &dyn Detector,
    frames: Vec<Frame>,
    stats: &mut InferenceStats,
) -> InferredBatch {
    stats.frames += frames.len() as u64;

    let started = Instant::now();
    let outcome = detector.detect_batch(&frames).await;
    let elapsed = started.elapsed().as_secs_f64();

    let error = match outcome {
        Ok(results) if results.len() == frames.len() => {
            metrics::record_detector_batch("ok", elapsed);
            return frames
                .into_iter()
                .zip(results)
                .map(|(frame, detections)| InferredFrame {
                    frame,
                    detections,
                    dropped: false,
                })
                .collect();
        }
        Ok(results) => DetectorError::InvalidResponse(format!(
            "expected {} results, got {}",
            frames.len(),
            results.len()
        )),
        Err(e) => e,
    };
    metrics::record_detector_batch("error", elapsed);

    if error.is_out_of_memory() {
        stats.oom_fallbacks += 1;
        metrics::record_oom_fallback();
        warn!(
            first_frame = frames.first().map(|f| f.index),
            batch = frames.len(),
            "Detector out of memory; retrying batch one frame at a time"
        );
    } else {
        warn!(
            first_frame = frames.first().map(|f| f.index),
            batch = frames.len(),
            error = %error,
            "Detector batch failed; retrying one frame at a time"
        );
    }

    let single_frame_batch = frames.len() == 1;
    let mut inferred = Vec::with_capacity(frames.len());
    for frame in frames {
        let detections = if single_frame_batch {
            Err(error.to_string())
        } else {
            detect_one(detector, &frame).await
        };
        match detections {
            Ok(detections) => inferred.push(InferredFrame {
                frame,
                detections,
                dropped: false,
            }),
            Err(reason) => {
                stats.frames_dropped += 1;
                metrics::record_frame_dropped();
                warn!(frame = frame.index, error = %reason, "Dropping frame detections");
                inferred.push(InferredFrame {
                    frame,
                    detections: Vec::new(),
                    dropped: true,
                });
            }
        }
    }
    inferred
}

async fn detect_one(detector: &dyn Detector, frame: &Frame) -> Result<Vec<RawDetection>, String> {
    match detector.detect_batch(std::slice::from_ref(frame)).await {
        Ok(mut results) if results.len() == 1 => Ok(results.pop().unwrap_or_default()),
        Ok(results) => Err(format!("expected 1 result, got {}", results.len())),
        Err(e) => Err(e.to_string()),
    }
}
