//! Three-stage analysis pipeline.
//!
//! ```text
//! FrameSource -> [extraction] -> frames (bounded) -> [inference] -> batches (bounded) -> [aggregation]
//! ```
//!
//! Each stage runs as its own task. The frame queue is the backpressure
//! point: extraction blocks once it holds `frame_queue_capacity` frames.
//! Every stage consumes in enqueue order, so the timeline store receives
//! frames in non-decreasing index order. An explicit end-of-stream message
//! flows through both queues; a queue that closes without one tells the
//! receiver its upstream failed.

pub mod aggregate;
pub mod extract;
pub mod infer;
pub mod messages;

use std::any::Any;
use std::sync::Arc;

use brandlens_detector::Detector;
use brandlens_media::FrameSource;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{error, Instrument, Span};

pub use aggregate::{run_aggregation, Aggregator};
pub use extract::run_extraction;
pub use infer::{run_inference, InferenceStats};
pub use messages::{InferredBatch, InferredFrame, StageMessage};

use crate::error::{WorkerError, WorkerResult};
use crate::progress::ProgressSink;

/// Queue sizing for one run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub batch_size: usize,
    pub frame_queue_capacity: usize,
    pub result_queue_capacity: usize,
}

/// What a completed pipeline hands back for finalization.
pub struct PipelineOutput {
    pub aggregator: Aggregator,
    pub frames: u64,
    pub inference: InferenceStats,
}

/// Run all three stages to completion.
///
/// All stages are joined before returning. When several fail, the error of
/// the stage that failed first in the chain is returned rather than the
/// closed-channel errors it caused in its neighbours.
pub async fn run_pipeline(
    source: Box<dyn FrameSource>,
    detector: Arc<dyn Detector>,
    aggregator: Aggregator,
    progress: Arc<dyn ProgressSink>,
    settings: PipelineSettings,
    span: Span,
) -> WorkerResult<PipelineOutput> {
    let (frame_tx, frame_rx) = mpsc::channel(settings.frame_queue_capacity.max(1));
    let (batch_tx, batch_rx) = mpsc::channel(settings.result_queue_capacity.max(1));

    let extraction = tokio::spawn(
        run_extraction(source, frame_tx, progress.clone()).instrument(span.clone()),
    );
    let inference = tokio::spawn(
        run_inference(detector, frame_rx, batch_tx, settings.batch_size, progress.clone())
            .instrument(span.clone()),
    );
    let aggregation =
        tokio::spawn(run_aggregation(aggregator, batch_rx, progress).instrument(span));

    let (extraction, inference, aggregation) = tokio::join!(extraction, inference, aggregation);
    let extraction = flatten("extraction", extraction);
    let inference = flatten("inference", inference);
    let aggregation = flatten("aggregation", aggregation);

    match (extraction, inference, aggregation) {
        (Ok(frames), Ok(inference), Ok(aggregator)) => Ok(PipelineOutput {
            aggregator,
            frames,
            inference,
        }),
        (extraction, inference, aggregation) => {
            let errors: Vec<WorkerError> = [
                extraction.err(),
                inference.err(),
                aggregation.map(|_| ()).err(),
            ]
            .into_iter()
            .flatten()
            .collect();
            Err(root_cause(errors))
        }
    }
}

fn flatten<T>(stage: &'static str, joined: Result<WorkerResult<T>, JoinError>) -> WorkerResult<T> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            error!(stage = stage, "Pipeline stage panicked: {}", message);
            Err(WorkerError::StagePanicked { stage, message })
        }
        Err(e) => Err(WorkerError::StagePanicked {
            stage,
            message: e.to_string(),
        }),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn root_cause(errors: Vec<WorkerError>) -> WorkerError {
    let mut fallback = None;
    for err in errors {
        if !err.is_channel_closed() {
            return err;
        }
        fallback.get_or_insert(err);
    }
    fallback.unwrap_or(WorkerError::ChannelClosed("pipeline"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_skips_closed_channels() {
        let err = root_cause(vec![
            WorkerError::ChannelClosed("inference"),
            WorkerError::empty_source("memory"),
        ]);
        assert!(matches!(err, WorkerError::EmptySource(_)));
    }

    #[test]
    fn test_panic_message_from_string_payload() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("boom"));
        assert_eq!(panic_message(payload), "boom");
    }
}
