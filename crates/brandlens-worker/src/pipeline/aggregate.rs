//! Aggregation stage: metrics, persistence, overlays and progress.

use std::sync::Arc;

use brandlens_analytics::MetricCalculator;
use brandlens_detector::DetectionAdapter;
use brandlens_media::OverlaySink;
use brandlens_models::{ProgressUpdate, RunState};
use brandlens_storage::TimelineWriter;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::pipeline::messages::{InferredBatch, StageMessage};
use crate::progress::ProgressSink;

/// Everything the aggregation stage owns for the run. Handed back when the
/// stream ends so the caller can finalize it.
pub struct Aggregator {
    pub adapter: DetectionAdapter,
    pub calculator: MetricCalculator,
    pub writer: TimelineWriter,
    pub overlay: Option<Box<dyn OverlaySink>>,
    /// Expected frame count for progress, when known
    pub total_frames: Option<u64>,
}

impl Aggregator {
    pub fn new(adapter: DetectionAdapter, calculator: MetricCalculator, writer: TimelineWriter) -> Self {
        Self {
            adapter,
            calculator,
            writer,
            overlay: None,
            total_frames: None,
        }
    }

    pub fn with_overlay(mut self, overlay: Box<dyn OverlaySink>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn with_total_frames(mut self, total_frames: Option<u64>) -> Self {
        self.total_frames = total_frames;
        self
    }

    async fn consume(&mut self, batch: InferredBatch) -> WorkerResult<()> {
        let batch_len = batch.len() as u64;
        for item in batch {
            let frame = item.frame;
            let detections = self.adapter.ingest(frame.index, item.detections);
            let output =
                self.calculator
                    .process_frame(frame.index, frame.width, frame.height, &detections);

            self.writer
                .record_frame(output.index, &output.points, &output.records)
                .await?;

            if let Some(overlay) = self.overlay.as_mut() {
                if let Err(e) = overlay.write_frame(&frame, &output.records).await {
                    warn!(frame = frame.index, error = %e, "Overlay encoding failed; disabling overlay");
                    self.overlay = None;
                }
            }
        }
        metrics::record_frames_processed(batch_len);
        Ok(())
    }
}

pub async fn run_aggregation(
    mut aggregator: Aggregator,
    mut rx: mpsc::Receiver<StageMessage<InferredBatch>>,
    progress: Arc<dyn ProgressSink>,
) -> WorkerResult<Aggregator> {
    loop {
        match rx.recv().await {
            Some(StageMessage::Item(batch)) => {
                aggregator.consume(batch).await?;

                let frame = aggregator.calculator.last_frame();
                progress.report(
                    ProgressUpdate::new(RunState::Aggregating, format!("Processed frame {}", frame))
                        .with_frame(frame, aggregator.total_frames),
                );
            }
            Some(StageMessage::EndOfStream) => break,
            None => return Err(WorkerError::ChannelClosed("inference")),
        }
    }

    debug!(
        frames = aggregator.calculator.frames_processed(),
        "Aggregation finished"
    );
    Ok(aggregator)
}
