//! Frame supply stage.

use std::sync::Arc;

use brandlens_media::FrameSource;
use brandlens_models::{Frame, ProgressUpdate, RunState};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::messages::StageMessage;
use crate::progress::ProgressSink;

/// Decode frames into the bounded frame queue until the source ends.
///
/// A decode error before the first frame is fatal. After that it ends the
/// stream early and the frames already sent are kept. Returns the number of
/// frames sent.
pub async fn run_extraction(
    mut source: Box<dyn FrameSource>,
    tx: mpsc::Sender<StageMessage<Frame>>,
    progress: Arc<dyn ProgressSink>,
) -> WorkerResult<u64> {
    progress.report(ProgressUpdate::new(
        RunState::Extracting,
        format!("Decoding frames ({})", source.name()),
    ));

    let mut sent = 0u64;
    loop {
        match source.next_frame().await {
            Ok(Some(frame)) => {
                if tx.send(StageMessage::Item(frame)).await.is_err() {
                    return Err(WorkerError::ChannelClosed("inference"));
                }
                sent += 1;
            }
            Ok(None) => break,
            Err(e) if sent == 0 => return Err(e.into()),
            Err(e) => {
                warn!(frames = sent, error = %e, "Decoder failed mid-stream; ending stream");
                break;
            }
        }
    }

    if sent == 0 {
        return Err(WorkerError::empty_source(source.name()));
    }

    debug!(frames = sent, "Extraction finished");
    if tx.send(StageMessage::EndOfStream).await.is_err() {
        return Err(WorkerError::ChannelClosed("inference"));
    }
    Ok(sent)
}
