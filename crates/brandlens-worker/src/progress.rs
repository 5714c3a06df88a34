//! Run progress tracking.
//!
//! Stages report through [`ProgressSink`]; the [`ProgressTracker`] folds
//! reports into a [`ProgressSnapshot`] that readers observe through a watch
//! channel. Reports may arrive concurrently and out of order from the
//! inference and aggregation stages, so the tracker clamps rather than
//! trusts them.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use brandlens_models::{ProgressSnapshot, ProgressUpdate, RunState};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Receiver of stage progress reports.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

#[derive(Debug)]
struct TrackerState {
    snapshot: ProgressSnapshot,
    detection_started: Option<Instant>,
    detection_frozen: bool,
}

impl TrackerState {
    fn refresh_elapsed(&mut self) {
        if let (Some(started), false) = (self.detection_started, self.detection_frozen) {
            self.snapshot.detection_elapsed_s = started.elapsed().as_secs_f64();
        }
    }

    fn apply(&mut self, update: ProgressUpdate) -> bool {
        let current = self.snapshot.stage;
        if current.is_terminal() {
            return false;
        }
        if !current.can_transition_to(update.stage) {
            debug!(from = %current, to = %update.stage, "Ignoring out-of-order progress report");
            return false;
        }

        if update.stage == RunState::Inferring && self.detection_started.is_none() {
            self.detection_started = Some(Instant::now());
        }
        self.refresh_elapsed();
        if matches!(
            update.stage,
            RunState::Assembling | RunState::Finalizing | RunState::Complete | RunState::Error
        ) {
            self.detection_frozen = true;
        }

        let snapshot = &mut self.snapshot;
        snapshot.stage = update.stage;
        snapshot.message = update.message;
        if let Some(frame) = update.frame {
            snapshot.current_frame = snapshot.current_frame.max(frame);
        }
        if update.total_frames.is_some() {
            snapshot.total_frames = update.total_frames;
        }
        if let Some(pct) = update.percentage.filter(|p| p.is_finite()) {
            snapshot.percentage = snapshot.percentage.max(pct.clamp(0.0, 100.0));
        }
        if update.stage == RunState::Complete {
            snapshot.percentage = 100.0;
        }
        snapshot.updated_at = Utc::now();
        true
    }
}

/// Progress of one run, shared between its stages and any readers.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    state: Arc<Mutex<TrackerState>>,
    tx: Arc<watch::Sender<ProgressSnapshot>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let snapshot = ProgressSnapshot {
            updated_at: Utc::now(),
            ..Default::default()
        };
        let (tx, _rx) = watch::channel(snapshot.clone());
        Self {
            state: Arc::new(Mutex::new(TrackerState {
                snapshot,
                detection_started: None,
                detection_frozen: false,
            })),
            tx: Arc::new(tx),
        }
    }

    /// Current snapshot, with the detection timer brought up to date.
    pub fn snapshot(&self) -> ProgressSnapshot {
        match self.state.lock() {
            Ok(mut state) => {
                state.refresh_elapsed();
                state.snapshot.clone()
            }
            Err(poisoned) => poisoned.into_inner().snapshot.clone(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }

    pub fn stage(&self) -> RunState {
        self.snapshot().stage
    }

    /// Move the run to `Error`, keeping the message for readers.
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        self.apply(ProgressUpdate::new(RunState::Error, message.clone()), Some(message));
    }

    fn apply(&self, update: ProgressUpdate, error: Option<String>) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => {
                warn!("Progress state lock poisoned; recovering");
                poisoned.into_inner()
            }
        };
        if state.apply(update) {
            if error.is_some() {
                state.snapshot.error = error;
            }
            self.tx.send_replace(state.snapshot.clone());
        }
    }
}

impl ProgressSink for ProgressTracker {
    fn report(&self, update: ProgressUpdate) {
        self.apply(update, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_is_monotonic() {
        let tracker = ProgressTracker::new();
        tracker.report(ProgressUpdate::new(RunState::Extracting, "decoding"));
        tracker.report(ProgressUpdate::new(RunState::Aggregating, "a").with_percentage(40.0));
        tracker.report(ProgressUpdate::new(RunState::Aggregating, "b").with_percentage(25.0));
        tracker.report(ProgressUpdate::new(RunState::Aggregating, "c").with_percentage(250.0));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.percentage, 100.0);
        assert_eq!(snapshot.message, "c");
    }

    #[test]
    fn test_current_frame_never_moves_back() {
        let tracker = ProgressTracker::new();
        tracker.report(ProgressUpdate::new(RunState::Extracting, "x"));
        tracker.report(ProgressUpdate::new(RunState::Inferring, "x").with_frame(30, Some(100)));
        tracker.report(ProgressUpdate::new(RunState::Aggregating, "x").with_frame(10, Some(100)));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.current_frame, 30);
        assert_eq!(snapshot.percentage, 30.0);
        assert_eq!(snapshot.total_frames, Some(100));
    }

    #[test]
    fn test_invalid_transition_ignored() {
        let tracker = ProgressTracker::new();
        tracker.report(ProgressUpdate::new(RunState::Complete, "too early"));
        assert_eq!(tracker.stage(), RunState::Idle);
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let tracker = ProgressTracker::new();
        tracker.report(ProgressUpdate::new(RunState::Extracting, "x"));
        tracker.fail("decoder exploded");
        tracker.report(ProgressUpdate::new(RunState::Inferring, "late"));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.stage, RunState::Error);
        assert_eq!(snapshot.error.as_deref(), Some("decoder exploded"));
    }

    #[test]
    fn test_detection_timer_frozen_after_assembling() {
        let tracker = ProgressTracker::new();
        tracker.report(ProgressUpdate::new(RunState::Extracting, "x"));
        assert_eq!(tracker.snapshot().detection_elapsed_s, 0.0);

        tracker.report(ProgressUpdate::new(RunState::Inferring, "x"));
        std::thread::sleep(std::time::Duration::from_millis(5));
        tracker.report(ProgressUpdate::new(RunState::Assembling, "x"));

        let frozen = tracker.snapshot().detection_elapsed_s;
        assert!(frozen > 0.0);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(tracker.snapshot().detection_elapsed_s, frozen);
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let tracker = ProgressTracker::new();
        let mut rx = tracker.subscribe();
        tracker.report(ProgressUpdate::new(RunState::Extracting, "decoding"));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().stage, RunState::Extracting);
    }
}
