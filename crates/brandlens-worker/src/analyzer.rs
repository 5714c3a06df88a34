//! Run orchestration: from a source string to a finalized summary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use brandlens_analytics::{CalculatorConfig, MetricCalculator};
use brandlens_detector::{DetectionAdapter, Detector};
use brandlens_media::{
    load_image, probe_or_fallback, probe_video, FfmpegDecoder, FfmpegOverlayEncoder, FrameSource,
    ManifestResolver, MediaError, MemoryFrameSource, OverlaySink, VideoInfo, VideoSource,
};
use brandlens_models::{
    AliasMap, JobKey, JobMode, ProcessingInfo, ProgressUpdate, RunState, SeriesMetric,
    VideoMetadata, VideoSummary,
};
use brandlens_storage::{export_series, write_summary, RunLayout, TimelineReader, TimelineWriter};
use futures::future::join_all;
use tracing::{info, warn};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::{run_pipeline, Aggregator, PipelineOutput, PipelineSettings};
use crate::progress::{ProgressSink, ProgressTracker};
use crate::registry::{JobGuard, JobRegistry, RunHandle};

/// A request to analyse one source.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub mode: JobMode,
    pub source: String,
}

impl AnalysisRequest {
    pub fn video(source: impl Into<String>) -> Self {
        Self {
            mode: JobMode::Video,
            source: source.into(),
        }
    }

    pub fn image(source: impl Into<String>) -> Self {
        Self {
            mode: JobMode::Image,
            source: source.into(),
        }
    }
}

/// A run that holds its job lock but has not started processing.
#[derive(Debug)]
pub struct PreparedRun {
    pub handle: RunHandle,
    pub source: VideoSource,
    pub layout: RunLayout,
    guard: JobGuard,
}

impl PreparedRun {
    pub fn key(&self) -> &JobKey {
        self.guard.key()
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.handle.tracker
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub handle: RunHandle,
    pub layout: RunLayout,
    pub summary: VideoSummary,
    pub overlay: Option<PathBuf>,
}

/// Runs analyses. Cheap to share; each run gets its own queues and store.
pub struct BrandAnalyzer {
    config: WorkerConfig,
    detector: Arc<dyn Detector>,
    aliases: AliasMap,
    registry: JobRegistry,
}

impl BrandAnalyzer {
    /// Build an analyzer, loading the alias map from `alias_map_path` when
    /// configured.
    pub fn new(config: WorkerConfig, detector: Arc<dyn Detector>) -> WorkerResult<Self> {
        let aliases = match &config.alias_map_path {
            Some(path) => {
                let aliases = AliasMap::from_path(path)?;
                info!(path = %path.display(), entries = aliases.len(), "Loaded alias map");
                aliases
            }
            None => AliasMap::builtin(),
        };
        Ok(Self {
            config: config.normalized(),
            detector,
            aliases,
            registry: JobRegistry::new(),
        })
    }

    pub fn with_aliases(mut self, aliases: AliasMap) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_registry(mut self, registry: JobRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Hash the source and claim its job key. Fails with
    /// [`WorkerError::DuplicateJob`] when the same key is already running.
    pub async fn prepare(&self, request: &AnalysisRequest) -> WorkerResult<PreparedRun> {
        let source = VideoSource::parse(&request.source)?;
        let content_hash = source.content_hash().await?;
        let key = JobKey::new(request.mode, source.as_input(), content_hash);
        let (guard, handle) = self.registry.try_acquire(key)?;
        let layout = RunLayout::new(&self.config.results_dir, &handle.key.content_hash);

        Ok(PreparedRun {
            handle,
            source,
            layout,
            guard,
        })
    }

    /// Prepare and run in one call.
    pub async fn analyze(&self, request: &AnalysisRequest) -> WorkerResult<RunReport> {
        let prepared = self.prepare(request).await?;
        self.run(prepared).await
    }

    /// Open the prepared source and run it to completion.
    pub async fn run(&self, prepared: PreparedRun) -> WorkerResult<RunReport> {
        let logger = JobLogger::new(&prepared.handle.job_id, prepared.key());
        logger.log_start(&prepared.source.to_string());
        prepared.tracker().report(ProgressUpdate::new(
            RunState::Extracting,
            "Opening source",
        ));

        match self.open_source(&prepared).await {
            Ok((source, info)) => self.execute(prepared, source, info).await,
            Err(e) => {
                let mode = prepared.key().mode;
                self.fail(&prepared, &logger, mode, &e);
                Err(e)
            }
        }
    }

    /// Run a prepared job over an already-open frame source.
    pub async fn run_with_source(
        &self,
        prepared: PreparedRun,
        source: Box<dyn FrameSource>,
        info: VideoInfo,
    ) -> WorkerResult<RunReport> {
        self.execute(prepared, source, info).await
    }

    async fn open_source(
        &self,
        prepared: &PreparedRun,
    ) -> WorkerResult<(Box<dyn FrameSource>, VideoInfo)> {
        match prepared.key().mode {
            JobMode::Image => {
                let path = prepared.source.local_path().ok_or_else(|| {
                    MediaError::invalid_source("image analysis needs a local file")
                })?;
                let frame = load_image(path).await?;
                let info = VideoInfo {
                    total_frames: Some(1),
                    ..VideoInfo::fallback(frame.width, frame.height, 0.0)
                };
                Ok((Box::new(MemoryFrameSource::new(vec![frame])), info))
            }
            JobMode::Video => {
                let timeout = self.config.probe_timeout;
                let (input, info) = match &prepared.source {
                    VideoSource::Local(_) => {
                        let input = prepared.source.as_input();
                        let info = probe_video(&input, timeout).await?;
                        (input, info)
                    }
                    VideoSource::Remote(url) => {
                        let resolved = ManifestResolver::new(timeout)?.resolve(url).await?;
                        let input = resolved.to_string();
                        let fallback = VideoInfo::fallback(
                            self.config.fallback_width,
                            self.config.fallback_height,
                            self.config.fallback_fps,
                        );
                        let info = probe_or_fallback(&input, timeout, fallback).await;
                        (input, info)
                    }
                };
                if info.width == 0 || info.height == 0 {
                    return Err(MediaError::InvalidVideo(format!(
                        "{} has no video dimensions",
                        input
                    ))
                    .into());
                }
                let decoder = FfmpegDecoder::spawn(&input, info.width, info.height)?;
                Ok((Box::new(decoder), info))
            }
        }
    }

    async fn execute(
        &self,
        prepared: PreparedRun,
        source: Box<dyn FrameSource>,
        info: VideoInfo,
    ) -> WorkerResult<RunReport> {
        let logger = JobLogger::new(&prepared.handle.job_id, prepared.key());
        let mode = prepared.key().mode;
        let started = Instant::now();

        match self.process(&prepared, &logger, source, &info).await {
            Ok((summary, overlay)) => {
                let elapsed = started.elapsed().as_secs_f64();
                prepared
                    .tracker()
                    .report(ProgressUpdate::new(RunState::Complete, "Analysis complete"));
                metrics::record_job_completed(mode, elapsed);
                logger.log_completion(
                    summary.video_metadata.total_frames,
                    summary.logo_stats.len(),
                    elapsed,
                );
                Ok(RunReport {
                    handle: prepared.handle.clone(),
                    layout: prepared.layout.clone(),
                    summary,
                    overlay,
                })
            }
            Err(e) => {
                self.fail(&prepared, &logger, mode, &e);
                Err(e)
            }
        }
    }

    fn fail(&self, prepared: &PreparedRun, logger: &JobLogger, mode: JobMode, error: &WorkerError) {
        logger.log_error(&error.to_string());
        prepared.tracker().fail(error.to_string());
        metrics::record_job_failed(mode);
    }

    async fn process(
        &self,
        prepared: &PreparedRun,
        logger: &JobLogger,
        source: Box<dyn FrameSource>,
        info: &VideoInfo,
    ) -> WorkerResult<(VideoSummary, Option<PathBuf>)> {
        let mode = prepared.key().mode;
        let layout = &prepared.layout;
        layout.ensure_dir().await?;

        let writer = TimelineWriter::create(layout.timeline_db(), self.config.commit_interval).await?;
        let calculator = MetricCalculator::new(CalculatorConfig {
            fps: info.fps,
            // A still has one frame; any brand detected in it is reported.
            min_detections: match mode {
                JobMode::Image => 1,
                JobMode::Video => self.config.min_detections,
            },
            high_prominence_threshold: self.config.high_prominence_threshold,
        });
        let adapter = DetectionAdapter::new(self.aliases.clone(), self.config.min_confidence);

        let mut aggregator =
            Aggregator::new(adapter, calculator, writer).with_total_frames(info.total_frames);
        if let Some(overlay) = self.spawn_overlay(mode, layout, info, logger) {
            aggregator = aggregator.with_overlay(overlay);
        }

        let progress: Arc<dyn ProgressSink> = Arc::new(prepared.tracker().clone());
        let settings = PipelineSettings {
            batch_size: self.config.batch_size,
            frame_queue_capacity: self.config.frame_queue_capacity,
            result_queue_capacity: self.config.result_queue_capacity,
        };
        let PipelineOutput {
            aggregator,
            frames,
            inference,
        } = run_pipeline(
            source,
            self.detector.clone(),
            aggregator,
            progress,
            settings,
            logger.create_span(),
        )
        .await?;

        let tracker = prepared.tracker();
        tracker.report(ProgressUpdate::new(RunState::Assembling, "Assembling outputs"));
        let Aggregator {
            calculator,
            writer,
            overlay,
            ..
        } = aggregator;

        let overlay_path = match overlay {
            Some(sink) => match sink.finish().await {
                Ok(path) => Some(path),
                Err(e) => {
                    logger.log_warning(RunState::Assembling, &format!("Overlay video failed: {}", e));
                    None
                }
            },
            None => None,
        };

        tracker.report(ProgressUpdate::new(RunState::Finalizing, "Finalizing summary"));
        let logo_stats = calculator.finalize();
        writer.close().await?;

        let summary = VideoSummary {
            video_metadata: VideoMetadata {
                duration: if info.fps > 0.0 { frames as f64 / info.fps } else { 0.0 },
                fps: info.fps,
                total_frames: frames,
                width: info.width,
                height: info.height,
            },
            logo_stats,
            processing_info: Some(ProcessingInfo {
                detector: self.detector.name().to_string(),
                batch_size: self.config.batch_size,
                detection_seconds: tracker.snapshot().detection_elapsed_s,
                frames_dropped: inference.frames_dropped,
                oom_fallbacks: inference.oom_fallbacks,
            }),
        };
        write_summary(layout.summary_json(), &summary).await?;
        self.export_series(layout, frames, logger).await;

        Ok((summary, overlay_path))
    }

    fn spawn_overlay(
        &self,
        mode: JobMode,
        layout: &RunLayout,
        info: &VideoInfo,
        logger: &JobLogger,
    ) -> Option<Box<dyn OverlaySink>> {
        if !self.config.render_overlay || mode != JobMode::Video {
            return None;
        }
        match FfmpegOverlayEncoder::spawn(layout.overlay_video(), info.width, info.height, info.fps) {
            Ok(encoder) => Some(Box::new(encoder)),
            Err(e) => {
                logger.log_warning(
                    RunState::Extracting,
                    &format!("Overlay encoder unavailable: {}", e),
                );
                None
            }
        }
    }

    /// Gzip series exports. Failures are logged and otherwise ignored.
    async fn export_series(&self, layout: &RunLayout, frames: u64, logger: &JobLogger) {
        let reader = match TimelineReader::open(layout.timeline_db()).await {
            Ok(reader) => reader,
            Err(e) => {
                warn!(job_id = logger.job_id(), error = %e, "Could not open timeline for export");
                return;
            }
        };
        let exports = [SeriesMetric::Coverage, SeriesMetric::Prominence].map(|metric| {
            let path = layout.series_export(metric);
            let reader = &reader;
            async move { (export_series(reader, metric, frames, &path).await, path) }
        });
        for (result, path) in join_all(exports).await {
            if let Err(e) = result {
                logger.log_warning(
                    RunState::Finalizing,
                    &format!("Series export {} failed: {}", path.display(), e),
                );
            }
        }
        reader.close().await;
    }
}
