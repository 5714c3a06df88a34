//! Run artifacts on disk.
//!
//! Layout per run, keyed by content hash:
//!
//! ```text
//! {results_dir}/{content_hash}/timeline.db
//! {results_dir}/{content_hash}/stats.json
//! {results_dir}/{content_hash}/coverage_per_frame.json.gz
//! {results_dir}/{content_hash}/prominence_per_frame.json.gz
//! {results_dir}/{content_hash}/output.mp4
//! ```

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use brandlens_models::{SeriesMetric, VideoSummary};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::timeline::TimelineReader;

/// Paths of one run's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    dir: PathBuf,
}

impl RunLayout {
    pub fn new(results_dir: impl AsRef<Path>, content_hash: &str) -> Self {
        Self {
            dir: results_dir.as_ref().join(content_hash),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn timeline_db(&self) -> PathBuf {
        self.dir.join("timeline.db")
    }

    pub fn summary_json(&self) -> PathBuf {
        self.dir.join("stats.json")
    }

    pub fn series_export(&self, metric: SeriesMetric) -> PathBuf {
        self.dir.join(format!("{}_per_frame.json.gz", metric.as_str()))
    }

    pub fn overlay_video(&self) -> PathBuf {
        self.dir.join("output.mp4")
    }

    pub async fn ensure_dir(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }
}

/// Whole-run series for every brand, padded to the run length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesExport {
    pub frames_total: u64,
    pub per_logo: BTreeMap<String, Vec<f64>>,
}

/// Write the summary as pretty JSON, atomically.
pub async fn write_summary(path: impl AsRef<Path>, summary: &VideoSummary) -> StorageResult<()> {
    let json = serde_json::to_vec_pretty(summary)?;
    write_atomic(path.as_ref(), &json).await
}

pub async fn read_summary(path: impl AsRef<Path>) -> StorageResult<VideoSummary> {
    let path = path.as_ref();
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(StorageError::not_found(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Export one metric for all brands as gzip JSON, padded with zeros to
/// `frames_total` (or the timeline length, if longer).
pub async fn export_series(
    reader: &TimelineReader,
    metric: SeriesMetric,
    frames_total: u64,
    path: impl AsRef<Path>,
) -> StorageResult<SeriesExport> {
    let max_frame = reader.max_frame().await?;
    let frames_total = frames_total.max(max_frame);

    let mut per_logo = BTreeMap::new();
    for brand in reader.brands().await? {
        let mut values = reader.series(&brand, metric, None, None, 1).await?;
        values.resize(frames_total as usize, 0.0);
        per_logo.insert(brand, values);
    }

    let export = SeriesExport {
        frames_total,
        per_logo,
    };
    let compressed = compress_json(&export)?;
    debug!(
        path = %path.as_ref().display(),
        metric = %metric,
        brands = export.per_logo.len(),
        compressed_size = compressed.len(),
        "Writing series export"
    );
    write_atomic(path.as_ref(), &compressed).await?;
    Ok(export)
}

pub async fn read_series_export(path: impl AsRef<Path>) -> StorageResult<SeriesExport> {
    let bytes = tokio::fs::read(path).await?;
    decompress_json(&bytes)
}

/// Serialize to gzip-compressed JSON bytes.
pub fn compress_json<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    let json = serde_json::to_vec(value)
        .map_err(|e| StorageError::Serialization(format!("Failed to serialize: {}", e)))?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| StorageError::Serialization(format!("Failed to gzip: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| StorageError::Serialization(format!("Failed to finish gzip encoding: {}", e)))
}

pub fn decompress_json<T: for<'de> Deserialize<'de>>(data: &[u8]) -> StorageResult<T> {
    let mut decoder = GzDecoder::new(data);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| StorageError::Serialization(format!("Failed to decompress: {}", e)))?;
    Ok(serde_json::from_slice(&json)?)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::TimelineWriter;
    use brandlens_models::{BrandStats, SeriesPoint};

    #[test]
    fn test_layout() {
        let layout = RunLayout::new("/results", "abc");
        assert_eq!(layout.timeline_db(), PathBuf::from("/results/abc/timeline.db"));
        assert_eq!(layout.summary_json(), PathBuf::from("/results/abc/stats.json"));
        assert_eq!(
            layout.series_export(SeriesMetric::Coverage),
            PathBuf::from("/results/abc/coverage_per_frame.json.gz")
        );
    }

    #[tokio::test]
    async fn test_summary_roundtrip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run/stats.json");

        let mut summary = VideoSummary::default();
        summary.logo_stats.insert(
            "Nike".into(),
            BrandStats {
                frames: 3,
                ..Default::default()
            },
        );
        write_summary(&path, &summary).await.unwrap();
        assert_eq!(read_summary(&path).await.unwrap(), summary);

        assert!(matches!(
            read_summary(dir.path().join("missing.json")).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_export_pads_to_total() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RunLayout::new(dir.path(), "hash");
        let mut writer = TimelineWriter::create(layout.timeline_db(), 10).await.unwrap();
        let point = SeriesPoint {
            brand: "Nike".into(),
            coverage: 5.0,
            prominence: 7.0,
        };
        writer.record_frame(1, &[], &[]).await.unwrap();
        writer.record_frame(2, &[point], &[]).await.unwrap();
        writer.close().await.unwrap();

        let reader = TimelineReader::open(layout.timeline_db()).await.unwrap();
        let path = layout.series_export(SeriesMetric::Prominence);
        let export = export_series(&reader, SeriesMetric::Prominence, 4, &path).await.unwrap();
        assert_eq!(export.per_logo["Nike"], vec![0.0, 7.0, 0.0, 0.0]);

        let read_back = read_series_export(&path).await.unwrap();
        assert_eq!(read_back, export);
    }
}
