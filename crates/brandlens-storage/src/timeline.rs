//! SQLite timeline store.
//!
//! Per-frame, per-brand series points and detection geometry for one run.
//! Only nonzero points are stored; reads densify the requested range with
//! zeros up to the highest committed frame. The database runs in WAL mode so
//! one [`TimelineWriter`] and any number of [`TimelineReader`]s can share it.
//!
//! Tables:
//! - `brands(id, name UNIQUE)`
//! - `points(frame, brand_id, coverage, prominence)`, primary key `(frame, brand_id)`
//! - `detections(id, frame, brand_id, polygon, bbox)`, geometry as JSON
//! - `run_meta(key, value)`, holding `max_frame`

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use brandlens_models::{DetectionRecord, FrameIndex, SeriesMetric, SeriesPoint};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);
const READER_CONNECTIONS: u32 = 4;

/// Frames per write transaction unless configured otherwise.
pub const DEFAULT_COMMIT_INTERVAL: u64 = 100;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS brands (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS points (
        frame INTEGER NOT NULL,
        brand_id INTEGER NOT NULL REFERENCES brands(id),
        coverage REAL NOT NULL,
        prominence REAL NOT NULL,
        PRIMARY KEY (frame, brand_id)
    ) WITHOUT ROWID",
    "CREATE INDEX IF NOT EXISTS idx_points_brand_frame ON points (brand_id, frame)",
    "CREATE TABLE IF NOT EXISTS detections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        frame INTEGER NOT NULL,
        brand_id INTEGER NOT NULL REFERENCES brands(id),
        polygon TEXT NOT NULL,
        bbox TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_detections_frame ON detections (frame, brand_id)",
    "CREATE TABLE IF NOT EXISTS run_meta (
        key TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    )",
];

async fn connect(path: &Path, create: bool, max_connections: u32) -> StorageResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);

    Ok(SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?)
}

async fn read_max_frame<'e, E>(executor: E) -> StorageResult<u64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let value: Option<i64> =
        sqlx::query_scalar("SELECT value FROM run_meta WHERE key = 'max_frame'")
            .fetch_optional(executor)
            .await?;
    Ok(value.unwrap_or(0).max(0) as u64)
}

fn column(metric: SeriesMetric) -> &'static str {
    match metric {
        SeriesMetric::Coverage => "coverage",
        SeriesMetric::Prominence => "prominence",
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Stride giving at most `max_points` samples over `start..=end`.
pub fn auto_stride(start: u64, end: u64, max_points: u64) -> u64 {
    if end < start || max_points == 0 {
        return 1;
    }
    let span = end - start + 1;
    span.div_ceil(max_points).max(1)
}

/// A resolved, clamped read range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: FrameIndex,
    pub end: FrameIndex,
    pub stride: u64,
}

impl FrameRange {
    /// Clamp a request to `1..=max_frame`. `None` when nothing is readable.
    ///
    /// A stride longer than the range samples only `start`.
    pub fn resolve(
        start: Option<FrameIndex>,
        end: Option<FrameIndex>,
        stride: u64,
        max_frame: FrameIndex,
    ) -> Option<Self> {
        let start = start.unwrap_or(1).max(1);
        let end = end.unwrap_or(max_frame).min(max_frame);
        (start <= end).then_some(Self {
            start,
            end,
            stride: stride.clamp(1, end - start + 1),
        })
    }

    /// Number of sampled frames.
    pub fn len(&self) -> usize {
        ((self.end - self.start) / self.stride + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sampled frame indices.
    pub fn frames(&self) -> impl Iterator<Item = FrameIndex> + '_ {
        (self.start..=self.end).step_by(self.stride as usize)
    }
}

/// A densified slice of one brand's series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSlice {
    pub range: Option<FrameRange>,
    pub values: Vec<f64>,
}

/// The single writer of a run's timeline.
///
/// Writes are batched into transactions committed every `commit_interval`
/// frames; readers only ever see committed frames.
pub struct TimelineWriter {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
    brand_ids: HashMap<String, i64>,
    high_water: FrameIndex,
    commit_interval: u64,
    pending_frames: u64,
    path: PathBuf,
}

impl TimelineWriter {
    /// Start a fresh timeline, discarding any previous database at `path`.
    pub async fn create(path: impl AsRef<Path>, commit_interval: u64) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        for suffix in ["", "-wal", "-shm"] {
            match tokio::fs::remove_file(sibling(path, suffix)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Self::open(path, commit_interval).await
    }

    /// Open (or create) a timeline and continue writing to it.
    pub async fn open(path: impl AsRef<Path>, commit_interval: u64) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let pool = connect(&path, true, 1).await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        let high_water = read_max_frame(&pool).await?;
        let brand_ids: HashMap<String, i64> =
            sqlx::query_as::<_, (String, i64)>("SELECT name, id FROM brands")
                .fetch_all(&pool)
                .await?
                .into_iter()
                .collect();

        info!(
            path = %path.display(),
            max_frame = high_water,
            brands = brand_ids.len(),
            "Opened timeline writer"
        );

        Ok(Self {
            pool,
            tx: None,
            brand_ids,
            high_water,
            commit_interval: commit_interval.max(1),
            pending_frames: 0,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Highest frame recorded so far, committed or not.
    pub fn high_water(&self) -> FrameIndex {
        self.high_water
    }

    /// Record one brand's values and detections for a frame. Re-recording a
    /// `(frame, brand)` pair replaces the earlier values.
    pub async fn record(
        &mut self,
        frame: FrameIndex,
        brand: &str,
        coverage: f64,
        prominence: f64,
        detections: &[DetectionRecord],
    ) -> StorageResult<()> {
        let may_exist = frame <= self.high_water;
        let detections: Vec<&DetectionRecord> = detections.iter().collect();
        self.write_point(frame, brand, coverage, prominence, &detections, may_exist)
            .await?;
        self.advance(frame).await
    }

    /// Record a whole frame: every point plus the detections of its brand.
    /// Commits once `commit_interval` frames are pending.
    pub async fn record_frame(
        &mut self,
        frame: FrameIndex,
        points: &[SeriesPoint],
        records: &[DetectionRecord],
    ) -> StorageResult<()> {
        let may_exist = frame <= self.high_water;
        for point in points {
            let own: Vec<&DetectionRecord> =
                records.iter().filter(|r| r.brand == point.brand).collect();
            self.write_point(
                frame,
                &point.brand,
                point.coverage,
                point.prominence,
                &own,
                may_exist,
            )
            .await?;
        }
        self.advance(frame).await?;

        self.pending_frames += 1;
        if self.pending_frames >= self.commit_interval {
            self.commit().await?;
        }
        Ok(())
    }

    /// Make everything recorded so far visible to readers.
    pub async fn commit(&mut self) -> StorageResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            debug!(max_frame = self.high_water, "Committed timeline batch");
        }
        self.pending_frames = 0;
        Ok(())
    }

    /// Commit and release the database.
    pub async fn close(mut self) -> StorageResult<()> {
        self.commit().await?;
        self.pool.close().await;
        info!(path = %self.path.display(), max_frame = self.high_water, "Closed timeline writer");
        Ok(())
    }

    async fn transaction(&mut self) -> StorageResult<&mut Transaction<'static, Sqlite>> {
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await?);
        }
        self.tx.as_mut().ok_or(StorageError::Closed)
    }

    async fn brand_id(&mut self, brand: &str) -> StorageResult<i64> {
        if let Some(id) = self.brand_ids.get(brand) {
            return Ok(*id);
        }
        let tx = self.transaction().await?;
        sqlx::query("INSERT OR IGNORE INTO brands (name) VALUES (?)")
            .bind(brand)
            .execute(&mut **tx)
            .await?;
        let id: i64 = sqlx::query_scalar("SELECT id FROM brands WHERE name = ?")
            .bind(brand)
            .fetch_one(&mut **tx)
            .await?;
        self.brand_ids.insert(brand.to_string(), id);
        Ok(id)
    }

    async fn write_point(
        &mut self,
        frame: FrameIndex,
        brand: &str,
        coverage: f64,
        prominence: f64,
        detections: &[&DetectionRecord],
        may_exist: bool,
    ) -> StorageResult<()> {
        let brand_id = self.brand_id(brand).await?;
        let frame = frame as i64;
        let tx = self.transaction().await?;

        if coverage > 0.0 || prominence > 0.0 {
            sqlx::query(
                "INSERT INTO points (frame, brand_id, coverage, prominence) VALUES (?, ?, ?, ?)
                 ON CONFLICT (frame, brand_id)
                 DO UPDATE SET coverage = excluded.coverage, prominence = excluded.prominence",
            )
            .bind(frame)
            .bind(brand_id)
            .bind(coverage)
            .bind(prominence)
            .execute(&mut **tx)
            .await?;
        } else if may_exist {
            sqlx::query("DELETE FROM points WHERE frame = ? AND brand_id = ?")
                .bind(frame)
                .bind(brand_id)
                .execute(&mut **tx)
                .await?;
        }

        if may_exist {
            sqlx::query("DELETE FROM detections WHERE frame = ? AND brand_id = ?")
                .bind(frame)
                .bind(brand_id)
                .execute(&mut **tx)
                .await?;
        }
        for detection in detections {
            sqlx::query("INSERT INTO detections (frame, brand_id, polygon, bbox) VALUES (?, ?, ?, ?)")
                .bind(frame)
                .bind(brand_id)
                .bind(serde_json::to_string(&detection.polygon)?)
                .bind(serde_json::to_string(&detection.bbox)?)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn advance(&mut self, frame: FrameIndex) -> StorageResult<()> {
        if frame <= self.high_water {
            return Ok(());
        }
        let tx = self.transaction().await?;
        sqlx::query(
            "INSERT INTO run_meta (key, value) VALUES ('max_frame', ?)
             ON CONFLICT (key) DO UPDATE SET value = MAX(value, excluded.value)",
        )
        .bind(frame as i64)
        .execute(&mut **tx)
        .await?;
        self.high_water = frame;
        Ok(())
    }
}

/// Read access to a run's timeline. Cheap to clone.
#[derive(Clone)]
pub struct TimelineReader {
    pool: SqlitePool,
}

impl TimelineReader {
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StorageError::not_found(path.display().to_string()));
        }
        let pool = connect(path, false, READER_CONNECTIONS).await?;
        Ok(Self { pool })
    }

    /// Highest committed frame, 0 for an empty timeline.
    pub async fn max_frame(&self) -> StorageResult<FrameIndex> {
        read_max_frame(&self.pool).await
    }

    /// Sorted distinct brand names.
    pub async fn brands(&self) -> StorageResult<Vec<String>> {
        Ok(sqlx::query_scalar("SELECT name FROM brands ORDER BY name")
            .fetch_all(&self.pool)
            .await?)
    }

    /// Dense values for `brand` over `start..=end` (defaults: the whole run),
    /// sampling every `stride`-th frame from `start`. Unknown brands and
    /// empty ranges read as an empty series.
    pub async fn series(
        &self,
        brand: &str,
        metric: SeriesMetric,
        start: Option<FrameIndex>,
        end: Option<FrameIndex>,
        stride: u64,
    ) -> StorageResult<Vec<f64>> {
        Ok(self
            .series_slice(brand, metric, start, end, stride)
            .await?
            .values)
    }

    /// Like [`series`](Self::series), also reporting the resolved range.
    pub async fn series_slice(
        &self,
        brand: &str,
        metric: SeriesMetric,
        start: Option<FrameIndex>,
        end: Option<FrameIndex>,
        stride: u64,
    ) -> StorageResult<SeriesSlice> {
        // One read transaction so max_frame and the points share a snapshot.
        let mut tx = self.pool.begin().await?;
        let max_frame = read_max_frame(&mut *tx).await?;

        let Some(range) = FrameRange::resolve(start, end, stride, max_frame) else {
            return Ok(SeriesSlice {
                range: None,
                values: Vec::new(),
            });
        };

        let brand_id: Option<i64> = sqlx::query_scalar("SELECT id FROM brands WHERE name = ?")
            .bind(brand)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(brand_id) = brand_id else {
            return Ok(SeriesSlice {
                range: None,
                values: Vec::new(),
            });
        };

        let sql = format!(
            "SELECT frame, {} FROM points
             WHERE brand_id = ? AND frame BETWEEN ? AND ? AND (frame - ?) % ? = 0
             ORDER BY frame",
            column(metric)
        );
        let rows: Vec<(i64, f64)> = sqlx::query_as(&sql)
            .bind(brand_id)
            .bind(range.start as i64)
            .bind(range.end as i64)
            .bind(range.start as i64)
            .bind(range.stride as i64)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        let mut values = vec![0.0; range.len()];
        for (frame, value) in rows {
            let slot = ((frame as u64 - range.start) / range.stride) as usize;
            if let Some(v) = values.get_mut(slot) {
                *v = value;
            }
        }

        Ok(SeriesSlice {
            range: Some(range),
            values,
        })
    }

    /// Exact detections recorded for one frame.
    pub async fn detections(&self, frame: FrameIndex) -> StorageResult<Vec<DetectionRecord>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT b.name, d.polygon, d.bbox FROM detections d
             JOIN brands b ON b.id = d.brand_id
             WHERE d.frame = ?
             ORDER BY d.id",
        )
        .bind(frame as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(brand, polygon, bbox)| {
                Ok(DetectionRecord {
                    polygon: serde_json::from_str(&polygon)
                        .map_err(|e| StorageError::corrupt(format!("frame {frame} polygon: {e}")))?,
                    bbox: serde_json::from_str(&bbox)
                        .map_err(|e| StorageError::corrupt(format!("frame {frame} bbox: {e}")))?,
                    brand,
                })
            })
            .collect()
    }

    /// Frames in which each brand was present (coverage or prominence > 0).
    pub async fn timeline_stats(&self) -> StorageResult<BTreeMap<String, Vec<FrameIndex>>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT b.name, p.frame FROM points p
             JOIN brands b ON b.id = p.brand_id
             ORDER BY b.name, p.frame",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats: BTreeMap<String, Vec<FrameIndex>> = BTreeMap::new();
        for (brand, frame) in rows {
            stats.entry(brand).or_default().push(frame as u64);
        }
        Ok(stats)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
