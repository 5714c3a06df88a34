//! Durable storage for BrandLens runs.
//!
//! This crate provides:
//! - The SQLite timeline store: one writer, pooled readers, sparse points
//!   densified at read time
//! - Run artifacts: summary JSON and gzip series exports

pub mod artifacts;
pub mod error;
pub mod timeline;

pub use artifacts::{
    export_series, read_series_export, read_summary, write_summary, RunLayout, SeriesExport,
};
pub use error::{StorageError, StorageResult};
pub use timeline::{
    auto_stride, FrameRange, SeriesSlice, TimelineReader, TimelineWriter, DEFAULT_COMMIT_INTERVAL,
};
