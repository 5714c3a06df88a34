//! Annotated output video.
//!
//! Detection outlines are drawn onto RGB24 frames in a per-brand palette
//! color and piped into an FFmpeg encoder.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use brandlens_models::{DetectionRecord, Frame};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};
use crate::stderr::{collect, drain_stderr};

const PALETTE: [[u8; 3]; 10] = [
    [230, 25, 75],
    [60, 180, 75],
    [255, 225, 25],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
    [70, 240, 240],
    [240, 50, 230],
    [210, 245, 60],
    [250, 190, 190],
];

const LINE_THICKNESS: i64 = 2;

/// Consumer of annotated frames.
#[async_trait]
pub trait OverlaySink: Send {
    async fn write_frame(&mut self, frame: &Frame, records: &[DetectionRecord]) -> MediaResult<()>;

    /// Flush and close the output.
    async fn finish(self: Box<Self>) -> MediaResult<PathBuf>;
}

/// Deterministic palette color for a brand.
pub fn brand_color(brand: &str) -> [u8; 3] {
    // FNV-1a
    let hash = brand
        .bytes()
        .fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3));
    PALETTE[(hash % PALETTE.len() as u64) as usize]
}

/// Draw every record's polygon outline into an RGB24 buffer.
pub fn draw_detections(data: &mut [u8], width: u32, height: u32, records: &[DetectionRecord]) {
    for record in records {
        let color = brand_color(&record.brand);
        let points = record.polygon;
        for i in 0..points.len() {
            let a = points[i];
            let b = points[(i + 1) % points.len()];
            draw_line(data, width, height, a, b, color);
        }
    }
}

fn draw_line(data: &mut [u8], width: u32, height: u32, a: [f64; 2], b: [f64; 2], color: [u8; 3]) {
    let (mut x0, mut y0) = (a[0].round() as i64, a[1].round() as i64);
    let (x1, y1) = (b[0].round() as i64, b[1].round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        for ox in 0..LINE_THICKNESS {
            for oy in 0..LINE_THICKNESS {
                put_pixel(data, width, height, x0 + ox, y0 + oy, color);
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn put_pixel(data: &mut [u8], width: u32, height: u32, x: i64, y: i64, color: [u8; 3]) {
    if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
        return;
    }
    let offset = (y as usize * width as usize + x as usize) * 3;
    if let Some(px) = data.get_mut(offset..offset + 3) {
        px.copy_from_slice(&color);
    }
}

/// H.264 encoder fed raw frames over stdin.
pub struct FfmpegOverlayEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    output: PathBuf,
    width: u32,
    height: u32,
    frames_written: u64,
}

impl FfmpegOverlayEncoder {
    pub fn spawn(output: impl AsRef<Path>, width: u32, height: u32, fps: f64) -> MediaResult<Self> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;
        let output = output.as_ref().to_path_buf();
        let fps = if fps > 0.0 { fps } else { 30.0 };

        let mut cmd = Command::new("ffmpeg");
        cmd.args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            &format!("{width}x{height}"),
            "-r",
            &format!("{fps:.3}"),
            "-i",
            "-",
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(&output)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        debug!(output = %output.display(), width, height, fps, "Spawning overlay encoder");

        let mut child = cmd.spawn().map_err(|e| {
            MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {}", e), None, None)
        })?;
        let stdin = child.stdin.take().ok_or_else(|| {
            MediaError::ffmpeg_failed("Failed to capture FFmpeg stdin", None, None)
        })?;
        let stderr = child.stderr.take().map(drain_stderr);

        Ok(Self {
            child,
            stdin: Some(stdin),
            stderr,
            output,
            width,
            height,
            frames_written: 0,
        })
    }
}

#[async_trait]
impl OverlaySink for FfmpegOverlayEncoder {
    async fn write_frame(&mut self, frame: &Frame, records: &[DetectionRecord]) -> MediaResult<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(MediaError::InvalidVideo(format!(
                "frame {} is {}x{}, encoder expects {}x{}",
                frame.index, frame.width, frame.height, self.width, self.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::internal("overlay encoder already closed"))?;

        let mut data = frame.data.clone();
        draw_detections(&mut data, frame.width, frame.height, records);
        stdin.write_all(&data).await?;
        self.frames_written += 1;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> MediaResult<PathBuf> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await?;
        }
        let status = self.child.wait().await?;
        let stderr = collect(self.stderr.take()).await;
        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                "Overlay encoding failed",
                Some(stderr),
                status.code(),
            ));
        }
        info!(
            output = %self.output.display(),
            frames = self.frames_written,
            "Overlay video written"
        );
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(brand: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> DetectionRecord {
        DetectionRecord {
            brand: brand.to_string(),
            polygon: [[x0, y0], [x1, y0], [x1, y1], [x0, y1]],
            bbox: [x0, y0, x1, y1],
        }
    }

    fn pixel(data: &[u8], width: u32, x: usize, y: usize) -> [u8; 3] {
        let o = (y * width as usize + x) * 3;
        [data[o], data[o + 1], data[o + 2]]
    }

    #[test]
    fn test_brand_color_is_deterministic() {
        assert_eq!(brand_color("Nike"), brand_color("Nike"));
        assert!(PALETTE.contains(&brand_color("Adidas")));
    }

    #[test]
    fn test_draw_outline_only() {
        let (w, h) = (20u32, 20u32);
        let mut data = vec![0u8; Frame::byte_len(w, h)];
        draw_detections(&mut data, w, h, &[record("Nike", 2.0, 2.0, 12.0, 12.0)]);

        let color = brand_color("Nike");
        assert_eq!(pixel(&data, w, 2, 2), color);
        assert_eq!(pixel(&data, w, 7, 2), color);
        assert_eq!(pixel(&data, w, 12, 7), color);
        // Interior untouched
        assert_eq!(pixel(&data, w, 7, 7), [0, 0, 0]);
    }

    #[test]
    fn test_draw_clips_to_frame() {
        let (w, h) = (10u32, 10u32);
        let mut data = vec![0u8; Frame::byte_len(w, h)];
        draw_detections(&mut data, w, h, &[record("ICA", -5.0, -5.0, 50.0, 50.0)]);
        assert_eq!(data.len(), Frame::byte_len(w, h));
    }
}
