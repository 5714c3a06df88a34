//! Frame sources.
//!
//! [`FfmpegDecoder`] pipes RGB24 frames out of FFmpeg; [`MemoryFrameSource`]
//! serves frames already in memory (stills, tests).

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use brandlens_models::{Frame, FrameIndex};
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::stderr::{collect, drain_stderr};

/// A pull-based supplier of decoded frames, 1-based and contiguous.
#[async_trait]
pub trait FrameSource: Send {
    /// The next frame, or `None` once the source is exhausted.
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>>;

    /// Name for logging.
    fn name(&self) -> &'static str;
}

/// Decodes a file or stream through `ffmpeg -f rawvideo -pix_fmt rgb24`.
///
/// Output is always scaled to the requested size so every frame has the
/// same byte length.
pub struct FfmpegDecoder {
    child: Child,
    reader: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    next_index: FrameIndex,
    finished: bool,
}

impl FfmpegDecoder {
    pub fn spawn(input: &str, width: u32, height: u32) -> MediaResult<Self> {
        if width == 0 || height == 0 {
            return Err(MediaError::InvalidVideo(format!(
                "cannot decode at {width}x{height}"
            )));
        }
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(input)
            .args([
                "-map",
                "0:v:0",
                "-vf",
                &format!("scale={width}:{height}"),
                "-pix_fmt",
                "rgb24",
                "-f",
                "rawvideo",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(input, width, height, "Spawning FFmpeg decoder");

        let mut child = cmd.spawn().map_err(|e| {
            MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {}", e), None, None)
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            MediaError::ffmpeg_failed("Failed to capture FFmpeg stdout", None, None)
        })?;
        let stderr = child.stderr.take().map(drain_stderr);

        Ok(Self {
            child,
            reader: BufReader::with_capacity(Frame::byte_len(width, height), stdout),
            stderr,
            width,
            height,
            next_index: 1,
            finished: false,
        })
    }

    async fn finish(&mut self) -> MediaResult<()> {
        self.finished = true;
        let status = self.child.wait().await?;
        let produced = self.next_index - 1;
        let stderr = collect(self.stderr.take()).await;

        if status.success() {
            return Ok(());
        }
        if produced == 0 {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg decoded no frames",
                Some(stderr),
                status.code(),
            ));
        }
        // A stream that dies midway is treated as its end.
        warn!(
            frames = produced,
            exit_code = ?status.code(),
            stderr = %stderr.trim(),
            "FFmpeg exited with an error after decoding frames"
        );
        Ok(())
    }
}

#[async_trait]
impl FrameSource for FfmpegDecoder {
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let mut data = vec![0u8; Frame::byte_len(self.width, self.height)];
        match self.reader.read_exact(&mut data).await {
            Ok(_) => {
                let frame = Frame::new(self.next_index, self.width, self.height, data);
                self.next_index += 1;
                Ok(Some(frame))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.finish().await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Frames held in memory, renumbered 1..=n in order.
pub struct MemoryFrameSource {
    frames: VecDeque<Frame>,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        let frames = frames
            .into_iter()
            .enumerate()
            .map(|(i, mut f)| {
                f.index = i as FrameIndex + 1;
                f
            })
            .collect();
        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[async_trait]
impl FrameSource for MemoryFrameSource {
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        Ok(self.frames.pop_front())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Decode a still image into a single RGB24 frame.
pub async fn load_image(path: impl AsRef<Path>) -> MediaResult<Frame> {
    let path = path.as_ref().to_path_buf();
    if !path.exists() {
        return Err(MediaError::FileNotFound(path));
    }
    tokio::task::spawn_blocking(move || -> MediaResult<Frame> {
        let rgb = image::open(&path)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(Frame::new(1, width, height, rgb.into_raw()))
    })
    .await
    .map_err(|e| MediaError::internal(format!("image decode task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_source_renumbers() {
        let mut source = MemoryFrameSource::new(vec![
            Frame::blank(7, 4, 4),
            Frame::blank(9, 4, 4),
        ]);
        assert_eq!(source.next_frame().await.unwrap().unwrap().index, 1);
        assert_eq!(source.next_frame().await.unwrap().unwrap().index, 2);
        assert!(source.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.png");
        image::RgbImage::from_pixel(8, 6, image::Rgb([255, 0, 0]))
            .save(&path)
            .unwrap();

        let frame = load_image(&path).await.unwrap();
        assert_eq!((frame.index, frame.width, frame.height), (1, 8, 6));
        assert_eq!(frame.data.len(), 8 * 6 * 3);
        assert_eq!(&frame.data[..3], &[255, 0, 0]);
    }

    #[tokio::test]
    async fn test_load_missing_image() {
        assert!(matches!(
            load_image("/no/such/still.png").await,
            Err(MediaError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_decoder_rejects_zero_size() {
        assert!(matches!(
            FfmpegDecoder::spawn("input.mp4", 0, 720),
            Err(MediaError::InvalidVideo(_))
        ));
    }
}
