//! Input source classification and content hashing.

use std::fmt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use url::Url;

use crate::error::{MediaError, MediaResult};

const HASH_CHUNK: usize = 1024 * 1024;

/// Where a job's media comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    Local(PathBuf),
    Remote(Url),
}

impl VideoSource {
    /// Classify an input: `http(s)` URLs are remote, anything else is a path.
    pub fn parse(input: &str) -> MediaResult<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(MediaError::invalid_source("empty source"));
        }
        match Url::parse(input) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Self::Remote(url)),
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(Self::Local)
                .map_err(|_| MediaError::invalid_source(input)),
            Ok(url) if url.scheme().len() > 1 => Err(MediaError::invalid_source(format!(
                "unsupported scheme '{}'",
                url.scheme()
            ))),
            // Plain paths, including Windows drive letters
            _ => Ok(Self::Local(PathBuf::from(input))),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Self::Local(path) => Some(path),
            Self::Remote(_) => None,
        }
    }

    /// Input argument for FFmpeg/FFprobe.
    pub fn as_input(&self) -> String {
        match self {
            Self::Local(path) => path.display().to_string(),
            Self::Remote(url) => url.to_string(),
        }
    }

    /// SHA-256 of the file contents, or of the URL for remote sources.
    pub async fn content_hash(&self) -> MediaResult<String> {
        match self {
            Self::Local(path) => hash_file(path).await,
            Self::Remote(url) => Ok(hex(&Sha256::digest(url.as_str().as_bytes()))),
        }
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_input())
    }
}

/// Hash a regular file. Directories, devices and pipes are rejected before
/// any read, since they may never reach end of file.
async fn hash_file(path: &Path) -> MediaResult<String> {
    let not_found = |e: std::io::Error| match e.kind() {
        std::io::ErrorKind::NotFound => MediaError::FileNotFound(path.to_path_buf()),
        _ => MediaError::Io(e),
    };
    let metadata = tokio::fs::metadata(path).await.map_err(not_found)?;
    if !metadata.is_file() {
        return Err(MediaError::invalid_source(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    let mut file = tokio::fs::File::open(path).await.map_err(not_found)?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex(&hasher.finalize()))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
