//! VideoFile - Frame sampling from pre-recorded video
//!
//! ## Responsibilities
//!
//! - Probe a video file for its duration (ffprobe)
//! - Extract the frame at a given offset (ffmpeg `-ss`)
//!
//! No frame at an offset means the end of the file was reached. It is
//! reported as `Ok(None)`, not as an error.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Upper bound on one ffprobe/ffmpeg invocation
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Video file failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum VideoError {
    #[error("video file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to probe video: {0}")]
    Probe(String),

    #[error("failed to extract frame at {offset:?}: {reason}")]
    Extract { offset: Duration, reason: String },
}

/// Stream properties
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub duration: Duration,
}

/// Random access to frames of a video
#[async_trait]
pub trait VideoReader: Send + Sync {
    async fn probe(&self) -> Result<VideoInfo, VideoError>;

    /// Encoded JPEG of the frame at `offset`, `None` past the end
    async fn frame_at(&self, offset: Duration) -> Result<Option<Vec<u8>>, VideoError>;
}

/// Offsets `0, interval, 2*interval, ...` strictly before `duration`
///
/// A zero interval samples the first frame only.
pub fn sample_offsets(duration: Duration, interval: Duration) -> Vec<Duration> {
    if duration.is_zero() {
        return Vec::new();
    }
    if interval.is_zero() {
        return vec![Duration::ZERO];
    }

    let mut offsets = Vec::new();
    let mut offset = Duration::ZERO;
    while offset < duration {
        offsets.push(offset);
        offset += interval;
    }
    offsets
}

/// ffmpeg-backed video file
#[derive(Debug, Clone)]
pub struct FfmpegVideoFile {
    path: PathBuf,
    ffmpeg_bin: String,
    ffprobe_bin: String,
    command_timeout: Duration,
}

impl FfmpegVideoFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run(&self, command: &mut Command) -> Result<std::process::Output, String> {
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("spawn failed: {}", e))?;

        match timeout(self.command_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(format!("execution failed: {}", e)),
            Err(_) => Err(format!("timed out after {:?}", self.command_timeout)),
        }
    }
}

#[async_trait]
impl VideoReader for FfmpegVideoFile {
    async fn probe(&self) -> Result<VideoInfo, VideoError> {
        if !self.path.exists() {
            return Err(VideoError::NotFound(self.path.clone()));
        }

        let output = self
            .run(
                Command::new(&self.ffprobe_bin)
                    .args([
                        "-v",
                        "error",
                        "-show_entries",
                        "format=duration",
                        "-of",
                        "default=noprint_wrappers=1:nokey=1",
                    ])
                    .arg(&self.path),
            )
            .await
            .map_err(VideoError::Probe)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::Probe(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let secs: f64 = stdout
            .trim()
            .parse()
            .map_err(|_| VideoError::Probe(format!("unexpected duration output: {:?}", stdout.trim())))?;

        if !secs.is_finite() || secs < 0.0 {
            return Err(VideoError::Probe(format!("invalid duration: {}", secs)));
        }

        let info = VideoInfo {
            duration: Duration::from_secs_f64(secs),
        };
        tracing::info!(
            path = %self.path.display(),
            duration_secs = secs,
            "Video probed"
        );
        Ok(info)
    }

    async fn frame_at(&self, offset: Duration) -> Result<Option<Vec<u8>>, VideoError> {
        let seek = format!("{:.3}", offset.as_secs_f64());

        // -ss before -i: fast keyframe seek, then decode to the exact offset
        let output = self
            .run(
                Command::new(&self.ffmpeg_bin)
                    .args(["-ss", seek.as_str(), "-i"])
                    .arg(&self.path)
                    .args([
                        "-frames:v",
                        "1",
                        "-f",
                        "image2pipe",
                        "-vcodec",
                        "mjpeg",
                        "-loglevel",
                        "error",
                        "-",
                    ]),
            )
            .await
            .map_err(|reason| VideoError::Extract { offset, reason })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::Extract {
                offset,
                reason: stderr.trim().to_string(),
            });
        }

        if output.stdout.is_empty() {
            tracing::debug!(offset_ms = offset.as_millis() as u64, "No frame at offset");
            return Ok(None);
        }

        Ok(Some(output.stdout))
    }
}
