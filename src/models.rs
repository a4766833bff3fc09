//! Shared models
//!
//! Types that flow between pipeline stages. Frames move from the frame
//! source into the analysis client; analysis records move from the
//! analysis client into the result store and the notification sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// When a frame was captured
///
/// Live cameras stamp frames with wall-clock time; pre-recorded video
/// stamps them with the offset into the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameTimestamp {
    /// Wall-clock capture time
    Wall { at: DateTime<Utc> },
    /// Offset from the start of a video file, in milliseconds
    Offset { millis: u64 },
}

impl FrameTimestamp {
    pub fn now() -> Self {
        Self::Wall { at: Utc::now() }
    }

    pub fn offset(offset: Duration) -> Self {
        Self::Offset {
            millis: offset.as_millis() as u64,
        }
    }

    /// Filesystem-safe key, e.g. `20250101_093000` or `0_01_30`
    pub fn file_key(&self) -> String {
        match self {
            Self::Wall { at } => at.format("%Y%m%d_%H%M%S").to_string(),
            Self::Offset { millis } => {
                let secs = millis / 1000;
                format!("{}_{:02}_{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
            }
        }
    }
}

impl fmt::Display for FrameTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wall { at } => write!(f, "{}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            Self::Offset { millis } => {
                let secs = millis / 1000;
                write!(f, "{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
            }
        }
    }
}

/// One still image taken from a video source
///
/// `image` holds the encoded (JPEG) bytes exactly as the transport
/// delivered them. A frame is never mutated after capture.
#[derive(Debug, Clone)]
pub struct Frame {
    id: String,
    image: Vec<u8>,
    captured_at: FrameTimestamp,
}

impl Frame {
    pub fn new(id: impl Into<String>, image: Vec<u8>, captured_at: FrameTimestamp) -> Self {
        Self {
            id: id.into(),
            image,
            captured_at,
        }
    }

    /// Stable identifier, also used as the persisted file stem
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn captured_at(&self) -> FrameTimestamp {
        self.captured_at
    }
}

/// Outcome of one analysis call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum AnalysisStatus {
    Ok,
    Error(String),
}

impl AnalysisStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Result of sending one frame through the vision backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    timestamp: FrameTimestamp,
    frame_ref: String,
    analysis: String,
    status: AnalysisStatus,
    analyzed_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Successful analysis of `frame`
    pub fn ok(frame: &Frame, analysis: impl Into<String>) -> Self {
        Self {
            timestamp: frame.captured_at(),
            frame_ref: frame.id().to_string(),
            analysis: analysis.into(),
            status: AnalysisStatus::Ok,
            analyzed_at: Utc::now(),
        }
    }

    /// Failed analysis of `frame`; the reason doubles as the analysis text
    pub fn error(frame: &Frame, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            timestamp: frame.captured_at(),
            frame_ref: frame.id().to_string(),
            analysis: format!("Error analyzing image: {}", reason),
            status: AnalysisStatus::Error(reason),
            analyzed_at: Utc::now(),
        }
    }

    pub fn timestamp(&self) -> FrameTimestamp {
        self.timestamp
    }

    pub fn frame_ref(&self) -> &str {
        &self.frame_ref
    }

    pub fn analysis(&self) -> &str {
        &self.analysis
    }

    pub fn status(&self) -> &AnalysisStatus {
        &self.status
    }

    pub fn analyzed_at(&self) -> DateTime<Utc> {
        self.analyzed_at
    }
}
