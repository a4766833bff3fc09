//! Error handling for rtsp-sentinel
//!
//! Each component has its own error type next to its code. This module
//! gathers them into one crate-level `Error` for callers that do not care
//! which stage failed.

use crate::frame_source::{CaptureFailure, ConnectFailure, TransportError};
use crate::notification_sink::NotificationFailure;
use crate::result_store::PersistenceFailure;
use crate::surveillance_loop::SessionError;
use crate::video_file::VideoError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// All connection candidates exhausted
    #[error(transparent)]
    Connect(#[from] ConnectFailure),

    /// No frame from a live connection
    #[error(transparent)]
    Capture(#[from] CaptureFailure),

    /// Video transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Pre-recorded video error
    #[error(transparent)]
    Video(#[from] VideoError),

    /// Notification delivery error
    #[error(transparent)]
    Notification(#[from] NotificationFailure),

    /// Storage error
    #[error(transparent)]
    Persistence(#[from] PersistenceFailure),

    /// Session terminated
    #[error(transparent)]
    Session(#[from] SessionError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
