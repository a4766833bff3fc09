//! FrameSource - Resilient connection to a network camera
//!
//! ## Responsibilities
//!
//! - Try every connection candidate in order until one yields a live frame
//! - Pull frames with a bounded wait
//! - Release the transport on disconnect (idempotent)
//!
//! ## State machine
//!
//! ```text
//! Disconnected --connect ok--> Connected
//! Connected --read failures >= threshold | disconnect()--> Disconnected
//! ```
//!
//! A candidate is only recorded as live after a non-empty test frame has
//! arrived, so a half-open connection is never visible to callers.

pub mod connection_target;
pub mod transport;

pub use connection_target::{
    redact_uri, CameraAddress, Candidate, ConnectionTarget, RtspDialect, DEFAULT_RTSP_PORT,
};
pub use transport::{FfmpegTransport, RtspTransport, TransportError, VideoStream, VideoTransport};

use crate::models::{Frame, FrameTimestamp};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};

/// Per-candidate open timeout
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
/// Window for the first live frame after opening
const DEFAULT_PROBE_WINDOW_MS: u64 = 5_000;
/// Delay between empty reads
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// FrameSource tuning
#[derive(Debug, Clone)]
pub struct FrameSourceConfig {
    /// Upper bound on `VideoTransport::open` per candidate
    pub connect_timeout: Duration,
    /// How long to wait for a non-empty test frame after opening
    pub probe_window: Duration,
    /// Delay between empty reads while polling
    pub poll_interval: Duration,
    /// Consecutive failed reads after which the connection is dropped
    pub max_read_failures: u32,
}

impl Default for FrameSourceConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            probe_window: Duration::from_millis(DEFAULT_PROBE_WINDOW_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_read_failures: 1,
        }
    }
}

/// Why one candidate was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateAttempt {
    /// Redacted URI
    pub candidate: String,
    pub reason: String,
}

impl fmt::Display for CandidateAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.candidate, self.reason)
    }
}

/// Every candidate failed
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to connect using any of {} candidate URL(s): {}", .attempts.len(), format_attempts(.attempts))]
pub struct ConnectFailure {
    pub attempts: Vec<CandidateAttempt>,
}

fn format_attempts(attempts: &[CandidateAttempt]) -> String {
    if attempts.is_empty() {
        return "no candidates configured".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// No frame from the live connection
#[derive(Debug, Clone, thiserror::Error)]
pub enum CaptureFailure {
    #[error("camera connection not established")]
    NotConnected,

    #[error("no valid frame within {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Successful connection
#[derive(Debug, Clone)]
pub struct Connected {
    pub candidate: Candidate,
    /// Number of candidates tried, including the one that worked
    pub attempts: usize,
}

struct LiveConnection {
    candidate: Candidate,
    stream: Box<dyn VideoStream>,
}

enum PollError {
    TimedOut,
    Transport(TransportError),
}

/// FrameSource instance
pub struct FrameSource {
    target: ConnectionTarget,
    transport: Arc<dyn VideoTransport>,
    config: FrameSourceConfig,
    live: Option<LiveConnection>,
    /// Candidate opened but not yet proven live
    pending: Option<LiveConnection>,
    consecutive_failures: u32,
    frame_seq: u64,
}

impl FrameSource {
    /// Create new FrameSource
    ///
    /// The candidate list is fixed from here on.
    pub fn new(target: ConnectionTarget, transport: Arc<dyn VideoTransport>) -> Self {
        Self::with_config(target, transport, FrameSourceConfig::default())
    }

    pub fn with_config(
        target: ConnectionTarget,
        transport: Arc<dyn VideoTransport>,
        config: FrameSourceConfig,
    ) -> Self {
        Self {
            target,
            transport,
            config,
            live: None,
            pending: None,
            consecutive_failures: 0,
            frame_seq: 0,
        }
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    pub fn is_connected(&self) -> bool {
        self.live.is_some()
    }

    /// Candidate of the current connection, if any
    pub fn active_candidate(&self) -> Option<&Candidate> {
        self.live.as_ref().map(|l| &l.candidate)
    }

    /// Try each candidate in order, stop at the first that delivers a frame
    pub async fn connect(&mut self) -> Result<Connected, ConnectFailure> {
        self.disconnect().await;

        let mut attempts = Vec::with_capacity(self.target.len());

        for (index, candidate) in self.target.candidates().iter().enumerate() {
            tracing::info!(
                candidate = %candidate,
                dialect = candidate.dialect().as_str(),
                attempt = index + 1,
                "Attempting camera connection"
            );

            let stream = match timeout(
                self.config.connect_timeout,
                self.transport.open(candidate.uri()),
            )
            .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    let reason = redact_uri(&e.to_string());
                    tracing::warn!(candidate = %candidate, error = %reason, "Failed to open stream");
                    attempts.push(CandidateAttempt {
                        candidate: candidate.redacted(),
                        reason,
                    });
                    continue;
                }
                Err(_) => {
                    tracing::warn!(
                        candidate = %candidate,
                        timeout_ms = self.config.connect_timeout.as_millis() as u64,
                        "Stream open timed out"
                    );
                    attempts.push(CandidateAttempt {
                        candidate: candidate.redacted(),
                        reason: format!("open timed out after {:?}", self.config.connect_timeout),
                    });
                    continue;
                }
            };

            // Parked on self so a dropped connect() still gets closed by disconnect()
            let pending = self.pending.insert(LiveConnection {
                candidate: candidate.clone(),
                stream,
            });

            match poll_for_frame(
                pending.stream.as_mut(),
                self.config.probe_window,
                self.config.poll_interval,
            )
            .await
            {
                Ok(_) => {
                    tracing::info!(candidate = %candidate, "Connected to camera");
                    self.live = self.pending.take();
                    self.consecutive_failures = 0;
                    return Ok(Connected {
                        candidate: candidate.clone(),
                        attempts: index + 1,
                    });
                }
                Err(e) => {
                    let reason = match e {
                        PollError::TimedOut => format!(
                            "no test frame within {:?}",
                            self.config.probe_window
                        ),
                        PollError::Transport(e) => redact_uri(&e.to_string()),
                    };
                    tracing::warn!(candidate = %candidate, reason = %reason, "Candidate rejected");
                    if let Some(mut rejected) = self.pending.take() {
                        rejected.stream.close().await;
                    }
                    attempts.push(CandidateAttempt {
                        candidate: candidate.redacted(),
                        reason,
                    });
                }
            }
        }

        let failure = ConnectFailure { attempts };
        tracing::error!(error = %failure, "Failed to connect using any available RTSP URL");
        Err(failure)
    }

    /// Poll the live connection for a non-empty frame until `wait` elapses
    pub async fn read_frame(&mut self, wait: Duration) -> Result<Frame, CaptureFailure> {
        let poll_interval = self.config.poll_interval;
        let Some(live) = self.live.as_mut() else {
            return Err(CaptureFailure::NotConnected);
        };

        match poll_for_frame(live.stream.as_mut(), wait, poll_interval).await {
            Ok(image) => {
                self.consecutive_failures = 0;
                self.frame_seq += 1;
                let captured_at = FrameTimestamp::now();
                let id = format!("frame_{}_{:06}", captured_at.file_key(), self.frame_seq);
                tracing::debug!(frame_id = %id, size = image.len(), "Frame captured");
                Ok(Frame::new(id, image, captured_at))
            }
            Err(e) => {
                let failure = match e {
                    PollError::TimedOut => CaptureFailure::TimedOut(wait),
                    PollError::Transport(e) => CaptureFailure::Transport(e),
                };
                self.consecutive_failures += 1;
                tracing::warn!(
                    error = %failure,
                    consecutive_failures = self.consecutive_failures,
                    "Failed to capture valid frame"
                );
                if self.consecutive_failures >= self.config.max_read_failures.max(1) {
                    self.disconnect().await;
                }
                Err(failure)
            }
        }
    }

    /// Release the connection; no-op when already disconnected
    ///
    /// Also closes a candidate left open by an interrupted `connect`.
    pub async fn disconnect(&mut self) {
        if let Some(mut pending) = self.pending.take() {
            pending.stream.close().await;
            tracing::info!(candidate = %pending.candidate, "Abandoned connection attempt closed");
        }
        if let Some(mut live) = self.live.take() {
            live.stream.close().await;
            tracing::info!(candidate = %live.candidate, "Camera disconnected");
        }
        self.consecutive_failures = 0;
    }
}

/// Read until a non-empty frame arrives or `window` elapses
async fn poll_for_frame(
    stream: &mut dyn VideoStream,
    window: Duration,
    poll_interval: Duration,
) -> Result<Vec<u8>, PollError> {
    let deadline = Instant::now() + window;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(PollError::TimedOut);
        }

        match timeout(remaining, stream.read()).await {
            Ok(Ok(Some(image))) if !image.is_empty() => return Ok(image),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(PollError::Transport(e)),
            Err(_) => return Err(PollError::TimedOut),
        }

        if Instant::now() + poll_interval >= deadline {
            return Err(PollError::TimedOut);
        }
        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ReadStep, ScriptedTransport, StreamScript};

    fn three_candidates() -> ConnectionTarget {
        ConnectionTarget::from_uris(["rtsp://cam/a", "rtsp://cam/b", "rtsp://cam/c"])
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_stops_at_first_live_candidate() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script("rtsp://cam/a", StreamScript::endless(ReadStep::Empty));
        transport.script("rtsp://cam/b", StreamScript::endless(ReadStep::Frame));
        transport.script("rtsp://cam/c", StreamScript::endless(ReadStep::Frame));

        let mut source = FrameSource::new(three_candidates(), transport.clone());
        let connected = source.connect().await.unwrap();

        assert_eq!(connected.attempts, 2);
        assert_eq!(connected.candidate.uri(), "rtsp://cam/b");
        assert!(source.is_connected());
        assert_eq!(transport.opened(), vec!["rtsp://cam/a", "rtsp://cam/b"]);
        // The rejected candidate was released
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_reports_all_candidates_in_order() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.refuse("rtsp://cam/a");
        transport.script("rtsp://cam/b", StreamScript::endless(ReadStep::Hang));
        transport.script(
            "rtsp://cam/c",
            StreamScript::new(vec![ReadStep::Empty], ReadStep::Fail),
        );

        let mut source = FrameSource::new(three_candidates(), transport.clone());
        let failure = source.connect().await.unwrap_err();

        let tried: Vec<&str> = failure
            .attempts
            .iter()
            .map(|a| a.candidate.as_str())
            .collect();
        assert_eq!(tried, vec!["rtsp://cam/a", "rtsp://cam/b", "rtsp://cam/c"]);
        assert!(failure.attempts[0].reason.contains("open failed"));
        assert!(failure.attempts[1].reason.contains("no test frame"));
        assert!(failure.attempts[2].reason.contains("stream error"));
        assert!(!source.is_connected());
        assert_eq!(transport.close_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_tolerates_empty_reads_inside_window() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script(
            "rtsp://cam/a",
            StreamScript::new(vec![ReadStep::Empty; 10], ReadStep::Frame),
        );

        let mut source =
            FrameSource::new(ConnectionTarget::from_uris(["rtsp://cam/a"]), transport);
        let connected = source.connect().await.unwrap();
        assert_eq!(connected.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_timeout_advances_to_next_candidate() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.hang_on_open("rtsp://cam/a");
        transport.script("rtsp://cam/b", StreamScript::endless(ReadStep::Frame));

        let mut source = FrameSource::new(
            ConnectionTarget::from_uris(["rtsp://cam/a", "rtsp://cam/b"]),
            transport,
        );
        let connected = source.connect().await.unwrap();
        assert_eq!(connected.attempts, 2);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script("rtsp://cam/a", StreamScript::endless(ReadStep::Frame));

        let mut source =
            FrameSource::new(ConnectionTarget::from_uris(["rtsp://cam/a"]), transport.clone());

        // Never connected
        source.disconnect().await;
        assert_eq!(transport.close_count(), 0);

        source.connect().await.unwrap();
        source.disconnect().await;
        source.disconnect().await;
        assert_eq!(transport.close_count(), 1);
        assert!(!source.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_connect_is_closed_by_disconnect() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script("rtsp://cam/a", StreamScript::endless(ReadStep::Hang));

        let mut source =
            FrameSource::new(ConnectionTarget::from_uris(["rtsp://cam/a"]), transport.clone());

        // Give up before a frame confirms the candidate
        let result = timeout(Duration::from_secs(2), source.connect()).await;
        assert!(result.is_err());
        assert!(!source.is_connected());
        assert_eq!(transport.close_count(), 0);

        source.disconnect().await;
        source.disconnect().await;
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_frame_times_out_and_drops_connection() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script(
            "rtsp://cam/a",
            StreamScript::new(vec![ReadStep::Frame], ReadStep::Empty),
        );

        let mut source =
            FrameSource::new(ConnectionTarget::from_uris(["rtsp://cam/a"]), transport.clone());
        source.connect().await.unwrap();

        let result = source.read_frame(Duration::from_secs(3)).await;
        assert!(matches!(result, Err(CaptureFailure::TimedOut(_))));
        assert!(!source.is_connected());
        assert_eq!(transport.close_count(), 1);

        let result = source.read_frame(Duration::from_secs(3)).await;
        assert!(matches!(result, Err(CaptureFailure::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failures_below_threshold_keep_connection() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script(
            "rtsp://cam/a",
            StreamScript::new(vec![ReadStep::Frame, ReadStep::Fail], ReadStep::Frame),
        );

        let config = FrameSourceConfig {
            max_read_failures: 2,
            ..FrameSourceConfig::default()
        };
        let mut source = FrameSource::with_config(
            ConnectionTarget::from_uris(["rtsp://cam/a"]),
            transport,
            config,
        );
        source.connect().await.unwrap();

        assert!(source.read_frame(Duration::from_secs(1)).await.is_err());
        assert!(source.is_connected());

        let frame = source.read_frame(Duration::from_secs(1)).await.unwrap();
        assert!(!frame.image().is_empty());
        assert!(frame.id().starts_with("frame_"));
    }
}
