//! Surveillance loop types

use crate::frame_source::{CaptureFailure, ConnectFailure};
use crate::notification_sink::BatchReport;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default live cadence
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
/// Default bound on one frame read
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 3;
/// Largest backoff exponent
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Run state of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Capturing,
    Analyzing,
    Notifying,
    Reconnecting,
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Capturing => "capturing",
            SessionState::Analyzing => "analyzing",
            SessionState::Notifying => "notifying",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mid-session reconnect policy
///
/// The wait before reconnect attempt `n` (1-based) is
/// `backoff * 2^(n-1)`. The default is a single immediate attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

impl ReconnectPolicy {
    /// Wait before the given attempt
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        self.backoff.saturating_mul(1u32 << shift)
    }
}

/// Live session configuration
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Tick period, measured from tick start
    pub interval: Duration,
    /// Stop after this much wall time
    pub duration: Option<Duration>,
    /// Stop after this many ticks
    pub max_ticks: Option<u64>,
    /// Bound on one frame read
    pub read_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            duration: None,
            max_ticks: None,
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Why a session ended normally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    DurationElapsed,
    MaxTicks,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::DurationElapsed => "duration elapsed",
            StopReason::MaxTicks => "capture limit reached",
            StopReason::Cancelled => "stop signal",
        };
        f.write_str(s)
    }
}

/// Counters for a finished session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub ticks: u64,
    pub captured: u64,
    pub analyzed: u64,
    /// Ticks lost to a capture failure and reconnect
    pub skipped: u64,
    pub analysis_errors: u64,
    pub persist_failures: u64,
    pub notify_failures: u64,
    pub reconnects: u64,
    pub stop_reason: StopReason,
}

impl SessionReport {
    pub(crate) fn new() -> Self {
        Self {
            ticks: 0,
            captured: 0,
            analyzed: 0,
            skipped: 0,
            analysis_errors: 0,
            persist_failures: 0,
            notify_failures: 0,
            reconnects: 0,
            stop_reason: StopReason::Cancelled,
        }
    }
}

/// Session-fatal failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// Startup connection failed
    #[error("camera connection failed at startup: {0}")]
    Connect(ConnectFailure),

    /// A capture failed and reconnecting did not help
    #[error("camera connectivity lost ({capture}); reconnect failed: {reconnect}")]
    Connectivity {
        capture: CaptureFailure,
        reconnect: ConnectFailure,
    },
}

/// Offline scan configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Spacing of sampled offsets
    pub interval: Duration,
    /// Delay between batch messages
    pub batch_delay: Duration,
    /// Send the keyword summary after the batch
    pub send_summary: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            batch_delay: Duration::from_millis(crate::notification_sink::DEFAULT_BATCH_DELAY_MS),
            send_summary: false,
        }
    }
}

/// Outcome of an offline scan
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Offsets sampled from the probed duration
    pub planned: usize,
    pub analyzed: usize,
    pub analysis_errors: usize,
    /// Offsets whose frame could not be extracted
    pub extract_failures: usize,
    pub persist_failures: usize,
    /// First offset with no frame, if the file ended early
    pub end_of_file_at: Option<Duration>,
    /// Collection file, when it was written
    pub collection: Option<PathBuf>,
    /// Batch delivery, when notifications are enabled
    pub batch: Option<BatchReport>,
    pub summary_sent: bool,
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reconnect_is_single_immediate_retry() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay_before(1), Duration::ZERO);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = ReconnectPolicy {
            max_attempts: 4,
            backoff: Duration::from_millis(500),
        };
        let delays: Vec<_> = (1..=4).map(|n| policy.delay_before(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ]
        );
    }
}
