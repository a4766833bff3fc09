//! SurveillanceLoop - Capture, analyze, persist, notify
//!
//! ## Responsibilities
//!
//! - Own the FrameSource lifecycle, including mid-session reconnects
//! - Run one strictly sequential tick per interval
//! - Decide when the session stops
//!
//! ## Tick
//!
//! 1. Read a frame (bounded). On failure: disconnect, reconnect per
//!    `ReconnectPolicy`, skip the rest of the tick. If reconnecting fails
//!    the session ends with `SessionError::Connectivity`.
//! 2. Analyze the frame (never fails; errors become error records)
//! 3. Persist the record and the frame (failures logged and counted)
//! 4. Notify (best effort)
//!
//! Cadence is measured from tick start: a slow tick shortens the wait
//! before the next one, and a tick that overruns the interval causes the
//! missed tick to be skipped rather than bunched.
//!
//! Every exit path (duration, tick limit, stop signal, fatal error)
//! disconnects the FrameSource before `run` returns.

mod types;
pub mod video_scan;


pub use types::{
    LoopConfig, ReconnectPolicy, ScanConfig, ScanReport, SessionError, SessionReport,
    SessionState, StopReason,
};
pub use video_scan::VideoScan;

use crate::analysis_client::AnalysisClient;
use crate::frame_source::{CaptureFailure, FrameSource};
use crate::models::Frame;
use crate::notification_sink::NotificationSink;
use crate::result_store::ResultStore;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// SurveillanceLoop instance (one per camera session)
pub struct SurveillanceLoop {
    source: FrameSource,
    store: ResultStore,
    analysis: Option<AnalysisClient>,
    notifier: Option<NotificationSink>,
    config: LoopConfig,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
}

impl SurveillanceLoop {
    /// Create a capture-only session; add stages with the `with_*` builders
    pub fn new(
        source: FrameSource,
        store: ResultStore,
        config: LoopConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            source,
            store,
            analysis: None,
            notifier: None,
            config,
            cancel,
            state,
        }
    }

    pub fn with_analysis(mut self, client: AnalysisClient) -> Self {
        self.analysis = Some(client);
        self
    }

    /// Notifications are sent for analyzed frames only
    pub fn with_notifications(mut self, sink: NotificationSink) -> Self {
        self.notifier = Some(sink);
        self
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Run the session until a stop condition or a fatal error
    pub async fn run(&mut self) -> Result<SessionReport, SessionError> {
        let mode = if self.analysis.is_some() {
            "analyze"
        } else {
            "capture-only"
        };
        tracing::info!(
            mode = mode,
            interval_secs = self.config.interval.as_secs_f64(),
            duration_secs = self.config.duration.map(|d| d.as_secs()),
            max_ticks = self.config.max_ticks,
            "Surveillance session starting"
        );

        let result = self.run_session().await;

        self.source.disconnect().await;
        self.set_state(SessionState::Stopped);

        match &result {
            Ok(report) => tracing::info!(
                stop_reason = %report.stop_reason,
                ticks = report.ticks,
                captured = report.captured,
                analyzed = report.analyzed,
                skipped = report.skipped,
                analysis_errors = report.analysis_errors,
                persist_failures = report.persist_failures,
                notify_failures = report.notify_failures,
                reconnects = report.reconnects,
                "Surveillance session stopped"
            ),
            Err(e) => tracing::error!(error = %e, "Surveillance session terminated"),
        }

        result
    }

    async fn run_session(&mut self) -> Result<SessionReport, SessionError> {
        let mut report = SessionReport::new();
        let cancel = self.cancel.clone();

        self.set_state(SessionState::Connecting);
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(report),
            result = self.source.connect() => result.map_err(SessionError::Connect)?,
        };
        tracing::info!(
            candidate = %connected.candidate,
            attempts = connected.attempts,
            "Camera connected, entering capture loop"
        );
        self.set_state(SessionState::Idle);

        let deadline = self.config.duration.map(|d| Instant::now() + d);
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.stop_reason = StopReason::Cancelled;
                    return Ok(report);
                }
                _ = wait_until(deadline) => {
                    report.stop_reason = StopReason::DurationElapsed;
                    return Ok(report);
                }
                _ = ticker.tick() => {}
            }

            report.ticks += 1;
            tracing::debug!(tick = report.ticks, "Tick");

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.tick(&mut report) => Some(result),
            };
            match outcome {
                Some(result) => result?,
                None => {
                    report.stop_reason = StopReason::Cancelled;
                    return Ok(report);
                }
            }

            self.set_state(SessionState::Idle);

            if let Some(max) = self.config.max_ticks {
                if report.ticks >= max {
                    report.stop_reason = StopReason::MaxTicks;
                    return Ok(report);
                }
            }
        }
    }

    async fn tick(&mut self, report: &mut SessionReport) -> Result<(), SessionError> {
        self.set_state(SessionState::Capturing);

        let frame = match self.source.read_frame(self.config.read_timeout).await {
            Ok(frame) => frame,
            Err(capture) => {
                self.recover(capture, report).await?;
                report.skipped += 1;
                tracing::info!(tick = report.ticks, "Tick skipped after reconnect");
                return Ok(());
            }
        };
        report.captured += 1;

        let Some(client) = &self.analysis else {
            self.persist_frame(&frame, report).await;
            return Ok(());
        };

        self.set_state(SessionState::Analyzing);
        let record = client.analyze(&frame).await;
        report.analyzed += 1;
        if !record.status().is_ok() {
            report.analysis_errors += 1;
        }

        if let Err(e) = self.store.save(&record).await {
            report.persist_failures += 1;
            tracing::error!(frame_id = %frame.id(), error = %e, "Failed to persist analysis");
        }
        self.persist_frame(&frame, report).await;

        if let Some(sink) = &self.notifier {
            self.set_state(SessionState::Notifying);
            if sink.notify_record(&record, frame.image()).await.is_err() {
                report.notify_failures += 1;
            }
        }

        Ok(())
    }

    async fn persist_frame(&self, frame: &Frame, report: &mut SessionReport) {
        match self.store.save_frame(frame).await {
            Ok(path) => tracing::info!(path = %path.display(), "Captured frame saved"),
            Err(e) => {
                report.persist_failures += 1;
                tracing::error!(frame_id = %frame.id(), error = %e, "Failed to persist frame");
            }
        }
    }

    /// Reconnect after a capture failure
    async fn recover(
        &mut self,
        capture: CaptureFailure,
        report: &mut SessionReport,
    ) -> Result<(), SessionError> {
        tracing::warn!(error = %capture, "Frame capture failed, reconnecting");
        self.set_state(SessionState::Reconnecting);
        self.source.disconnect().await;

        let policy = self.config.reconnect;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let delay = policy.delay_before(attempt);
            if !delay.is_zero() {
                tracing::debug!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Reconnect backoff"
                );
                tokio::time::sleep(delay).await;
            }

            match self.source.connect().await {
                Ok(connected) => {
                    report.reconnects += 1;
                    tracing::info!(
                        candidate = %connected.candidate,
                        attempt = attempt,
                        "Camera reconnected"
                    );
                    return Ok(());
                }
                Err(reconnect) if attempt >= max_attempts => {
                    return Err(SessionError::Connectivity { capture, reconnect });
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Reconnect attempt failed"
                    );
                    attempt += 1;
                }
            }
        }
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::debug!(from = %prev, to = %next, "Session state");
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
