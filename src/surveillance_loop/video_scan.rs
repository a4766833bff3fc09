//! VideoScan - Offline analysis of a pre-recorded video
//!
//! Samples frames at fixed offsets through the whole file, analyzes each
//! one, persists the run as a single collection and sends it as one
//! batch. Running out of frames before the probed duration is a normal
//! end, not an error. There is no reconnect logic.

use super::types::{ScanConfig, ScanReport};
use crate::analysis_client::AnalysisClient;
use crate::models::{AnalysisRecord, Frame, FrameTimestamp};
use crate::notification_sink::NotificationSink;
use crate::result_store::ResultStore;
use crate::video_file::{sample_offsets, VideoError, VideoReader};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// VideoScan instance
pub struct VideoScan {
    reader: Arc<dyn VideoReader>,
    client: AnalysisClient,
    store: ResultStore,
    notifier: Option<NotificationSink>,
    config: ScanConfig,
    cancel: CancellationToken,
}

impl VideoScan {
    pub fn new(
        reader: Arc<dyn VideoReader>,
        client: AnalysisClient,
        store: ResultStore,
        config: ScanConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reader,
            client,
            store,
            notifier: None,
            config,
            cancel,
        }
    }

    pub fn with_notifications(mut self, sink: NotificationSink) -> Self {
        self.notifier = Some(sink);
        self
    }

    /// Scan the file; only a failed probe is fatal
    ///
    /// On cancellation the records gathered so far are still persisted,
    /// but no notifications are sent.
    pub async fn run(&self) -> Result<ScanReport, VideoError> {
        let info = self.reader.probe().await?;
        let offsets = sample_offsets(info.duration, self.config.interval);

        let mut report = ScanReport {
            planned: offsets.len(),
            ..ScanReport::default()
        };
        tracing::info!(
            duration_secs = info.duration.as_secs_f64(),
            interval_secs = self.config.interval.as_secs_f64(),
            frames = offsets.len(),
            "Video scan starting"
        );

        let mut records = Vec::with_capacity(offsets.len());

        for (index, offset) in offsets.into_iter().enumerate() {
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                step = self.scan_offset(offset, index, &mut report) => Some(step),
            };

            match step {
                None => {
                    report.cancelled = true;
                    tracing::info!(analyzed = report.analyzed, "Video scan cancelled");
                    break;
                }
                Some(ScanStep::EndOfFile) => {
                    report.end_of_file_at = Some(offset);
                    tracing::info!(offset_ms = offset.as_millis() as u64, "End of video reached");
                    break;
                }
                Some(ScanStep::Skipped) => {}
                Some(ScanStep::Analyzed(record)) => records.push(record),
            }
        }

        if !records.is_empty() {
            match self.store.save_collection(&records).await {
                Ok(path) => report.collection = Some(path),
                Err(e) => {
                    report.persist_failures += 1;
                    tracing::error!(error = %e, "Failed to persist analysis collection");
                }
            }
        }

        if report.cancelled {
            return Ok(report);
        }

        if let Some(sink) = &self.notifier {
            if !records.is_empty() {
                report.batch = Some(sink.send_batch(&records, self.config.batch_delay).await);
            }
            if self.config.send_summary && !self.cancel.is_cancelled() {
                report.summary_sent = sink.send_summary(&records).await.is_ok();
            }
        }

        tracing::info!(
            planned = report.planned,
            analyzed = report.analyzed,
            analysis_errors = report.analysis_errors,
            extract_failures = report.extract_failures,
            "Video scan finished"
        );
        Ok(report)
    }

    async fn scan_offset(
        &self,
        offset: std::time::Duration,
        index: usize,
        report: &mut ScanReport,
    ) -> ScanStep {
        let image = match self.reader.frame_at(offset).await {
            Ok(Some(image)) => image,
            Ok(None) => return ScanStep::EndOfFile,
            Err(e) => {
                report.extract_failures += 1;
                tracing::warn!(error = %e, "Frame extraction failed, skipping offset");
                return ScanStep::Skipped;
            }
        };

        let captured_at = FrameTimestamp::offset(offset);
        let frame = Frame::new(format!("frame_{}", captured_at.file_key()), image, captured_at);
        tracing::info!(
            frame = index + 1,
            of = report.planned,
            timestamp = %captured_at,
            "Analyzing frame"
        );

        let record = self.client.analyze(&frame).await;
        report.analyzed += 1;
        if !record.status().is_ok() {
            report.analysis_errors += 1;
        }

        if let Err(e) = self.store.save_frame(&frame).await {
            report.persist_failures += 1;
            tracing::error!(frame_id = %frame.id(), error = %e, "Failed to persist frame");
        }

        ScanStep::Analyzed(record)
    }
}

enum ScanStep {
    Analyzed(AnalysisRecord),
    Skipped,
    EndOfFile,
}
