//! NotificationSink - Outbound message delivery
//!
//! ## Responsibilities
//!
//! - Text and text+image notifications (best effort)
//! - Rate-limited batch delivery that continues past failed sends
//! - End-of-run keyword summary
//!
//! Every send is bounded by `send_timeout`. Failures are logged and
//! returned to the caller for counting; none of them are fatal.

pub mod format;
pub mod summary;
pub mod telegram;

pub use format::{format_batch_entry, format_record, photo_caption, MAX_MESSAGE_CHARS};
pub use telegram::TelegramTransport;

use crate::models::AnalysisRecord;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Default upper bound on one send
const DEFAULT_SEND_TIMEOUT_SECS: u64 = 30;
/// Default delay between batch messages
pub const DEFAULT_BATCH_DELAY_MS: u64 = 1000;

/// Delivery failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationFailure {
    /// Request could not be delivered
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Messaging API refused the request
    #[error("rejected by messaging API ({code}): {description}")]
    Rejected { code: u16, description: String },

    /// Send did not complete in time
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

/// Messaging API boundary
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Send one rich-text (HTML) message
    async fn send_message(&self, text: &str) -> Result<(), NotificationFailure>;

    /// Send one image with a caption
    async fn send_photo(&self, image: &[u8], caption: &str) -> Result<(), NotificationFailure>;
}

/// One failed batch entry
#[derive(Debug, Clone)]
pub struct BatchFailure {
    /// Position of the record in the batch
    pub index: usize,
    pub reason: String,
}

/// Batch delivery outcome
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub delivered: usize,
    pub failures: Vec<BatchFailure>,
    /// Records not attempted because the batch was cancelled
    pub skipped: usize,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.skipped == 0
    }
}

/// NotificationSink instance
pub struct NotificationSink {
    transport: Arc<dyn MessageTransport>,
    send_timeout: Duration,
    cancel: Option<CancellationToken>,
}

impl NotificationSink {
    pub fn new(transport: Arc<dyn MessageTransport>) -> Self {
        Self {
            transport,
            send_timeout: Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECS),
            cancel: None,
        }
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Stop signal that interrupts batch delays
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Send a text message, split if over the API limit
    pub async fn send_text(&self, message: &str) -> Result<(), NotificationFailure> {
        let result = self.send_chunks(message).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Failed to send notification");
        }
        result
    }

    /// Send a text message followed by an image
    ///
    /// The image is attempted even if the text failed; the first failure
    /// is returned.
    pub async fn send_text_with_image(
        &self,
        message: &str,
        image: &[u8],
        caption: &str,
    ) -> Result<(), NotificationFailure> {
        let text_result = self.send_chunks(message).await;
        if let Err(e) = &text_result {
            tracing::warn!(error = %e, "Failed to send notification text");
        }

        let photo_result = self
            .bounded(self.transport.send_photo(image, caption))
            .await;
        if let Err(e) = &photo_result {
            tracing::warn!(error = %e, size = image.len(), "Failed to send notification image");
        }

        text_result.and(photo_result)
    }

    /// Notify one live analysis with its frame
    pub async fn notify_record(
        &self,
        record: &AnalysisRecord,
        image: &[u8],
    ) -> Result<(), NotificationFailure> {
        let result = self
            .send_text_with_image(&format_record(record), image, &photo_caption(record))
            .await;
        if result.is_ok() {
            tracing::info!(frame_ref = %record.frame_ref(), "Notification sent");
        }
        result
    }

    /// Send each record as its own message with `delay` between sends
    ///
    /// Failed sends are recorded and skipped. Cancellation stops the batch
    /// at the next delay; the rest are reported as skipped.
    pub async fn send_batch(&self, records: &[AnalysisRecord], delay: Duration) -> BatchReport {
        let mut report = BatchReport::default();

        for (index, record) in records.iter().enumerate() {
            if index > 0 && !self.pause(delay).await {
                report.skipped = records.len() - index;
                tracing::info!(skipped = report.skipped, "Batch notification cancelled");
                break;
            }

            match self.send_chunks(&format_batch_entry(record)).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        index = index,
                        frame_ref = %record.frame_ref(),
                        error = %e,
                        "Batch notification failed, continuing"
                    );
                    report.failures.push(BatchFailure {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            delivered = report.delivered,
            failed = report.failures.len(),
            skipped = report.skipped,
            "Batch notification finished"
        );
        report
    }

    /// Send the keyword summary for a finished run
    pub async fn send_summary(&self, records: &[AnalysisRecord]) -> Result<(), NotificationFailure> {
        let message = summary::build_summary(records, chrono::Local::now());
        self.send_text(&message).await
    }

    async fn send_chunks(&self, message: &str) -> Result<(), NotificationFailure> {
        for chunk in format::split_message(message, MAX_MESSAGE_CHARS) {
            self.bounded(self.transport.send_message(&chunk)).await?;
        }
        Ok(())
    }

    async fn bounded<F>(&self, send: F) -> Result<(), NotificationFailure>
    where
        F: Future<Output = Result<(), NotificationFailure>>,
    {
        timeout(self.send_timeout, send)
            .await
            .unwrap_or(Err(NotificationFailure::Timeout(self.send_timeout)))
    }

    /// Sleep for `delay`; false if cancelled first
    async fn pause(&self, delay: Duration) -> bool {
        match &self.cancel {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                _ = tokio::time::sleep(delay) => true,
            },
            None => {
                tokio::time::sleep(delay).await;
                true
            }
        }
    }
}
