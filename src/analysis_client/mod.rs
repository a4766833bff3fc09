//! AnalysisClient - Vision backend adapter
//!
//! ## Responsibilities
//!
//! - Prepare the frame for upload (bounded dimensions and size)
//! - Send it with the deployment prompt in one request
//! - Parse the response text
//! - Classify every failure into an error record instead of raising it
//!
//! Analysis failures never abort a surveillance session, so `analyze`
//! always returns an `AnalysisRecord`.

pub mod gemini;
pub mod image_prep;
pub mod prompt;

pub use gemini::GeminiBackend;
pub use image_prep::{ImageLimits, PreparedImage};
pub use prompt::AnalysisPrompt;

use crate::models::{AnalysisRecord, Frame};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Client-side ceiling over the backend's own timeout
const DEFAULT_ANALYZE_TIMEOUT_SECS: u64 = 90;
/// Longest response body kept in an error reason
const MAX_ERROR_BODY_CHARS: usize = 500;

/// One request to the vision backend
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub image: Vec<u8>,
    pub mime_type: String,
    pub prompt: String,
}

/// Raw backend reply
#[derive(Debug, Clone)]
pub struct VisionReply {
    pub status: u16,
    pub body: String,
}

/// Backend could not be reached
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
}

/// Remote vision call
#[async_trait]
pub trait VisionBackend: Send + Sync {
    async fn generate(&self, request: &VisionRequest) -> Result<VisionReply, BackendError>;
}

/// Why an analysis produced no text
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisFailure {
    /// Frame could not be prepared for upload
    #[error("image preparation failed: {0}")]
    Encode(String),

    /// Network or transport failure
    #[error("{0}")]
    Transport(#[from] BackendError),

    /// Client-side ceiling elapsed
    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success status code
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Body missing the expected fields
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// AnalysisClient instance
pub struct AnalysisClient {
    backend: Arc<dyn VisionBackend>,
    prompt: AnalysisPrompt,
    limits: ImageLimits,
    timeout: Duration,
}

impl AnalysisClient {
    /// Create new client; the prompt is fixed for the client's lifetime
    pub fn new(backend: Arc<dyn VisionBackend>, prompt: AnalysisPrompt) -> Self {
        Self {
            backend,
            prompt,
            limits: ImageLimits::default(),
            timeout: Duration::from_secs(DEFAULT_ANALYZE_TIMEOUT_SECS),
        }
    }

    pub fn with_limits(mut self, limits: ImageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn prompt(&self) -> &AnalysisPrompt {
        &self.prompt
    }

    /// Analyze one frame
    pub async fn analyze(&self, frame: &Frame) -> AnalysisRecord {
        match self.try_analyze(frame).await {
            Ok(text) => {
                tracing::info!(
                    frame_id = %frame.id(),
                    chars = text.len(),
                    "Frame analyzed"
                );
                AnalysisRecord::ok(frame, text)
            }
            Err(e) => {
                tracing::warn!(frame_id = %frame.id(), error = %e, "Frame analysis failed");
                AnalysisRecord::error(frame, e.to_string())
            }
        }
    }

    async fn try_analyze(&self, frame: &Frame) -> Result<String, AnalysisFailure> {
        let prepared = image_prep::prepare_for_upload(frame.image(), &self.limits)
            .map_err(|e| AnalysisFailure::Encode(e.to_string()))?;

        tracing::debug!(
            frame_id = %frame.id(),
            width = prepared.width,
            height = prepared.height,
            quality = prepared.quality,
            size = prepared.data.len(),
            "Frame prepared for upload"
        );

        let request = VisionRequest {
            image: prepared.data,
            mime_type: image_prep::UPLOAD_MIME_TYPE.to_string(),
            prompt: self.prompt.text().to_string(),
        };

        let reply = timeout(self.timeout, self.backend.generate(&request))
            .await
            .map_err(|_| AnalysisFailure::Timeout(self.timeout))??;

        parse_reply(reply)
    }
}

/// Turn a raw reply into analysis text
fn parse_reply(reply: VisionReply) -> Result<String, AnalysisFailure> {
    if !(200..300).contains(&reply.status) {
        return Err(AnalysisFailure::Status {
            status: reply.status,
            body: truncate(reply.body.trim(), MAX_ERROR_BODY_CHARS),
        });
    }

    let parsed: GenerateContentResponse = serde_json::from_str(&reply.body)
        .map_err(|e| AnalysisFailure::Malformed(format!("invalid JSON: {}", e)))?;

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        let reason = parsed
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map(|r| format!("request blocked: {}", r))
            .unwrap_or_else(|| "no candidates in response".to_string());
        return Err(AnalysisFailure::Malformed(reason));
    };

    let text: Vec<String> = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.text)
        .collect();

    if text.is_empty() {
        return Err(AnalysisFailure::Malformed(
            "candidate has no text parts".to_string(),
        ));
    }

    Ok(text.join("\n").trim().to_string())
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
