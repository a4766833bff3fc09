//! Gemini generateContent backend
//!
//! Sends one JSON request per frame with the prompt and the inline image,
//! authenticated with the `x-goog-api-key` header. Response parsing is
//! left to `AnalysisClient` so every backend is classified the same way.

use super::{BackendError, VisionBackend, VisionReply, VisionRequest};
use crate::config::Secret;
use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use std::time::Duration;

/// Backend request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 2],
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

/// Gemini HTTP backend
pub struct GeminiBackend {
    http: reqwest::Client,
    endpoint: String,
    api_key: Secret,
}

impl GeminiBackend {
    pub fn new(endpoint: impl Into<String>, api_key: Secret) -> Self {
        Self::with_timeout(endpoint, api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(endpoint: impl Into<String>, api_key: Secret, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            endpoint: endpoint.into(),
            api_key,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn build_body<'a>(request: &'a VisionRequest) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: [Content {
            parts: [
                Part::Text {
                    text: &request.prompt,
                },
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: &request.mime_type,
                        data: base64::engine::general_purpose::STANDARD.encode(&request.image),
                    },
                },
            ],
        }],
    }
}

#[async_trait]
impl VisionBackend for GeminiBackend {
    async fn generate(&self, request: &VisionRequest) -> Result<VisionReply, BackendError> {
        let body = build_body(request);

        let resp = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.without_url().to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.without_url().to_string()))?;

        tracing::debug!(status = status, size = body.len(), "Vision backend responded");

        Ok(VisionReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = VisionRequest {
            image: vec![0xFF, 0xD8, 0xFF],
            mime_type: "image/jpeg".to_string(),
            prompt: "Describe the scene".to_string(),
        };

        let json = serde_json::to_value(build_body(&request)).unwrap();
        let parts = &json["contents"][0]["parts"];

        assert_eq!(parts[0]["text"], "Describe the scene");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[1]["inline_data"]["data"], "/9j/");
    }
}
