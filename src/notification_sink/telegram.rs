//! Telegram Bot API transport
//!
//! `sendMessage` (HTML parse mode) and `sendPhoto` (multipart upload).
//! The bot token is part of every request URL, so reqwest errors are
//! stripped of their URL before they are surfaced.

use super::{MessageTransport, NotificationFailure};
use crate::config::TelegramCredentials;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram transport
pub struct TelegramTransport {
    http: reqwest::Client,
    api_base: String,
    credentials: TelegramCredentials,
}

impl TelegramTransport {
    pub fn new(api_base: impl Into<String>, credentials: TelegramCredentials) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base,
            self.credentials.bot_token.expose(),
            method
        )
    }

    async fn check_response(resp: reqwest::Response) -> Result<(), NotificationFailure> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| NotificationFailure::Delivery(e.without_url().to_string()))?;

        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(api) if api.ok => Ok(()),
            Ok(api) => Err(NotificationFailure::Rejected {
                code: api.error_code.unwrap_or(status.as_u16()),
                description: api.description.unwrap_or_else(|| "no description".to_string()),
            }),
            Err(_) if status.is_success() => Ok(()),
            Err(_) => Err(NotificationFailure::Rejected {
                code: status.as_u16(),
                description: body.chars().take(200).collect(),
            }),
        }
    }
}

#[async_trait]
impl MessageTransport for TelegramTransport {
    async fn send_message(&self, text: &str) -> Result<(), NotificationFailure> {
        let request = SendMessageRequest {
            chat_id: &self.credentials.chat_id,
            text,
            parse_mode: "HTML",
        };

        let resp = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&request)
            .send()
            .await
            .map_err(|e| NotificationFailure::Delivery(e.without_url().to_string()))?;

        Self::check_response(resp).await?;
        tracing::debug!(chars = text.chars().count(), "Telegram message sent");
        Ok(())
    }

    async fn send_photo(&self, image: &[u8], caption: &str) -> Result<(), NotificationFailure> {
        let photo = Part::bytes(image.to_vec())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| NotificationFailure::Delivery(e.without_url().to_string()))?;

        let form = Form::new()
            .text("chat_id", self.credentials.chat_id.clone())
            .text("caption", caption.to_string())
            .part("photo", photo);

        let resp = self
            .http
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| NotificationFailure::Delivery(e.without_url().to_string()))?;

        Self::check_response(resp).await?;
        tracing::debug!(size = image.len(), "Telegram photo sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;

    #[test]
    fn test_method_url() {
        let transport = TelegramTransport::new(
            "https://api.telegram.org/",
            TelegramCredentials {
                bot_token: Secret::new("123:ABC"),
                chat_id: "42".to_string(),
            },
        );
        assert_eq!(
            transport.method_url("sendMessage"),
            "https://api.telegram.org/bot123:ABC/sendMessage"
        );
    }

    #[test]
    fn test_api_error_envelope() {
        let api: ApiResponse = serde_json::from_str(
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 5"}"#,
        )
        .unwrap();
        assert!(!api.ok);
        assert_eq!(api.error_code, Some(429));
    }
}
