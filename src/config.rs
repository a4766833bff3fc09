//! Application configuration
//!
//! Built once at startup from the environment (after `.env` is loaded)
//! and handed to component constructors. Components never read the
//! environment themselves.

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash-exp:generateContent";
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

const GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";
const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

/// A credential that must never reach a log line
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Messaging bot credentials
#[derive(Debug, Clone)]
pub struct TelegramCredentials {
    pub bot_token: Secret,
    pub chat_id: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Vision backend generateContent endpoint
    pub gemini_endpoint: String,
    /// Telegram Bot API base URL
    pub telegram_api_base: String,
    /// Directory for raw frame images
    pub frames_dir: PathBuf,
    /// Directory for JSON analysis records
    pub analysis_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            telegram_api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            frames_dir: PathBuf::from("surveillance_images"),
            analysis_dir: PathBuf::from("analysis_results"),
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            gemini_endpoint: lookup("GEMINI_ENDPOINT").unwrap_or(defaults.gemini_endpoint),
            telegram_api_base: lookup("TELEGRAM_API_BASE").unwrap_or(defaults.telegram_api_base),
            frames_dir: lookup("FRAMES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.frames_dir),
            analysis_dir: lookup("ANALYSIS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.analysis_dir),
        }
    }

    /// Vision backend API key (required by every analyzing command)
    pub fn gemini_api_key(lookup: impl Fn(&str) -> Option<String>) -> Result<Secret> {
        require(&lookup, GOOGLE_API_KEY).map(Secret::new)
    }

    /// Messaging credentials (required by every notifying command)
    pub fn telegram_credentials(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<TelegramCredentials> {
        let bot_token = require(&lookup, TELEGRAM_BOT_TOKEN);
        let chat_id = require(&lookup, TELEGRAM_CHAT_ID);

        match (bot_token, chat_id) {
            (Ok(token), Ok(chat_id)) => Ok(TelegramCredentials {
                bot_token: Secret::new(token),
                chat_id,
            }),
            _ => Err(Error::Config(format!(
                "{} and {} must be set (environment or .env file)",
                TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID
            ))),
        }
    }
}

/// Environment lookup used by the binary
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn require(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Config(format!("{} must be set (environment or .env file)", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config.gemini_endpoint, DEFAULT_GEMINI_ENDPOINT);
        assert_eq!(config.frames_dir, PathBuf::from("surveillance_images"));
        assert_eq!(config.analysis_dir, PathBuf::from("analysis_results"));
    }

    #[test]
    fn test_from_env_reads_through_env_lookup() {
        let config = AppConfig::from_env();
        let expected = AppConfig::from_lookup(env_lookup);
        assert_eq!(config.gemini_endpoint, expected.gemini_endpoint);
        assert_eq!(config.telegram_api_base, expected.telegram_api_base);
        assert_eq!(config.frames_dir, expected.frames_dir);
        assert_eq!(config.analysis_dir, expected.analysis_dir);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("FRAMES_DIR", "/tmp/frames"),
            ("TELEGRAM_API_BASE", "http://localhost:8081"),
        ]));
        assert_eq!(config.frames_dir, PathBuf::from("/tmp/frames"));
        assert_eq!(config.telegram_api_base, "http://localhost:8081");
    }

    #[test]
    fn test_missing_telegram_credentials_is_config_error() {
        let result = AppConfig::telegram_credentials(lookup_from(&[("TELEGRAM_BOT_TOKEN", "abc")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_blank_api_key_rejected() {
        let result = AppConfig::gemini_api_key(lookup_from(&[("GOOGLE_API_KEY", "  ")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_secret_never_printed() {
        let creds = AppConfig::telegram_credentials(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "123:SECRET"),
            ("TELEGRAM_CHAT_ID", "42"),
        ]))
        .unwrap();

        let debug = format!("{:?}", creds);
        assert!(!debug.contains("SECRET"));
        assert_eq!(creds.bot_token.expose(), "123:SECRET");
    }
}
