use std::env;
use std::time::Duration;

use talks_client::{ClientConfig, DEFAULT_API_URL};

pub const DEFAULT_SOURCE_URL: &str =
    "https://www.berlinaugmented.com/wp-content/uploads/2022/11/02ImageTTKurz.jpg";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    /// Sent verbatim as the `authorization` header.
    pub authorization: Option<String>,
    /// Image the avatar is rendered from.
    pub source_url: String,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let api_url = normalize_opt(env::var("TALK_STREAM_API_URL").ok())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let authorization = normalize_opt(env::var("TALK_STREAM_AUTHORIZATION").ok());
        let source_url = normalize_opt(env::var("TALK_STREAM_SOURCE_URL").ok())
            .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string());
        let request_timeout = env::var("TALK_STREAM_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|val| val.trim().parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);

        Self {
            api_url,
            authorization,
            source_url,
            request_timeout: Duration::from_secs(request_timeout),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_url.clone(),
            authorization: self.authorization.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            authorization: None,
            source_url: DEFAULT_SOURCE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

pub fn normalize_opt(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
