//! Client configuration from the environment.

use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(30);
pub const DEFAULT_QUERY_RETRY: u32 = 1;
pub const DEFAULT_CACHE_IDLE_TIME: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid API URL {url:?}: {reason}")]
    InvalidApiUrl { url: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root; resource paths are joined onto it.
    pub api_url: Url,
    pub auth_token: Option<String>,
    /// Realtime broker URL (Redis when built with the `redis` feature).
    pub realtime_url: Option<String>,
    pub request_timeout: Duration,
    /// How long a fetched value is served without refetching.
    pub stale_time: Duration,
    /// Default retry count for failed queries.
    pub query_retry: u32,
    /// How long an unread cache entry is kept.
    pub cache_idle_time: Duration,
}

impl ClientConfig {
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_api_url(api_url)?,
            auth_token: None,
            realtime_url: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stale_time: DEFAULT_STALE_TIME,
            query_retry: DEFAULT_QUERY_RETRY,
            cache_idle_time: DEFAULT_CACHE_IDLE_TIME,
        })
    }

    /// Load from `COOPDESK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("COOPDESK_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let mut config = Self::new(&api_url)?;

        config.auth_token = lookup("COOPDESK_AUTH_TOKEN").filter(|t| !t.trim().is_empty());
        config.realtime_url = lookup("COOPDESK_REALTIME_URL").filter(|u| !u.trim().is_empty());
        config.request_timeout = Duration::from_secs(numeric(
            &lookup,
            "COOPDESK_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT.as_secs(),
        ));
        config.stale_time = Duration::from_secs(numeric(
            &lookup,
            "COOPDESK_STALE_TIME_SECS",
            DEFAULT_STALE_TIME.as_secs(),
        ));
        config.query_retry = numeric(&lookup, "COOPDESK_QUERY_RETRY", u64::from(DEFAULT_QUERY_RETRY))
            .try_into()
            .unwrap_or(DEFAULT_QUERY_RETRY);
        config.cache_idle_time = Duration::from_secs(numeric(
            &lookup,
            "COOPDESK_CACHE_IDLE_SECS",
            DEFAULT_CACHE_IDLE_TIME.as_secs(),
        ));

        Ok(config)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_query_retry(mut self, retry: u32) -> Self {
        self.query_retry = retry;
        self
    }
}

fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    // A trailing slash makes `Url::join` append instead of replacing the last segment.
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&normalized).map_err(|e| ConfigError::InvalidApiUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidApiUrl {
            url: raw.to_string(),
            reason: "URL cannot be used as a base".to_string(),
        });
    }
    Ok(url)
}

fn numeric(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default, "ignoring non-numeric setting");
            default
        }),
        None => default,
    }
}
