//! Configuration management for the feed client.
//!
//! Configuration can be set via environment variables:
//! - `AGENT_FEED_URL` - Optional. Backend base URL. Defaults to `http://127.0.0.1:8000`.
//! - `AGENT_FEED_POLL_INTERVAL_MS` - Optional. Task poll interval. Defaults to `1500`.
//! - `AGENT_FEED_FALLBACK` - Optional. Enable the synchronous `/chat` fallback. Defaults to `true`.
//! - `AGENT_FEED_CONNECT_TIMEOUT_SECS` - Optional. HTTP connect timeout. Defaults to `10`.

use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL; endpoint paths are joined onto it
    pub base_url: Url,

    /// Interval between task status polls
    pub poll_interval: Duration,

    /// Whether a failed stream may fall back to the synchronous endpoint
    pub fallback_enabled: bool,

    /// TCP connect timeout for the HTTP client
    pub connect_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = parse_base_url(
            &std::env::var("AGENT_FEED_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        )?;

        let poll_interval = match std::env::var("AGENT_FEED_POLL_INTERVAL_MS") {
            Ok(raw) => {
                let ms: u64 = raw.trim().parse().map_err(|e| {
                    ConfigError::InvalidValue("AGENT_FEED_POLL_INTERVAL_MS".to_string(), format!("{}", e))
                })?;
                if ms == 0 {
                    return Err(ConfigError::InvalidValue(
                        "AGENT_FEED_POLL_INTERVAL_MS".to_string(),
                        "must be greater than zero".to_string(),
                    ));
                }
                Duration::from_millis(ms)
            }
            Err(_) => DEFAULT_POLL_INTERVAL,
        };

        let fallback_enabled = match std::env::var("AGENT_FEED_FALLBACK") {
            Ok(raw) => parse_bool("AGENT_FEED_FALLBACK", &raw)?,
            Err(_) => true,
        };

        let connect_timeout = match std::env::var("AGENT_FEED_CONNECT_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(raw.trim().parse().map_err(|e| {
                ConfigError::InvalidValue(
                    "AGENT_FEED_CONNECT_TIMEOUT_SECS".to_string(),
                    format!("{}", e),
                )
            })?),
            Err(_) => DEFAULT_CONNECT_TIMEOUT,
        };

        Ok(Self {
            base_url,
            poll_interval,
            fallback_enabled,
            connect_timeout,
        })
    }

    /// Create a config with default values for the given backend (useful for testing).
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            poll_interval: DEFAULT_POLL_INTERVAL,
            fallback_enabled: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidValue("AGENT_FEED_URL".to_string(), format!("{}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue(
            "AGENT_FEED_URL".to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("expected a boolean, got '{}'", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("X", "TRUE").unwrap());
        assert!(parse_bool("X", " 1 ").unwrap());
        assert!(!parse_bool("X", "off").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn test_base_url_requires_http() {
        assert!(parse_base_url("http://localhost:8000").is_ok());
        assert!(parse_base_url("https://feed.example.com/api/").is_ok());
        assert!(parse_base_url("ftp://example.com").is_err());
        assert!(parse_base_url("not a url").is_err());
    }

    #[test]
    fn test_new_uses_defaults() {
        let config = Config::new(Url::parse(DEFAULT_BASE_URL).unwrap());
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(config.fallback_enabled);
    }
}
