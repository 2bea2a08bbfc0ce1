//! Runtime configuration read from the environment.

use std::env;
use std::time::Duration;

use crate::constants::{
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_LLM_API_URL, DEFAULT_LLM_MODEL, GEOGLOWS_API_BASE,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Hydrology API base URL, without a trailing slash.
    pub api_base: String,

    /// Per-request timeout for upstream calls.
    pub http_timeout: Duration,

    /// Chat completions base URL for the tool selector.
    pub llm_api_url: String,

    /// API key for the tool selector. Only the agent side needs it.
    pub llm_api_key: Option<String>,

    pub llm_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: GEOGLOWS_API_BASE.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            llm_api_url: DEFAULT_LLM_API_URL.to_string(),
            llm_api_key: None,
            llm_model: DEFAULT_LLM_MODEL.to_string(),
        }
    }
}

impl Config {
    /// Create configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `GEOGLOWS_API_BASE` - hydrology API base URL
    /// - `GEOGLOWS_HTTP_TIMEOUT_SECS` - upstream timeout in seconds (default: 60)
    /// - `LLM_API_URL` - OpenAI-compatible endpoint for tool selection
    /// - `LLM_API_KEY` - key for that endpoint
    /// - `LLM_MODEL` - model name (default: gemini-2.5-flash)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let api_base = env::var("GEOGLOWS_API_BASE")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base);

        let http_timeout = match env::var("GEOGLOWS_HTTP_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(parse_timeout(&raw)?),
            Err(_) => defaults.http_timeout,
        };

        Ok(Self {
            api_base,
            http_timeout,
            llm_api_url: env::var("LLM_API_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.llm_api_url),
            llm_api_key: env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()),
            llm_model: env::var("LLM_MODEL").unwrap_or(defaults.llm_model),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

fn parse_timeout(raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(Error::Config(
            "GEOGLOWS_HTTP_TIMEOUT_SECS must be greater than zero".to_string(),
        )),
        Ok(secs) => Ok(secs),
        Err(e) => Err(Error::Config(format!(
            "GEOGLOWS_HTTP_TIMEOUT_SECS={:?} is not a number: {}",
            raw, e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_must_be_positive() {
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("soon").is_err());
        assert_eq!(parse_timeout(" 90 ").unwrap(), 90);
    }

    #[test]
    fn api_base_drops_trailing_slash() {
        let config = Config::default().with_api_base("http://127.0.0.1:9000/");
        assert_eq!(config.api_base, "http://127.0.0.1:9000");
    }
}
