//! Transport and feed configuration.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Url;

use crate::client::ClientError;
use crate::ndjson::TrailingLine;

pub const DEFAULT_API_BASE: &str = "https://kbolando2172.pythonanywhere.com";

pub const ENV_API_BASE: &str = "QUIZFEED_API_BASE_URL";
pub const ENV_CONNECT_TIMEOUT: &str = "QUIZFEED_CONNECT_TIMEOUT_SECS";
pub const ENV_IDLE_TIMEOUT: &str = "QUIZFEED_IDLE_TIMEOUT_SECS";
pub const ENV_PROXY: &str = "QUIZFEED_PROXY";

/// HTTP transport options.
///
/// # Example
/// ```rust
/// use quizfeed::options::TransportOptions;
/// use std::time::Duration;
///
/// let options = TransportOptions::new("http://localhost:5000")
///     .with_connect_timeout(Duration::from_secs(5))
///     .with_header("X-Client".to_string(), "quizfeed".to_string());
/// assert_eq!(options.base_url, "http://localhost:5000");
/// ```
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Base URL of the quiz service
    pub base_url: String,

    /// Connection timeout. There is no whole-request timeout since bodies
    /// are streamed; see `FeedOptions::idle_timeout`.
    pub connect_timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

impl TransportOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: None,
            proxy: None,
            extra_headers: None,
        }
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }

    /// Resolve `path` against the base URL.
    ///
    /// A trailing slash on the base is optional.
    pub fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        let base = format!("{}/", self.base_url.trim_end_matches('/'));
        Url::parse(&base)
            .and_then(|base| base.join(path))
            .map_err(|e| ClientError::Config(format!("invalid base URL {:?}: {}", self.base_url, e)))
    }
}

/// Options for a streamed question feed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedOptions {
    /// Fail the stream when no chunk arrives within this long.
    pub idle_timeout: Option<Duration>,

    /// Policy for an unterminated line at end of stream.
    pub trailing_line: TrailingLine,
}

impl FeedOptions {
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn with_trailing_line(mut self, trailing_line: TrailingLine) -> Self {
        self.trailing_line = trailing_line;
        self
    }
}

/// Full client configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub transport: TransportOptions,
    pub feed: FeedOptions,
}

impl Config {
    /// Build from `QUIZFEED_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let mut config = Self::default();

        if let Some(base_url) = lookup(ENV_API_BASE) {
            config.transport.base_url = base_url;
        }
        if let Some(secs) = lookup(ENV_CONNECT_TIMEOUT) {
            config.transport.connect_timeout = Some(parse_secs(ENV_CONNECT_TIMEOUT, &secs)?);
        }
        if let Some(secs) = lookup(ENV_IDLE_TIMEOUT) {
            config.feed.idle_timeout = Some(parse_secs(ENV_IDLE_TIMEOUT, &secs)?);
        }
        config.transport.proxy = lookup(ENV_PROXY);

        // Fail early on a malformed base URL.
        config.transport.endpoint("")?;
        Ok(config)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, ClientError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ClientError::Config(format!("{} must be a whole number of seconds, got {:?}", key, value)))
}
