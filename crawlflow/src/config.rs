//! Configuration types for dispatching and crawling.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::{CrawlflowError, TransportError};

/// Configuration for the concurrent request pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum exchanges in flight at once. `0` means unbounded.
    #[serde(default)]
    pub concurrency: usize,
    /// Whether to log every settled exchange at debug level.
    #[serde(default = "default_true")]
    pub log_each_exchange: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            log_each_exchange: default_true(),
        }
    }
}

impl PoolConfig {
    /// Creates a new pool configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Enables or disables per-exchange logging.
    #[must_use]
    pub fn with_exchange_logging(mut self, enabled: bool) -> Self {
        self.log_each_exchange = enabled;
        self
    }

    /// The limit as an option, `None` when unbounded.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        (self.concurrency > 0).then_some(self.concurrency)
    }
}

/// Client-wide defaults for the reqwest transport.
///
/// Per-request options take precedence over these values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// User agent sent when a request does not set one.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Total timeout applied when a request has no `timeout` option.
    #[serde(default)]
    pub default_timeout_seconds: Option<f64>,
    /// Connection establishment timeout.
    #[serde(default)]
    pub connect_timeout_seconds: Option<f64>,
    /// Redirect limit when a request has no `allow_redirects` option.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Headers sent with every request unless overridden.
    #[serde(default)]
    pub default_headers: HashMap<String, String>,
}

fn default_user_agent() -> String {
    format!("crawlflow/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_redirects() -> usize {
    crate::http::options::DEFAULT_MAX_REDIRECTS
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            default_timeout_seconds: None,
            connect_timeout_seconds: None,
            max_redirects: default_max_redirects(),
            default_headers: HashMap::new(),
        }
    }
}

impl TransportConfig {
    /// Creates a new transport configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the default total timeout.
    #[must_use]
    pub fn with_default_timeout(mut self, seconds: f64) -> Self {
        self.default_timeout_seconds = Some(seconds);
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, seconds: f64) -> Self {
        self.connect_timeout_seconds = Some(seconds);
        self
    }

    /// Sets the default redirect limit.
    #[must_use]
    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Adds a default header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    /// Gets the default timeout as a Duration.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidOptions` transport error for negative, non-finite
    /// or unrepresentably large values.
    pub fn default_timeout(&self) -> Result<Option<Duration>, TransportError> {
        seconds_to_duration("default_timeout_seconds", self.default_timeout_seconds)
    }

    /// Gets the connect timeout as a Duration.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidOptions` transport error for negative, non-finite
    /// or unrepresentably large values.
    pub fn connect_timeout(&self) -> Result<Option<Duration>, TransportError> {
        seconds_to_duration("connect_timeout_seconds", self.connect_timeout_seconds)
    }
}

/// `None` and `0` mean no timeout.
fn seconds_to_duration(field: &str, seconds: Option<f64>) -> Result<Option<Duration>, TransportError> {
    match seconds {
        None => Ok(None),
        Some(secs) if secs == 0.0 => Ok(None),
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map(Some)
            .map_err(|e| TransportError::invalid_options(format!("invalid {field}: {secs}")).with_source(e)),
    }
}

/// Configuration for a recursive crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Pool settings used for every round.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Transport settings for the default reqwest client.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Maximum number of frontier rounds. `0` means unlimited.
    #[serde(default)]
    pub max_rounds: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            transport: TransportConfig::default(),
            max_rounds: 0,
        }
    }
}

impl CrawlerConfig {
    /// Creates a new crawler configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `CrawlflowError::Config` if the text is not a valid
    /// configuration.
    pub fn from_json_str(text: &str) -> Result<Self, CrawlflowError> {
        serde_json::from_str(text).map_err(|e| CrawlflowError::config(e.to_string()))
    }

    /// Sets the pool settings.
    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Sets the transport settings.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the round limit.
    #[must_use]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransportErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pool_limit() {
        assert_eq!(PoolConfig::new().limit(), None);
        assert_eq!(PoolConfig::new().with_concurrency(8).limit(), Some(8));
    }

    #[test]
    fn test_transport_defaults() {
        let config = TransportConfig::default();
        assert!(config.user_agent.starts_with("crawlflow/"));
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.default_timeout().unwrap(), None);
        assert_eq!(
            config.with_default_timeout(1.5).default_timeout().unwrap(),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_unrepresentable_timeouts_are_invalid() {
        let config = TransportConfig::new().with_default_timeout(1e30).with_connect_timeout(-2.0);
        assert_eq!(
            config.default_timeout().unwrap_err().kind(),
            TransportErrorKind::InvalidOptions
        );
        assert_eq!(
            config.connect_timeout().unwrap_err().kind(),
            TransportErrorKind::InvalidOptions
        );
        assert_eq!(TransportConfig::new().with_connect_timeout(0.0).connect_timeout().unwrap(), None);
    }

    #[test]
    fn test_crawler_config_from_json() {
        let config = CrawlerConfig::from_json_str(
            r#"{"pool": {"concurrency": 4}, "transport": {"user_agent": "bot/1"}, "max_rounds": 3}"#,
        )
        .unwrap();

        assert_eq!(config.pool.concurrency, 4);
        assert!(config.pool.log_each_exchange);
        assert_eq!(config.transport.user_agent, "bot/1");
        assert_eq!(config.transport.max_redirects, 5);
        assert_eq!(config.max_rounds, 3);
    }

    #[test]
    fn test_crawler_config_rejects_garbage() {
        let err = CrawlerConfig::from_json_str("{\"pool\": 3}").unwrap_err();
        assert!(matches!(err, CrawlflowError::Config(_)));
    }
}
