//! Error types for the crawlflow dispatch core.
//!
//! The taxonomy separates three failure families:
//!
//! - construction errors (bad URL, method or header) raised while building a
//!   [`Request`](crate::http::Request),
//! - transport failures, where no HTTP response was ever obtained,
//! - extraction failures raised by a request's parse callback.
//!
//! HTTP error statuses are deliberately absent: a 404 or 500 reply is an
//! ordinary [`Response`](crate::http::Response).

use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for crawlflow operations.
#[derive(Debug, Error)]
pub enum CrawlflowError {
    /// A URL could not be parsed.
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        /// The offending input.
        url: String,
        /// The parser error.
        #[source]
        source: url::ParseError,
    },

    /// An HTTP method token was rejected.
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// A header name or value was rejected.
    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader {
        /// The header name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A transport failure outside of a pooled exchange.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// A parse callback failed while producing results.
    #[error("{0}")]
    Extraction(#[from] ExtractionError),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlflowError {
    /// Creates an invalid header error.
    #[must_use]
    pub fn invalid_header(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The connection could not be established (refused, DNS, TLS handshake).
    Connect,
    /// The exchange timed out before a reply arrived.
    Timeout,
    /// The redirect policy was violated (loop or limit).
    Redirect,
    /// The request could not be sent or the reply could not be read.
    Request,
    /// The response body could not be read.
    Body,
    /// The options bag held a value the transport cannot honour.
    InvalidOptions,
    /// Anything else.
    Other,
}

impl TransportErrorKind {
    /// Returns the stable lowercase name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Redirect => "redirect",
            Self::Request => "request",
            Self::Body => "body",
            Self::InvalidOptions => "invalid_options",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure that happened before any HTTP response was received.
#[derive(Debug, Error)]
#[error("Transport error ({kind}): {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl TransportError {
    /// Creates a new transport error without an underlying source.
    #[must_use]
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Creates a connection failure.
    #[must_use]
    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    /// Creates a timeout failure.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    /// Creates an invalid options failure.
    #[must_use]
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::InvalidOptions, message)
    }

    /// Returns the failure classification.
    #[must_use]
    pub const fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the failure was a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::Timeout
    }

    /// Whether the failure was a connection failure.
    #[must_use]
    pub fn is_connect(&self) -> bool {
        self.kind == TransportErrorKind::Connect
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), json!("TransportError"));
        map.insert("kind".to_string(), json!(self.kind.as_str()));
        map.insert("message".to_string(), json!(self.message));
        if let Some(ref source) = self.source {
            map.insert("cause".to_string(), json!(source.to_string()));
        }
        map
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_builder() {
            TransportErrorKind::InvalidOptions
        } else if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_redirect() {
            TransportErrorKind::Redirect
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else if err.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string()).with_source(err)
    }
}

/// Error raised by a parse callback while producing results.
#[derive(Debug, Clone, Error)]
#[error("Extraction failed for '{url}': {message}")]
pub struct ExtractionError {
    /// URL of the response being parsed.
    pub url: String,
    /// What went wrong.
    pub message: String,
}

impl ExtractionError {
    /// Creates a new extraction error.
    #[must_use]
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), json!("ExtractionError"));
        map.insert("url".to_string(), json!(self.url));
        map.insert("message".to_string(), json!(self.message));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_transport_error_carries_kind_and_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = TransportError::connect("could not connect").with_source(io);

        assert!(err.is_connect());
        assert!(!err.is_timeout());
        assert_eq!(err.kind().as_str(), "connect");
        assert!(err.source().is_some());
        assert!(err.to_string().contains("(connect)"));
    }

    #[test]
    fn test_transport_error_to_dict() {
        let err = TransportError::timeout("no reply after 1s");
        let dict = err.to_dict();

        assert_eq!(dict.get("kind").unwrap(), "timeout");
        assert_eq!(dict.get("message").unwrap(), "no reply after 1s");
        assert!(!dict.contains_key("cause"));
    }

    #[test]
    fn test_extraction_error_wraps_into_crawlflow_error() {
        let err: CrawlflowError = ExtractionError::new("https://example.com", "bad selector").into();
        assert!(matches!(err, CrawlflowError::Extraction(_)));
        assert!(err.to_string().contains("bad selector"));
    }

    #[test]
    fn test_invalid_header_display() {
        let err = CrawlflowError::invalid_header("X Bad", "contains whitespace");
        assert_eq!(err.to_string(), "Invalid header 'X Bad': contains whitespace");
    }
}
