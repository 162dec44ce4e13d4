//! Completed exchanges.

use std::borrow::Cow;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;

use super::request::Request;

/// What a transport returns when an exchange produced any HTTP reply.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Status code of the final reply.
    pub status: StatusCode,
    /// Reply headers.
    pub headers: HeaderMap,
    /// Reply body.
    pub body: Bytes,
    /// Final URL after redirects.
    pub url: Url,
}

impl RawResponse {
    /// Creates a raw response with no headers.
    #[must_use]
    pub fn new(status: StatusCode, url: Url, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            url,
        }
    }

    /// Sets the reply headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// A completed HTTP exchange paired with the request that produced it.
///
/// Any reply counts, whatever its status; only the pool creates responses.
#[derive(Debug, Clone)]
pub struct Response {
    raw: RawResponse,
    request: Request,
    received_at: DateTime<Utc>,
    elapsed: Duration,
}

impl Response {
    pub(crate) fn new(raw: RawResponse, request: Request, elapsed: Duration) -> Self {
        Self {
            raw,
            request,
            received_at: Utc::now(),
            elapsed,
        }
    }

    /// The originating request.
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// The reply status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.raw.status
    }

    /// The reply headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.raw.headers
    }

    /// A reply header as text, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.raw.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The reply body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.raw.body
    }

    /// The reply body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw.body)
    }

    /// Deserializes the reply body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.raw.body)
    }

    /// The final URL after redirects.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.raw.url
    }

    /// When the reply was received.
    #[must_use]
    pub const fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// How long the exchange took.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.raw.status.is_success()
    }

    /// Whether the status is 4xx.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.raw.status.is_client_error()
    }

    /// Whether the status is 5xx.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.raw.status.is_server_error()
    }
}
