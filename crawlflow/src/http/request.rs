//! The immutable description of one HTTP exchange.
//!
//! A [`Request`] bundles the target (method, URL, headers), the transport
//! options bag, opaque middleware metadata, a drop marker and the parse
//! callback to run once the exchange completes. Every field is changed
//! through a `with_*` method that leaves the receiver untouched and returns
//! a new request; fields are `Arc`-shared, so a copy only clones the field it
//! changes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use super::headers::HeaderSet;
use super::options::RequestOptions;
use super::response::Response;
use crate::errors::CrawlflowError;
use crate::spider::ParseStream;

/// A parse callback shared between requests.
pub type ParseCallback = Arc<dyn Fn(&Response) -> ParseStream + Send + Sync>;

/// One HTTP exchange to perform, plus what to do with its response.
#[derive(Clone)]
pub struct Request {
    id: Uuid,
    method: Method,
    url: Url,
    headers: Arc<HeaderSet>,
    options: Arc<RequestOptions>,
    meta: Arc<HashMap<String, Value>>,
    drop_reason: Option<Arc<str>>,
    parse_callback: ParseCallback,
    response: Option<Arc<Response>>,
}

impl Request {
    /// Creates a request bound to a parse callback.
    ///
    /// # Errors
    ///
    /// Returns `CrawlflowError::InvalidUrl` or `CrawlflowError::InvalidMethod`
    /// when the target cannot be parsed.
    pub fn new<F>(method: &str, url: &str, parse_callback: F) -> Result<Self, CrawlflowError>
    where
        F: Fn(&Response) -> ParseStream + Send + Sync + 'static,
    {
        Self::with_shared_callback(method, url, Arc::new(parse_callback))
    }

    /// Creates a request that reuses an existing parse callback.
    ///
    /// # Errors
    ///
    /// Returns `CrawlflowError::InvalidUrl` or `CrawlflowError::InvalidMethod`
    /// when the target cannot be parsed.
    pub fn with_shared_callback(
        method: &str,
        url: &str,
        parse_callback: ParseCallback,
    ) -> Result<Self, CrawlflowError> {
        Ok(Self {
            id: Uuid::new_v4(),
            method: parse_method(method)?,
            url: parse_url(url)?,
            headers: Arc::new(HeaderSet::new()),
            options: Arc::new(RequestOptions::new()),
            meta: Arc::new(HashMap::new()),
            drop_reason: None,
            parse_callback,
            response: None,
        })
    }

    /// Creates a `GET` request.
    ///
    /// # Errors
    ///
    /// Returns `CrawlflowError::InvalidUrl` when the URL cannot be parsed.
    pub fn get<F>(url: &str, parse_callback: F) -> Result<Self, CrawlflowError>
    where
        F: Fn(&Response) -> ParseStream + Send + Sync + 'static,
    {
        Self::new("GET", url, parse_callback)
    }

    /// Identifier of the logical request, kept across `with_*` copies.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// The parsed target URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// The target URL as a string.
    #[must_use]
    pub fn uri(&self) -> &str {
        self.url.as_str()
    }

    /// The path component of the target URL.
    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// All request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    /// Whether a header is set (case-insensitive).
    #[must_use]
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    /// Values of a header, or an empty slice.
    #[must_use]
    pub fn header(&self, name: &str) -> &[String] {
        self.headers.get(name)
    }

    /// The transport options bag.
    #[must_use]
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// A single transport option.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// All middleware metadata.
    #[must_use]
    pub fn meta(&self) -> &HashMap<String, Value> {
        &self.meta
    }

    /// A single metadata value.
    #[must_use]
    pub fn meta_value(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    /// The captured response, once the exchange has completed.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        self.response.as_deref()
    }

    /// Whether middleware marked this request as dropped.
    #[must_use]
    pub const fn was_dropped(&self) -> bool {
        self.drop_reason.is_some()
    }

    /// Why the request was dropped, if it was.
    #[must_use]
    pub fn drop_reason(&self) -> Option<&str> {
        self.drop_reason.as_deref()
    }

    /// The bound parse callback.
    #[must_use]
    pub fn parse_callback(&self) -> &ParseCallback {
        &self.parse_callback
    }

    /// Runs the parse callback against a response.
    ///
    /// Errors raised while producing results are yielded by the stream and
    /// are not intercepted here.
    pub fn callback(&self, response: &Response) -> ParseStream {
        (self.parse_callback)(response)
    }

    /// Returns a copy with `name` set to `value`, replacing earlier values.
    ///
    /// # Errors
    ///
    /// Returns `CrawlflowError::InvalidHeader` for names or values that are
    /// not valid on the wire.
    pub fn with_header(&self, name: &str, value: impl Into<String>) -> Result<Self, CrawlflowError> {
        self.with_header_values(name, [value.into()])
    }

    /// Returns a copy with `name` set to several values.
    ///
    /// # Errors
    ///
    /// Returns `CrawlflowError::InvalidHeader` for names or values that are
    /// not valid on the wire.
    pub fn with_header_values<I, V>(&self, name: &str, values: I) -> Result<Self, CrawlflowError>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let mut headers = HeaderSet::clone(&self.headers);
        headers.set(name, values)?;
        Ok(Self {
            headers: Arc::new(headers),
            ..self.clone()
        })
    }

    /// Returns a copy without the named header.
    #[must_use]
    pub fn without_header(&self, name: &str) -> Self {
        if !self.headers.contains(name) {
            return self.clone();
        }
        let mut copy = self.clone();
        Arc::make_mut(&mut copy.headers).remove(name);
        copy
    }

    /// Returns a copy with one transport option set.
    #[must_use]
    pub fn with_option(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut copy = self.clone();
        Arc::make_mut(&mut copy.options).insert(key, value);
        copy
    }

    /// Returns a copy with the whole options bag replaced.
    #[must_use]
    pub fn with_options(&self, options: RequestOptions) -> Self {
        Self {
            options: Arc::new(options),
            ..self.clone()
        }
    }

    /// Returns a copy with one metadata entry set.
    #[must_use]
    pub fn with_meta(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut copy = self.clone();
        Arc::make_mut(&mut copy.meta).insert(key.into(), value.into());
        copy
    }

    /// Returns a copy marked as dropped.
    #[must_use]
    pub fn with_dropped(&self, reason: impl Into<String>) -> Self {
        let reason: String = reason.into();
        Self {
            drop_reason: Some(Arc::from(reason)),
            ..self.clone()
        }
    }

    /// Returns a copy carrying the captured response.
    #[must_use]
    pub fn with_response(&self, response: Response) -> Self {
        Self {
            response: Some(Arc::new(response)),
            ..self.clone()
        }
    }

    /// Returns a copy targeting another URL.
    ///
    /// # Errors
    ///
    /// Returns `CrawlflowError::InvalidUrl` when the URL cannot be parsed.
    pub fn with_url(&self, url: &str) -> Result<Self, CrawlflowError> {
        Ok(Self {
            url: parse_url(url)?,
            ..self.clone()
        })
    }

    /// Returns a copy using another method.
    ///
    /// # Errors
    ///
    /// Returns `CrawlflowError::InvalidMethod` for invalid method tokens.
    pub fn with_method(&self, method: &str) -> Result<Self, CrawlflowError> {
        Ok(Self {
            method: parse_method(method)?,
            ..self.clone()
        })
    }
}

fn parse_method(method: &str) -> Result<Method, CrawlflowError> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| CrawlflowError::InvalidMethod(method.to_string()))
}

fn parse_url(url: &str) -> Result<Url, CrawlflowError> {
    Url::parse(url).map_err(|source| CrawlflowError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        let same_response = match (&self.response, &other.response) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        self.id == other.id
            && self.method == other.method
            && self.url == other.url
            && self.headers == other.headers
            && self.options == other.options
            && self.meta == other.meta
            && self.drop_reason == other.drop_reason
            && Arc::ptr_eq(&self.parse_callback, &other.parse_callback)
            && same_response
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("options", &self.options)
            .field("meta", &self.meta)
            .field("drop_reason", &self.drop_reason)
            .field("has_response", &self.response.is_some())
            .finish_non_exhaustive()
    }
}
