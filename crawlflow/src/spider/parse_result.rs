//! The tagged output of a parse callback.

use serde_json::Value;

use super::item::Item;
use crate::errors::{CrawlflowError, ExtractionError};
use crate::http::{Request, RequestOptions, Response};

/// A lazily produced, single-pass sequence of parse results.
///
/// An `Err` entry reports a failure while producing results; consumers decide
/// whether to stop reading the stream.
pub type ParseStream = Box<dyn Iterator<Item = Result<ParseResult, ExtractionError>> + Send>;

/// Either a follow-up request or an extracted item.
///
/// The held value is only reachable through [`ParseResult::apply`], so every
/// consumer handles every variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    value: ParseValue,
}

#[derive(Debug, Clone, PartialEq)]
enum ParseValue {
    Request(Request),
    Item(Item),
}

impl ParseResult {
    /// Wraps an existing item.
    #[must_use]
    pub fn item(item: impl Into<Item>) -> Self {
        Self {
            value: ParseValue::Item(item.into()),
        }
    }

    /// Builds an item from `(field, value)` pairs.
    #[must_use]
    pub fn item_from<K, V, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::item(fields.into_iter().collect::<Item>())
    }

    /// Builds a follow-up request inline.
    ///
    /// # Errors
    ///
    /// Returns `CrawlflowError::InvalidUrl` or `CrawlflowError::InvalidMethod`
    /// when the target cannot be parsed.
    pub fn request<F>(
        method: &str,
        url: &str,
        parse_callback: F,
        options: RequestOptions,
    ) -> Result<Self, CrawlflowError>
    where
        F: Fn(&Response) -> ParseStream + Send + Sync + 'static,
    {
        Ok(Self::from(Request::new(method, url, parse_callback)?.with_options(options)))
    }

    /// Invokes exactly one handler, matching the held variant.
    pub fn apply<R>(self, if_request: impl FnOnce(Request) -> R, if_item: impl FnOnce(Item) -> R) -> R {
        match self.value {
            ParseValue::Request(request) => if_request(request),
            ParseValue::Item(item) => if_item(item),
        }
    }
}

impl From<Request> for ParseResult {
    fn from(request: Request) -> Self {
        Self {
            value: ParseValue::Request(request),
        }
    }
}

impl From<Item> for ParseResult {
    fn from(item: Item) -> Self {
        Self::item(item)
    }
}
