//! Parse results and extracted items.
//!
//! A request's parse callback turns a [`Response`](crate::http::Response)
//! into a [`ParseStream`]: a lazy iterator of [`ParseResult`]s, each either a
//! follow-up request for the frontier or an [`Item`] for the output.

mod item;
mod parse_result;

pub use item::Item;
pub use parse_result::{ParseResult, ParseStream};

use crate::errors::ExtractionError;

/// A stream that yields nothing.
#[must_use]
pub fn empty_stream() -> ParseStream {
    Box::new(std::iter::empty())
}

/// Wraps infallible results into a stream.
pub fn stream_of<I>(results: I) -> ParseStream
where
    I: IntoIterator<Item = ParseResult>,
    I::IntoIter: Send + 'static,
{
    Box::new(results.into_iter().map(Ok))
}

/// Wraps fallible results into a stream.
pub fn try_stream_of<I>(results: I) -> ParseStream
where
    I: IntoIterator<Item = Result<ParseResult, ExtractionError>>,
    I::IntoIter: Send + 'static,
{
    Box::new(results.into_iter())
}
