//! # Crawlflow
//!
//! Concurrent HTTP dispatch for web crawlers.
//!
//! Crawlflow sends batches of immutable [`Request`](http::Request)s with
//! bounded concurrency and routes each settled exchange to exactly one
//! handler:
//!
//! - **Pool**: [`Client::pool`](http::Client::pool) pulls requests lazily
//!   and returns once every one of them has settled
//! - **Fulfilment vs rejection**: any HTTP reply (4xx and 5xx included) is a
//!   [`Response`](http::Response); only transport failures become a
//!   [`RequestException`](http::RequestException)
//! - **Parse results**: a request's callback yields a lazy stream of
//!   [`ParseResult`](spider::ParseResult)s, each a follow-up request or an
//!   [`Item`](spider::Item)
//! - **Crawling**: [`Crawler`](crawl::Crawler) feeds follow-ups back into the
//!   pool round after round
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crawlflow::prelude::*;
//!
//! let client = Client::new().with_concurrency(8);
//! let requests = urls.iter().map(|u| Request::get(u, parse_listing)).collect::<Result<Vec<_>, _>>()?;
//!
//! client
//!     .pool(
//!         requests,
//!         |response| println!("{} {}", response.status(), response.url()),
//!         |exception| eprintln!("{}: {}", exception.request().uri(), exception.reason()),
//!     )
//!     .await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod crawl;
pub mod errors;
pub mod http;
pub mod observability;
pub mod spider;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{CrawlerConfig, PoolConfig, TransportConfig};
    pub use crate::crawl::{
        CollectingItemSink, CrawlReport, Crawler, ItemSink, LoggingItemSink, NoOpItemSink,
    };
    pub use crate::errors::{CrawlflowError, ExtractionError, TransportError, TransportErrorKind};
    pub use crate::http::{
        Client, Outcome, PoolSummary, RawResponse, Request, RequestException, RequestOptions,
        ReqwestTransport, Response, Transport,
    };
    pub use crate::spider::{empty_stream, stream_of, try_stream_of, Item, ParseResult, ParseStream};
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[test]
    fn library_compiles() {
        let request = Request::get("https://example.com/", |_| empty_stream()).unwrap();
        assert_eq!(request.method().as_str(), "GET");
    }
}
