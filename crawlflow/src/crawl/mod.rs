//! Recursive crawling on top of the request pool.
//!
//! The pool only dispatches one batch. [`Crawler`] closes the loop: it feeds
//! each round's follow-up requests back into the next `pool` call and hands
//! extracted items to an [`ItemSink`].

mod crawler;
mod sink;

pub use crawler::{CrawlReport, Crawler, ExtractionErrorHook, RejectionHook};
pub use sink::{CollectingItemSink, ItemSink, LoggingItemSink, NoOpItemSink};
