//! The frontier loop that turns parse results into further dispatch rounds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, info, info_span, warn, Instrument};

use super::sink::ItemSink;
use crate::config::CrawlerConfig;
use crate::errors::{CrawlflowError, ExtractionError};
use crate::http::{Client, Request, RequestException, Response};
use crate::spider::Item;

/// Hook invoked for every rejected exchange.
pub type RejectionHook = Arc<dyn Fn(&RequestException) + Send + Sync>;

/// Hook invoked when a parse stream yields an error.
///
/// Receives the request with its response bound.
pub type ExtractionErrorHook = Arc<dyn Fn(&Request, &ExtractionError) + Send + Sync>;

/// Counters for one crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Dispatch rounds run.
    pub rounds: usize,
    /// Requests dispatched across all rounds.
    pub requests: usize,
    /// Exchanges that produced a response.
    pub fulfilled: usize,
    /// Exchanges that produced no response.
    pub rejected: usize,
    /// Items handed to the sink.
    pub items: usize,
    /// Requests skipped because middleware marked them dropped.
    pub dropped: usize,
    /// Parse streams cut short by an error.
    pub extraction_errors: usize,
    /// Items the sink refused.
    pub sink_errors: usize,
    /// Requests left in the frontier when the round limit was reached.
    pub abandoned: usize,
    /// Total wall time.
    pub elapsed: Duration,
}

impl CrawlReport {
    /// Converts to dictionary.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut dict = HashMap::new();
        dict.insert("rounds".to_string(), json!(self.rounds));
        dict.insert("requests".to_string(), json!(self.requests));
        dict.insert("fulfilled".to_string(), json!(self.fulfilled));
        dict.insert("rejected".to_string(), json!(self.rejected));
        dict.insert("items".to_string(), json!(self.items));
        dict.insert("dropped".to_string(), json!(self.dropped));
        dict.insert("extraction_errors".to_string(), json!(self.extraction_errors));
        dict.insert("sink_errors".to_string(), json!(self.sink_errors));
        dict.insert("abandoned".to_string(), json!(self.abandoned));
        dict.insert("duration_ms".to_string(), json!(self.elapsed.as_secs_f64() * 1000.0));
        dict
    }
}

/// Runs dispatch rounds until the frontier is empty.
///
/// Each round pools the current frontier. Every response is bound to its
/// request and run through the request's parse callback; follow-up requests
/// form the next frontier and items go to the [`ItemSink`].
#[derive(Clone)]
pub struct Crawler {
    client: Client,
    sink: Arc<dyn ItemSink>,
    max_rounds: usize,
    on_rejected: Option<RejectionHook>,
    on_extraction_error: Option<ExtractionErrorHook>,
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("client", &self.client)
            .field("max_rounds", &self.max_rounds)
            .finish_non_exhaustive()
    }
}

impl Crawler {
    /// Creates a crawler with no round limit.
    #[must_use]
    pub fn new(client: Client, sink: Arc<dyn ItemSink>) -> Self {
        Self {
            client,
            sink,
            max_rounds: 0,
            on_rejected: None,
            on_extraction_error: None,
        }
    }

    /// Creates a crawler backed by a reqwest transport built from `config`.
    #[must_use]
    pub fn from_config(config: CrawlerConfig, sink: Arc<dyn ItemSink>) -> Self {
        let client = Client::with_transport_config(config.transport).with_config(config.pool);
        Self::new(client, sink).with_max_rounds(config.max_rounds)
    }

    /// Limits the number of rounds. `0` means unlimited.
    #[must_use]
    pub const fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Sets a hook for rejected exchanges.
    #[must_use]
    pub fn on_rejected<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestException) + Send + Sync + 'static,
    {
        self.on_rejected = Some(Arc::new(hook));
        self
    }

    /// Sets a hook for parse streams that yield an error.
    #[must_use]
    pub fn on_extraction_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Request, &ExtractionError) + Send + Sync + 'static,
    {
        self.on_extraction_error = Some(Arc::new(hook));
        self
    }

    /// The client used for every round.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Crawls from `seeds` until no follow-up requests remain.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if it fails to flush. Rejections, extraction
    /// failures and refused items are counted in the report instead.
    pub async fn run<I>(&self, seeds: I) -> Result<CrawlReport, CrawlflowError>
    where
        I: IntoIterator<Item = Request>,
    {
        let started = Instant::now();
        let mut report = CrawlReport::default();
        let mut frontier = Vec::new();
        for seed in seeds {
            self.enqueue(seed, &mut frontier, &mut report);
        }

        while !frontier.is_empty() {
            if self.max_rounds > 0 && report.rounds >= self.max_rounds {
                report.abandoned = frontier.len();
                info!(
                    max_rounds = self.max_rounds,
                    abandoned = report.abandoned,
                    "Round limit reached"
                );
                break;
            }

            report.rounds += 1;
            let batch = std::mem::take(&mut frontier);
            let span = info_span!("crawl_round", round = report.rounds, size = batch.len());
            frontier = self.round(batch, &mut report).instrument(span).await;
        }

        self.sink.flush()?;
        report.elapsed = started.elapsed();
        info!(
            rounds = report.rounds,
            requests = report.requests,
            items = report.items,
            rejected = report.rejected,
            extraction_errors = report.extraction_errors,
            duration_ms = report.elapsed.as_secs_f64() * 1000.0,
            "Crawl finished"
        );
        Ok(report)
    }

    async fn round(&self, batch: Vec<Request>, report: &mut CrawlReport) -> Vec<Request> {
        let mut next = Vec::new();
        let mut counts = CrawlReport::default();

        let summary = self
            .client
            .pool(
                batch,
                |response| self.handle_response(response, &mut next, &mut counts),
                |exception| self.handle_rejection(&exception),
            )
            .await;

        report.requests += summary.dispatched;
        report.fulfilled += summary.fulfilled;
        report.rejected += summary.rejected;
        report.items += counts.items;
        report.dropped += counts.dropped;
        report.extraction_errors += counts.extraction_errors;
        report.sink_errors += counts.sink_errors;
        debug!(discovered = next.len(), "Round settled");
        next
    }

    fn handle_response(&self, response: Response, next: &mut Vec<Request>, counts: &mut CrawlReport) {
        let request = response.request().clone();
        let stream = request.callback(&response);
        let request = request.with_response(response);

        for result in stream {
            let follow_up = match result {
                Ok(result) => result.apply(Some, |item| {
                    self.emit(item, counts);
                    None
                }),
                Err(error) => {
                    counts.extraction_errors += 1;
                    warn!(
                        request_id = %request.id(),
                        url = %request.url(),
                        error = %error,
                        "Parse stream failed; skipping the rest of it"
                    );
                    if let Some(hook) = &self.on_extraction_error {
                        hook(&request, &error);
                    }
                    break;
                }
            };
            if let Some(follow_up) = follow_up {
                self.enqueue(follow_up, next, counts);
            }
        }
    }

    fn handle_rejection(&self, exception: &RequestException) {
        if let Some(hook) = &self.on_rejected {
            hook(exception);
        }
    }

    #[allow(clippy::unused_self)]
    fn enqueue(&self, request: Request, frontier: &mut Vec<Request>, counts: &mut CrawlReport) {
        if let Some(reason) = request.drop_reason() {
            counts.dropped += 1;
            debug!(request_id = %request.id(), url = %request.url(), reason, "Skipping dropped request");
            return;
        }
        frontier.push(request);
    }

    fn emit(&self, item: Item, counts: &mut CrawlReport) {
        counts.items += 1;
        if let Err(e) = self.sink.process(item) {
            counts.sink_errors += 1;
            warn!(error = %e, "Item sink refused an item");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::CollectingItemSink;
    use crate::errors::TransportError;
    use crate::http::RawResponse;
    use crate::http::{MockTransport, Transport};
    use crate::spider::{empty_stream, stream_of, try_stream_of, ParseResult};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use reqwest::StatusCode;
    use serde_json::json;

    fn leaf(_: &Response) -> crate::spider::ParseStream {
        empty_stream()
    }

    fn site() -> Arc<dyn Transport> {
        let mut transport = MockTransport::new();
        transport.expect_send().returning(|req| match req.path() {
            "/down" => Err(TransportError::connect("connection refused")),
            _ => Ok(RawResponse::new(StatusCode::OK, req.url().clone(), "")),
        });
        Arc::new(transport)
    }

    fn crawler(sink: Arc<CollectingItemSink>) -> Crawler {
        Crawler::new(Client::with_transport(site()).with_concurrency(4), sink)
    }

    #[tokio::test]
    async fn test_follow_ups_and_items_are_routed() {
        let seed = Request::get("https://site.test/index", |res| {
            let follow = Request::get(&format!("{}d", res.url()), leaf).unwrap();
            stream_of(vec![
                ParseResult::from(follow),
                ParseResult::item_from([("title", "x")]),
            ])
        })
        .unwrap();
        let sink = Arc::new(CollectingItemSink::new());

        let report = crawler(sink.clone()).run([seed]).await.unwrap();

        assert_eq!(report.rounds, 2);
        assert_eq!(report.requests, 2);
        assert_eq!(report.fulfilled, 2);
        assert_eq!(sink.items(), vec![Item::new().with("title", "x")]);
    }

    #[tokio::test]
    async fn test_dropped_requests_are_skipped() {
        let seed = Request::get("https://site.test/", |_| {
            let dropped = Request::get("https://site.test/ads", leaf)
                .unwrap()
                .with_dropped("blocked");
            stream_of(vec![ParseResult::from(dropped)])
        })
        .unwrap();
        let dropped_seed = Request::get("https://site.test/other", leaf)
            .unwrap()
            .with_dropped("robots");

        let report = crawler(Arc::new(CollectingItemSink::new()))
            .run([seed, dropped_seed])
            .await
            .unwrap();

        assert_eq!(report.requests, 1);
        assert_eq!(report.dropped, 2);
        assert_eq!(report.rounds, 1);
    }

    #[tokio::test]
    async fn test_extraction_error_abandons_only_that_stream() {
        let broken = Request::get("https://site.test/broken", |res| {
            try_stream_of(vec![
                Ok(ParseResult::item_from([("n", 1)])),
                Err(ExtractionError::new(res.url().as_str(), "bad markup")),
                Ok(ParseResult::item_from([("n", 2)])),
            ])
        })
        .unwrap();
        let healthy = Request::get("https://site.test/ok", |_| {
            stream_of(vec![ParseResult::item_from([("n", 3)])])
        })
        .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let sink = Arc::new(CollectingItemSink::new());

        let report = crawler(sink.clone())
            .on_extraction_error(move |req, err| {
                assert!(req.response().is_some());
                recorder.lock().push(err.message.clone());
            })
            .run([broken, healthy])
            .await
            .unwrap();

        assert_eq!(report.extraction_errors, 1);
        assert_eq!(report.items, 2);
        assert_eq!(*seen.lock(), vec!["bad markup".to_string()]);
        let mut values: Vec<_> = sink.items().iter().filter_map(|i| i.get("n").cloned()).collect();
        values.sort_by_key(|v| v.as_i64());
        assert_eq!(values, vec![json!(1), json!(3)]);
    }

    #[tokio::test]
    async fn test_rejections_reach_hook() {
        let seed = Request::get("https://site.test/down", leaf).unwrap();
        let rejected = Arc::new(Mutex::new(Vec::new()));
        let recorder = rejected.clone();

        let report = crawler(Arc::new(CollectingItemSink::new()))
            .on_rejected(move |e| recorder.lock().push(e.request().uri().to_string()))
            .run([seed])
            .await
            .unwrap();

        assert_eq!(report.rejected, 1);
        assert_eq!(*rejected.lock(), vec!["https://site.test/down".to_string()]);
    }

    #[tokio::test]
    async fn test_round_limit_abandons_frontier() {
        fn endless(res: &Response) -> crate::spider::ParseStream {
            let next = Request::get(&format!("{}x", res.url()), endless).unwrap();
            stream_of(vec![ParseResult::from(next)])
        }
        let seed = Request::get("https://site.test/", endless).unwrap();

        let report = crawler(Arc::new(CollectingItemSink::new()))
            .with_max_rounds(3)
            .run([seed])
            .await
            .unwrap();

        assert_eq!(report.rounds, 3);
        assert_eq!(report.abandoned, 1);
        assert_eq!(report.to_dict().get("abandoned").unwrap(), 1);
    }
}
