//! Concurrent dispatch of request batches.
//!
//! [`Client::pool`] pulls requests lazily from an iterator, keeps up to the
//! configured number of exchanges in flight, and hands each settled exchange
//! to exactly one of two handlers. All in-flight exchanges are multiplexed on
//! the calling task; handlers run there too, so they may freely borrow and
//! mutate caller state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, Stream, StreamExt};
use serde_json::json;
use tracing::{debug, debug_span, info, warn, Instrument};

use super::exception::RequestException;
use super::request::Request;
use super::response::Response;
use super::transport::{ReqwestTransport, Transport};
use crate::config::{PoolConfig, TransportConfig};
use crate::errors::TransportError;

/// The terminal outcome of one exchange.
#[derive(Debug)]
pub enum Outcome {
    /// A reply was received, whatever its status.
    Fulfilled(Response),
    /// No reply was obtained.
    Rejected(RequestException),
}

impl Outcome {
    /// Whether a reply was received.
    #[must_use]
    pub const fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    /// The request this outcome settles.
    #[must_use]
    pub const fn request(&self) -> &Request {
        match self {
            Self::Fulfilled(response) => response.request(),
            Self::Rejected(exception) => exception.request(),
        }
    }

    /// Converts into a standard `Result`.
    ///
    /// # Errors
    ///
    /// Returns the `RequestException` for rejected exchanges.
    pub fn into_result(self) -> Result<Response, RequestException> {
        match self {
            Self::Fulfilled(response) => Ok(response),
            Self::Rejected(exception) => Err(exception),
        }
    }
}

/// Counters for one `pool` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSummary {
    /// Requests pulled from the source and sent.
    pub dispatched: usize,
    /// Exchanges delivered to the fulfilment handler.
    pub fulfilled: usize,
    /// Exchanges delivered to the rejection handler.
    pub rejected: usize,
    /// Highest number of exchanges in flight at once.
    pub peak_in_flight: usize,
    /// Wall time from the first dispatch to the last settlement.
    pub elapsed: Duration,
}

impl PoolSummary {
    /// Exchanges that reached a terminal outcome.
    #[must_use]
    pub const fn settled(&self) -> usize {
        self.fulfilled + self.rejected
    }

    /// Whether every dispatched request settled.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.settled() == self.dispatched
    }

    /// Converts to dictionary.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut dict = HashMap::new();
        dict.insert("dispatched".to_string(), json!(self.dispatched));
        dict.insert("fulfilled".to_string(), json!(self.fulfilled));
        dict.insert("rejected".to_string(), json!(self.rejected));
        dict.insert("peak_in_flight".to_string(), json!(self.peak_in_flight));
        dict.insert("duration_ms".to_string(), json!(self.elapsed.as_secs_f64() * 1000.0));
        dict
    }

    fn record_dispatch(&mut self, in_flight: usize) {
        self.dispatched += 1;
        self.peak_in_flight = self.peak_in_flight.max(in_flight);
    }
}

/// Sends requests through a [`Transport`].
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    config: PoolConfig,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client backed by a default reqwest transport.
    #[must_use]
    pub fn new() -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::new()))
    }

    /// Creates a client backed by a reqwest transport with the given settings.
    #[must_use]
    pub fn with_transport_config(config: TransportConfig) -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::with_config(config)))
    }

    /// Creates a client backed by any transport.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: PoolConfig::default(),
        }
    }

    /// Sets the pool settings.
    #[must_use]
    pub fn with_config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the concurrency limit. `0` means unbounded.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// The pool settings.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Performs one exchange.
    pub async fn send(&self, request: Request) -> Outcome {
        let started = Instant::now();
        let result: Result<_, TransportError> = self.transport.send(&request).await;
        match result {
            Ok(raw) => Outcome::Fulfilled(Response::new(raw, request, started.elapsed())),
            Err(reason) => Outcome::Rejected(RequestException::new(request, reason)),
        }
    }

    fn dispatch(&self, request: Request) -> impl std::future::Future<Output = Outcome> + '_ {
        let span = debug_span!(
            "exchange",
            request_id = %request.id(),
            method = %request.method(),
            url = %request.url(),
        );
        self.send(request).instrument(span)
    }

    /// Dispatches a batch and waits until every request has settled.
    ///
    /// Requests are pulled from `requests` only when a slot is free. Each
    /// request produces exactly one call to `on_fulfilled` (any HTTP reply,
    /// including 4xx and 5xx) or `on_rejected` (no reply). Calls happen in
    /// completion order, not submission order.
    pub async fn pool<I, F, R>(&self, requests: I, mut on_fulfilled: F, mut on_rejected: R) -> PoolSummary
    where
        I: IntoIterator<Item = Request>,
        F: FnMut(Response),
        R: FnMut(RequestException),
    {
        let started = Instant::now();
        let limit = self.config.limit();
        let mut source = requests.into_iter().fuse();
        let mut in_flight = FuturesUnordered::new();
        let mut summary = PoolSummary::default();

        loop {
            while limit.map_or(true, |max| in_flight.len() < max) {
                let Some(request) = source.next() else { break };
                in_flight.push(self.dispatch(request));
                summary.record_dispatch(in_flight.len());
            }

            let Some(outcome) = in_flight.next().await else { break };
            self.settle(outcome, &mut summary, &mut on_fulfilled, &mut on_rejected);
        }

        summary.elapsed = started.elapsed();
        self.log_summary(&summary);
        summary
    }

    /// Like [`Client::pool`], for requests produced by an async stream.
    ///
    /// The stream is polled only while a slot is free, concurrently with
    /// the exchanges already in flight.
    pub async fn pool_stream<S, F, R>(&self, requests: S, mut on_fulfilled: F, mut on_rejected: R) -> PoolSummary
    where
        S: Stream<Item = Request>,
        F: FnMut(Response),
        R: FnMut(RequestException),
    {
        let started = Instant::now();
        let limit = self.config.limit();
        let source = requests.fuse();
        tokio::pin!(source);
        let mut exhausted = false;
        let mut in_flight = FuturesUnordered::new();
        let mut summary = PoolSummary::default();

        loop {
            let can_pull = !exhausted && limit.map_or(true, |max| in_flight.len() < max);
            if !can_pull && in_flight.is_empty() {
                break;
            }

            tokio::select! {
                next = source.next(), if can_pull => match next {
                    Some(request) => {
                        in_flight.push(self.dispatch(request));
                        summary.record_dispatch(in_flight.len());
                    }
                    None => exhausted = true,
                },
                Some(outcome) = in_flight.next(), if !in_flight.is_empty() => {
                    self.settle(outcome, &mut summary, &mut on_fulfilled, &mut on_rejected);
                }
                else => break,
            }
        }

        summary.elapsed = started.elapsed();
        self.log_summary(&summary);
        summary
    }

    fn settle<F, R>(&self, outcome: Outcome, summary: &mut PoolSummary, on_fulfilled: &mut F, on_rejected: &mut R)
    where
        F: FnMut(Response),
        R: FnMut(RequestException),
    {
        match outcome {
            Outcome::Fulfilled(response) => {
                summary.fulfilled += 1;
                if self.config.log_each_exchange {
                    debug!(
                        request_id = %response.request().id(),
                        url = %response.request().url(),
                        status = response.status().as_u16(),
                        elapsed_ms = response.elapsed().as_secs_f64() * 1000.0,
                        "Exchange fulfilled"
                    );
                }
                on_fulfilled(response);
            }
            Outcome::Rejected(exception) => {
                summary.rejected += 1;
                if self.config.log_each_exchange {
                    warn!(
                        request_id = %exception.request().id(),
                        url = %exception.request().url(),
                        kind = %exception.reason().kind(),
                        error = %exception.reason(),
                        "Exchange rejected"
                    );
                }
                on_rejected(exception);
            }
        }
    }

    #[allow(clippy::unused_self)]
    fn log_summary(&self, summary: &PoolSummary) {
        if summary.dispatched > 0 {
            info!(
                dispatched = summary.dispatched,
                fulfilled = summary.fulfilled,
                rejected = summary.rejected,
                peak_in_flight = summary.peak_in_flight,
                duration_ms = summary.elapsed.as_secs_f64() * 1000.0,
                "Pool settled"
            );
        }
    }
}
