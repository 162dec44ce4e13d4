//! A scripted in-memory transport.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::{TransportError, TransportErrorKind};
use crate::http::{RawResponse, Request, Transport};

/// What the transport does for a matching request.
#[derive(Debug, Clone)]
pub enum Script {
    /// Reply with a status and body.
    Reply {
        /// Status code.
        status: StatusCode,
        /// Body text.
        body: String,
    },
    /// Fail without a reply.
    Fail {
        /// Failure category.
        kind: TransportErrorKind,
        /// Failure message.
        message: String,
    },
}

impl Script {
    /// A reply with the given status. Invalid codes become 500.
    #[must_use]
    pub fn reply(status: u16, body: impl Into<String>) -> Self {
        Self::Reply {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body: body.into(),
        }
    }

    /// A transport failure.
    #[must_use]
    pub fn fail(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Fail {
            kind,
            message: message.into(),
        }
    }
}

impl Default for Script {
    fn default() -> Self {
        Self::reply(200, "")
    }
}

#[derive(Debug, Clone, Default)]
struct Route {
    script: Script,
    delay: Option<Duration>,
}

/// A [`Transport`] that answers from a script keyed by URL or path.
///
/// Lookup tries the full URL first, then the path. Unmatched requests get
/// the fallback script (an empty 200 unless changed). Every sent request is
/// recorded along with the peak number of concurrent sends.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: HashMap<String, Route>,
    fallback: Route,
    sent: Mutex<Vec<Request>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    /// Creates a transport that answers everything with an empty 200.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a reply for a URL or path.
    #[must_use]
    pub fn reply(self, target: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        self.script(target, Script::reply(status, body))
    }

    /// Scripts a transport failure for a URL or path.
    #[must_use]
    pub fn fail(self, target: impl Into<String>, kind: TransportErrorKind, message: impl Into<String>) -> Self {
        self.script(target, Script::fail(kind, message))
    }

    /// Scripts any outcome for a URL or path.
    #[must_use]
    pub fn script(mut self, target: impl Into<String>, script: Script) -> Self {
        self.routes.entry(target.into()).or_default().script = script;
        self
    }

    /// Delays the outcome for a URL or path.
    #[must_use]
    pub fn delay(mut self, target: impl Into<String>, delay: Duration) -> Self {
        self.routes.entry(target.into()).or_default().delay = Some(delay);
        self
    }

    /// Changes the outcome for unmatched requests.
    #[must_use]
    pub fn fallback(mut self, script: Script) -> Self {
        self.fallback.script = script;
        self
    }

    /// Delays every unmatched request.
    #[must_use]
    pub fn fallback_delay(mut self, delay: Duration) -> Self {
        self.fallback.delay = Some(delay);
        self
    }

    /// Returns every request sent so far, in send order.
    #[must_use]
    pub fn sent(&self) -> Vec<Request> {
        self.sent.lock().clone()
    }

    /// Returns the URLs sent so far, in send order.
    #[must_use]
    pub fn sent_urls(&self) -> Vec<String> {
        self.sent.lock().iter().map(|r| r.uri().to_string()).collect()
    }

    /// Returns the number of sends.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Returns the highest number of sends that were in progress at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn route_for(&self, request: &Request) -> Route {
        self.routes
            .get(request.uri())
            .or_else(|| self.routes.get(request.path()))
            .unwrap_or(&self.fallback)
            .clone()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &Request) -> Result<RawResponse, TransportError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        self.sent.lock().push(request.clone());

        let route = self.route_for(request);
        if let Some(delay) = route.delay {
            tokio::time::sleep(delay).await;
        }

        match route.script {
            Script::Reply { status, body } => Ok(RawResponse::new(status, request.url().clone(), body)),
            Script::Fail { kind, message } => Err(TransportError::new(kind, message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spider::empty_stream;
    use tokio_test::{assert_err, assert_ok, block_on};

    fn request(url: &str) -> Request {
        Request::get(url, |_| empty_stream()).unwrap()
    }

    #[test]
    fn test_lookup_prefers_full_url_then_path() {
        let transport = ScriptedTransport::new()
            .reply("https://a.test/x", 201, "exact")
            .reply("/x", 202, "by path")
            .fail("/down", TransportErrorKind::Connect, "refused");

        let exact = assert_ok!(block_on(transport.send(&request("https://a.test/x"))));
        let by_path = assert_ok!(block_on(transport.send(&request("https://b.test/x"))));
        let fallback = assert_ok!(block_on(transport.send(&request("https://b.test/other"))));
        let failed = assert_err!(block_on(transport.send(&request("https://b.test/down"))));

        assert_eq!(exact.status, StatusCode::CREATED);
        assert_eq!(by_path.body, "by path");
        assert_eq!(fallback.status, StatusCode::OK);
        assert!(failed.is_connect());
        assert_eq!(transport.call_count(), 4);
        assert_eq!(transport.peak_in_flight(), 1);
    }
}
