//! Handlers that record what a pool delivered.

use parking_lot::Mutex;

use crate::errors::TransportErrorKind;
use crate::http::{Request, RequestException, Response};

/// Collects the responses and exceptions handed to `pool` handlers.
///
/// ```rust,ignore
/// let recorder = OutcomeRecorder::new();
/// client.pool(requests, recorder.on_fulfilled(), recorder.on_rejected()).await;
/// assert_eq!(recorder.fulfilled_count(), 3);
/// ```
#[derive(Debug, Default)]
pub struct OutcomeRecorder {
    fulfilled: Mutex<Vec<Response>>,
    rejected: Mutex<Vec<RequestException>>,
}

impl OutcomeRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A fulfilment handler that records into this recorder.
    pub fn on_fulfilled(&self) -> impl FnMut(Response) + '_ {
        move |response| self.fulfilled.lock().push(response)
    }

    /// A rejection handler that records into this recorder.
    pub fn on_rejected(&self) -> impl FnMut(RequestException) + '_ {
        move |exception| self.rejected.lock().push(exception)
    }

    /// Recorded responses, in completion order.
    #[must_use]
    pub fn fulfilled(&self) -> Vec<Response> {
        self.fulfilled.lock().clone()
    }

    /// Number of recorded responses.
    #[must_use]
    pub fn fulfilled_count(&self) -> usize {
        self.fulfilled.lock().len()
    }

    /// Number of recorded exceptions.
    #[must_use]
    pub fn rejected_count(&self) -> usize {
        self.rejected.lock().len()
    }

    /// Status codes of recorded responses, sorted.
    #[must_use]
    pub fn statuses(&self) -> Vec<u16> {
        let mut statuses: Vec<u16> = self.fulfilled.lock().iter().map(|r| r.status().as_u16()).collect();
        statuses.sort_unstable();
        statuses
    }

    /// Requests of recorded exceptions, in completion order.
    #[must_use]
    pub fn rejected_requests(&self) -> Vec<Request> {
        self.rejected.lock().iter().map(|e| e.request().clone()).collect()
    }

    /// Failure kinds of recorded exceptions, in completion order.
    #[must_use]
    pub fn rejected_kinds(&self) -> Vec<TransportErrorKind> {
        self.rejected.lock().iter().map(|e| e.reason().kind()).collect()
    }

    /// Removes and returns the recorded exceptions.
    pub fn take_rejected(&self) -> Vec<RequestException> {
        std::mem::take(&mut *self.rejected.lock())
    }

    /// Total number of handler calls.
    #[must_use]
    pub fn total(&self) -> usize {
        self.fulfilled_count() + self.rejected_count()
    }
}
