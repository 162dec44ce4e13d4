//! Transport failures tied to the request that suffered them.

use std::collections::HashMap;

use serde_json::json;
use thiserror::Error;

use super::request::Request;
use crate::errors::TransportError;

/// An exchange that failed without producing any HTTP response.
#[derive(Debug, Error)]
#[error("An exception occurred while sending a request")]
pub struct RequestException {
    request: Request,
    #[source]
    reason: TransportError,
}

impl RequestException {
    pub(crate) const fn new(request: Request, reason: TransportError) -> Self {
        Self { request, reason }
    }

    /// The request whose exchange failed.
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// The underlying transport failure.
    #[must_use]
    pub const fn reason(&self) -> &TransportError {
        &self.reason
    }

    /// Splits into the request and the failure.
    #[must_use]
    pub fn into_parts(self) -> (Request, TransportError) {
        (self.request, self.reason)
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), json!("RequestException"));
        map.insert("message".to_string(), json!(self.to_string()));
        map.insert("request_id".to_string(), json!(self.request.id().to_string()));
        map.insert("method".to_string(), json!(self.request.method().as_str()));
        map.insert("url".to_string(), json!(self.request.uri()));
        map.insert("reason".to_string(), json!(self.reason.to_dict()));
        map
    }
}
