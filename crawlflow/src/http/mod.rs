//! HTTP exchange types and the concurrent request pool.
//!
//! - [`Request`]: immutable description of one exchange plus its parse callback
//! - [`Response`]: a completed exchange, any status
//! - [`RequestException`]: an exchange that produced no response
//! - [`Transport`]: the seam that performs exchanges ([`ReqwestTransport`])
//! - [`Client`]: single sends and bounded concurrent pools

mod client;
mod exception;
mod headers;
pub mod options;
mod request;
mod response;
mod transport;

#[cfg(test)]
mod integration_tests;

pub use client::{Client, Outcome, PoolSummary};
pub use exception::RequestException;
pub use headers::HeaderSet;
pub use options::RequestOptions;
pub use request::{ParseCallback, Request};
pub use response::{RawResponse, Response};
pub use transport::{ReqwestTransport, Transport};

#[cfg(test)]
pub(crate) use transport::MockTransport;
