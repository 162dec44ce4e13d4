//! Testing utilities for code built on crawlflow.
//!
//! This module provides:
//! - [`ScriptedTransport`], an in-memory transport with canned outcomes
//! - [`TestServer`], a local HTTP/1.1 server for end-to-end tests
//! - [`OutcomeRecorder`], pool handlers that record what they receive

mod recorder;
mod server;
mod transport;

pub use recorder::OutcomeRecorder;
pub use server::{refused_url, ReceivedRequest, TestRoute, TestServer};
pub use transport::{Script, ScriptedTransport};
