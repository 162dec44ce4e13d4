//! A throwaway HTTP/1.1 server for end-to-end transport tests.

use parking_lot::Mutex;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::errors::CrawlflowError;

/// How the server answers one path.
#[derive(Debug, Clone)]
pub enum TestRoute {
    /// A canned reply.
    Reply {
        /// Status code.
        status: u16,
        /// Body text.
        body: String,
        /// Extra headers.
        headers: Vec<(String, String)>,
    },
    /// Accept the request and never answer.
    Hang,
}

impl TestRoute {
    /// A canned reply without extra headers.
    #[must_use]
    pub fn reply(status: u16, body: impl Into<String>) -> Self {
        Self::Reply {
            status,
            body: body.into(),
            headers: Vec::new(),
        }
    }

    /// A `302` pointing at `location`.
    #[must_use]
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::Reply {
            status: 302,
            body: String::new(),
            headers: vec![("Location".to_string(), location.into())],
        }
    }
}

/// One request head as the server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRequest {
    /// Request method.
    pub method: String,
    /// Request target, including any query string.
    pub target: String,
    /// Header lines, names lowercased.
    pub headers: Vec<(String, String)>,
}

impl ReceivedRequest {
    /// The path without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    /// The first value of a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A local server answering from a fixed route table.
///
/// Unknown paths get a `404`. The server stops when dropped.
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Binds to an ephemeral local port and starts serving.
    ///
    /// # Errors
    ///
    /// Returns `CrawlflowError::Io` if the port cannot be bound.
    pub async fn start<I, P>(routes: I) -> Result<Self, CrawlflowError>
    where
        I: IntoIterator<Item = (P, TestRoute)>,
        P: Into<String>,
    {
        let routes: Arc<HashMap<String, TestRoute>> =
            Arc::new(routes.into_iter().map(|(p, r)| (p.into(), r)).collect());
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));

        let log = received.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = routes.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve(stream, &routes, &log).await {
                        trace!(error = %e, "Test server connection ended");
                    }
                });
            }
        });

        Ok(Self { addr, received, handle })
    }

    /// The bound address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// An absolute URL for `path` on this server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Every request head received so far.
    #[must_use]
    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.received.lock().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A URL on a local port with nothing listening, so connects are refused.
///
/// # Errors
///
/// Returns `CrawlflowError::Io` if no port could be reserved.
pub fn refused_url(path: &str) -> Result<String, CrawlflowError> {
    let addr = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?;
    Ok(format!("http://{addr}{path}"))
}

async fn serve(
    stream: TcpStream,
    routes: &HashMap<String, TestRoute>,
    log: &Mutex<Vec<ReceivedRequest>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let mut parts = line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let target = parts.next().unwrap_or("/").to_string();

        let mut headers = Vec::new();
        let mut content_length = 0usize;
        loop {
            let mut header = String::new();
            if reader.read_line(&mut header).await? == 0 {
                return Ok(());
            }
            let header = header.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                let name = name.trim().to_ascii_lowercase();
                let value = value.trim().to_string();
                if name == "content-length" {
                    content_length = value.parse().unwrap_or(0);
                }
                headers.push((name, value));
            }
        }
        if content_length > 0 {
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).await?;
        }

        let request = ReceivedRequest { method, target, headers };
        let route = routes
            .get(request.path())
            .cloned()
            .unwrap_or_else(|| TestRoute::reply(404, "not found"));
        log.lock().push(request);

        match route {
            TestRoute::Hang => {
                std::future::pending::<()>().await;
            }
            TestRoute::Reply { status, body, headers } => {
                let reason = StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown");
                let mut reply = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nContent-Type: text/plain\r\n",
                    body.len()
                );
                for (name, value) in headers {
                    reply.push_str(&format!("{name}: {value}\r\n"));
                }
                reply.push_str("\r\n");
                reply.push_str(&body);
                reader.get_mut().write_all(reply.as_bytes()).await?;
                reader.get_mut().flush().await?;
            }
        }
    }
}
