//! End-to-end tests of `Client` over `ReqwestTransport` against a local server.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use super::options;
use super::{Client, Request, ReqwestTransport};
use crate::config::{PoolConfig, TransportConfig};
use crate::crawl::{CollectingItemSink, Crawler};
use crate::errors::TransportErrorKind;
use crate::spider::{empty_stream, stream_of, ParseResult};
use crate::testing::{refused_url, OutcomeRecorder, ScriptedTransport, TestRoute, TestServer};

fn request(url: &str) -> Request {
    Request::get(url, |_| empty_stream()).unwrap()
}

async fn server() -> TestServer {
    TestServer::start([
        ("/a", TestRoute::reply(200, "alpha")),
        ("/b", TestRoute::reply(500, "broken")),
        ("/c", TestRoute::reply(200, "gamma")),
        ("/echo", TestRoute::reply(200, "echo")),
        ("/hop", TestRoute::redirect("/a")),
        ("/hang", TestRoute::Hang),
    ])
    .await
    .unwrap()
}

#[tokio::test]
async fn test_server_errors_are_fulfilled() {
    let server = server().await;
    let client = Client::new().with_concurrency(2);
    let recorder = OutcomeRecorder::new();

    let summary = client
        .pool(
            ["/a", "/b", "/c"].map(|p| request(&server.url(p))),
            recorder.on_fulfilled(),
            recorder.on_rejected(),
        )
        .await;

    assert_eq!(recorder.statuses(), vec![200, 200, 500]);
    assert_eq!(recorder.rejected_count(), 0);
    assert_eq!(summary.fulfilled, 3);

    let broken = recorder
        .fulfilled()
        .into_iter()
        .find(|r| r.is_server_error())
        .unwrap();
    assert_eq!(broken.request().path(), "/b");
    assert_eq!(broken.text(), "broken");
}

#[tokio::test]
async fn test_refused_connection_is_rejected_with_its_request() {
    let target = request(&refused_url("/").unwrap());
    let recorder = OutcomeRecorder::new();

    Client::new()
        .pool([target.clone()], recorder.on_fulfilled(), recorder.on_rejected())
        .await;

    assert_eq!(recorder.fulfilled_count(), 0);
    assert_eq!(recorder.rejected_requests(), vec![target]);
    assert_eq!(recorder.rejected_kinds(), vec![TransportErrorKind::Connect]);
}

#[tokio::test]
async fn test_timeout_option_surfaces_as_rejection() {
    let server = server().await;
    let recorder = OutcomeRecorder::new();
    let hanging = request(&server.url("/hang")).with_option(options::TIMEOUT, 0.2);

    Client::new()
        .pool(
            [hanging, request(&server.url("/a"))],
            recorder.on_fulfilled(),
            recorder.on_rejected(),
        )
        .await;

    assert_eq!(recorder.fulfilled_count(), 1);
    assert_eq!(recorder.rejected_kinds(), vec![TransportErrorKind::Timeout]);
}

#[tokio::test]
async fn test_options_reach_the_wire() {
    let server = server().await;
    let client = Client::with_transport_config(TransportConfig::new().with_user_agent("crawler-test/1"));
    let req = request(&format!("{}?dropped=1", server.url("/echo")))
        .with_header("X-Trace", "t-1")
        .unwrap()
        .with_option(options::QUERY, json!({"q": "rust"}))
        .with_option(options::HEADERS, json!({"Accept": "text/plain"}));

    let response = client.send(req).await.into_result().unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let seen = server.received();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].target, "/echo?q=rust");
    assert_eq!(seen[0].header("x-trace"), Some("t-1"));
    assert_eq!(seen[0].header("accept"), Some("text/plain"));
    assert_eq!(seen[0].header("user-agent"), Some("crawler-test/1"));
}

#[tokio::test]
async fn test_redirects_follow_option() {
    let server = server().await;
    let client = Client::new();

    let followed = client.send(request(&server.url("/hop"))).await.into_result().unwrap();
    assert_eq!(followed.status().as_u16(), 200);
    assert_eq!(followed.url().path(), "/a");

    let stopped = client
        .send(request(&server.url("/hop")).with_option(options::ALLOW_REDIRECTS, false))
        .await
        .into_result()
        .unwrap();
    assert_eq!(stopped.status().as_u16(), 302);
    assert_eq!(stopped.request().path(), "/hop");
}

#[tokio::test]
async fn test_malformed_options_are_rejections() {
    let server = server().await;
    let dir = tempfile::tempdir().unwrap();
    let bundle = dir.path().join("missing.pem");
    let recorder = OutcomeRecorder::new();

    Client::new()
        .pool(
            [
                request(&server.url("/a")).with_option(options::VERIFY, bundle.display().to_string()),
                request(&server.url("/a")).with_option(options::AUTH, json!(["u", "p", "digest"])),
                request(&server.url("/a")).with_option(options::TIMEOUT, "soon"),
                request(&server.url("/a")).with_option(options::TIMEOUT, 1e30),
            ],
            recorder.on_fulfilled(),
            recorder.on_rejected(),
        )
        .await;

    assert_eq!(recorder.fulfilled_count(), 0);
    assert_eq!(recorder.rejected_kinds(), vec![TransportErrorKind::InvalidOptions; 4]);
    assert!(server.received().is_empty());
}

#[tokio::test]
async fn test_unrepresentable_default_timeout_rejects_every_request() {
    let server = server().await;
    let client = Client::with_transport_config(TransportConfig::new().with_default_timeout(1e30));
    let recorder = OutcomeRecorder::new();

    let summary = client
        .pool(
            [request(&server.url("/a")), request(&server.url("/c"))],
            recorder.on_fulfilled(),
            recorder.on_rejected(),
        )
        .await;

    assert_eq!(summary.rejected, 2);
    assert_eq!(recorder.rejected_kinds(), vec![TransportErrorKind::InvalidOptions; 2]);
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    let transport = Arc::new(ScriptedTransport::new().fallback_delay(Duration::from_millis(20)));
    let client = Client::with_transport(transport.clone())
        .with_config(PoolConfig::new().with_concurrency(3).with_exchange_logging(false));
    let recorder = OutcomeRecorder::new();

    let summary = client
        .pool(
            (0..12).map(|i| request(&format!("https://host.test/{i}"))),
            recorder.on_fulfilled(),
            recorder.on_rejected(),
        )
        .await;

    assert_eq!(recorder.total(), 12);
    assert_eq!(summary.dispatched, 12);
    assert_eq!(transport.peak_in_flight(), 3);
    assert_eq!(summary.peak_in_flight, 3);
}

#[tokio::test]
async fn test_unbounded_pool_sends_everything_at_once() {
    let transport = Arc::new(ScriptedTransport::new().fallback_delay(Duration::from_millis(20)));
    let client = Client::with_transport(transport.clone());

    let summary = client
        .pool((0..8).map(|i| request(&format!("https://host.test/{i}"))), |_| {}, |_| {})
        .await;

    assert!(summary.is_complete());
    assert_eq!(transport.peak_in_flight(), 8);
}

#[tokio::test]
async fn test_completion_order_not_submission_order() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .delay("/slow", Duration::from_millis(80))
            .delay("/fast", Duration::from_millis(5)),
    );
    let client = Client::with_transport(transport);
    let mut order = Vec::new();

    client
        .pool(
            [request("https://host.test/slow"), request("https://host.test/fast")],
            |r| order.push(r.request().path().to_string()),
            |_| {},
        )
        .await;

    assert_eq!(order, vec!["/fast".to_string(), "/slow".to_string()]);
}

#[tokio::test]
async fn test_crawl_against_live_server() {
    let server = TestServer::start([
        ("/", TestRoute::reply(200, "home")),
        ("/d", TestRoute::reply(200, "detail")),
    ])
    .await
    .unwrap();
    let detail = server.url("/d");
    let seed = Request::get(&server.url("/"), move |_| {
        let follow = Request::get(&detail, |res| {
            stream_of(vec![ParseResult::item_from([("body", res.text().to_string())])])
        })
        .unwrap();
        stream_of(vec![
            ParseResult::from(follow),
            ParseResult::item_from([("title", "x")]),
        ])
    })
    .unwrap();
    let sink = Arc::new(CollectingItemSink::new());

    let report = Crawler::new(Client::with_transport(Arc::new(ReqwestTransport::new())), sink.clone())
        .run([seed])
        .await
        .unwrap();

    assert_eq!(report.rounds, 2);
    assert_eq!(report.items, 2);
    assert_eq!(sink.items_with("title")[0].get("title"), Some(&json!("x")));
    assert_eq!(sink.items_with("body")[0].get("body"), Some(&json!("detail")));
}
