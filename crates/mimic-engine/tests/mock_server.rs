//! Integration tests for the mock server
//!
//! These tests run an in-process engine on a free port and drive it over
//! HTTP and WebSocket.

use futures::{SinkExt, StreamExt};
use mimic_engine::config::{MockDefinition, MockReply, MockedServerConfig, ENABLE_CORS_PARAM};
use async_trait::async_trait;
use mimic_engine::listener::MockRequest;
use mimic_engine::pipeline::DISPATCH_VERBS;
use mimic_engine::services::{
    LiveLogEvent, LiveLoggingHandler, MockResolver, Resolution, ResolverFault,
};
use mimic_engine::MockServerEngine;
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;

const TRACE_ID_HEADER: &str = "X-Mimic-Trace-Id";
const PROXY_INTERCEPT_HEADER: &str = "X-Mimic-Proxy-Intercept";

fn free_port() -> u16 {
    port_check::free_local_port().expect("no free port available")
}

fn server_config(port: u16) -> MockedServerConfig {
    MockedServerConfig {
        min_threads: 2,
        max_threads: 16,
        timeout_millis: 5_000,
        ..MockedServerConfig::new(port)
    }
}

fn hello_mock() -> MockDefinition {
    MockDefinition {
        id: Some("hello".to_string()),
        method: "GET".to_string(),
        path: "/hello".to_string(),
        context_path: None,
        responses: vec![
            MockReply {
                status: 200,
                headers: BTreeMap::from([("Content-Type".to_string(), "text/plain".to_string())]),
                body: Some("hello".to_string()),
            },
            MockReply {
                status: 202,
                headers: BTreeMap::new(),
                body: Some("again".to_string()),
            },
        ],
    }
}

struct TestServer {
    engine: MockServerEngine,
    live_log: Arc<LiveLoggingHandler>,
    base_url: String,
    config: MockedServerConfig,
}

impl TestServer {
    async fn start(config: MockedServerConfig) -> Self {
        let live_log = Arc::new(LiveLoggingHandler::new());
        let engine = MockServerEngine::builder()
            .mocks(vec![hello_mock()])
            .traffic_sink(live_log.clone())
            .build();
        engine.start(&config).await.expect("mock server failed to start");
        Self {
            engine,
            live_log,
            base_url: format!("http://127.0.0.1:{}", config.port),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn stop(self) {
        self.engine.shutdown().await.expect("mock server failed to stop");
    }
}

fn client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_unmatched_path_is_404_for_every_verb() {
    let server = TestServer::start(server_config(free_port())).await;
    let client = client();

    for method in DISPATCH_VERBS {
        let resp = client
            .request(method.clone(), server.url("/nothing/here"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404, "{method} should be 404");
        assert!(resp.bytes().await.unwrap().is_empty());
    }

    server.stop().await;
}

#[tokio::test]
async fn test_matching_mock_cycles_responses() {
    let server = TestServer::start(server_config(free_port())).await;
    let client = client();

    let first = client.get(server.url("/hello")).send().await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(first.headers()["content-type"], "text/plain");
    assert_eq!(first.text().await.unwrap(), "hello");

    let second = client.get(server.url("/hello")).send().await.unwrap();
    assert_eq!(second.status(), 202);
    assert_eq!(second.text().await.unwrap(), "again");

    server.stop().await;
}

#[tokio::test]
async fn test_upgrade_probe_answers_200_without_body() {
    let server = TestServer::start(server_config(free_port())).await;

    let resp = client()
        .get(server.url("/hello"))
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.bytes().await.unwrap().is_empty());

    // The probe did not consume a mock response.
    let next = client().get(server.url("/hello")).send().await.unwrap();
    assert_eq!(next.text().await.unwrap(), "hello");

    server.stop().await;
}

#[tokio::test]
async fn test_cors_enabled() {
    let config = server_config(free_port()).with_property(ENABLE_CORS_PARAM, "TRUE");
    let server = TestServer::start(config).await;
    let client = client();

    let preflight = client
        .request(Method::OPTIONS, server.url("/x"))
        .header("Access-Control-Request-Headers", "X-Foo")
        .header("Access-Control-Request-Method", "PUT")
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), 200);
    assert_eq!(preflight.headers()["access-control-allow-headers"], "X-Foo");
    assert_eq!(preflight.headers()["access-control-allow-methods"], "PUT");
    assert_eq!(preflight.headers()["access-control-allow-origin"], "*");
    assert_eq!(preflight.text().await.unwrap(), "OK");

    for method in DISPATCH_VERBS {
        let missing = client
            .request(method.clone(), server.url("/missing"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404, "{method}");
        assert_eq!(missing.headers()["access-control-allow-origin"], "*", "{method}");
    }

    let matched = client.get(server.url("/hello")).send().await.unwrap();
    assert_eq!(matched.status(), 200);
    assert_eq!(matched.headers()["access-control-allow-origin"], "*");
    assert_eq!(matched.text().await.unwrap(), "hello");

    server.stop().await;
}

#[tokio::test]
async fn test_cors_disabled() {
    let server = TestServer::start(server_config(free_port())).await;
    let client = client();

    let preflight = client
        .request(Method::OPTIONS, server.url("/x"))
        .header("Access-Control-Request-Headers", "X-Foo")
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), 404);
    assert!(preflight.headers().get("access-control-allow-headers").is_none());

    let hello = client.get(server.url("/hello")).send().await.unwrap();
    assert!(hello.headers().get("access-control-allow-origin").is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_live_log_inbound_before_outbound() {
    let server = TestServer::start(server_config(free_port())).await;
    let mut events = server.live_log.subscribe();

    let resp = client()
        .post(server.url("/orders"))
        .body("{\"id\":1}")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let trace_id = resp.headers()[TRACE_ID_HEADER].to_str().unwrap().to_string();

    let inbound = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    let outbound = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();

    match (inbound.as_ref(), outbound.as_ref()) {
        (LiveLogEvent::Inbound(inbound), LiveLogEvent::Outbound(outbound)) => {
            assert_eq!(inbound.id, trace_id);
            assert_eq!(inbound.method, "POST");
            assert_eq!(inbound.url, "/orders");
            assert_eq!(inbound.body.as_deref(), Some("{\"id\":1}"));
            assert_eq!(outbound.id, trace_id);
            assert_eq!(outbound.status, 404);
        }
        other => panic!("unexpected event order: {:?}", other),
    }

    server.stop().await;
}

#[tokio::test]
async fn test_marked_request_is_not_logged() {
    let server = TestServer::start(server_config(free_port())).await;
    let mut events = server.live_log.subscribe();

    let resp = client()
        .get(server.url("/hello"))
        .header(PROXY_INTERCEPT_HEADER, "1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().get(TRACE_ID_HEADER).is_none());

    let next = tokio::time::timeout(Duration::from_millis(200), events.recv()).await;
    assert!(next.is_err(), "no live-log event expected");

    server.stop().await;
}

#[tokio::test]
async fn test_websocket_echo_and_session_reset() {
    let server = TestServer::start(server_config(free_port())).await;
    let url = format!("ws://127.0.0.1:{}/chat", server.config.port);

    let (mut ws, response) = tokio_tungstenite::connect_async(url).await.unwrap();
    assert_eq!(response.status(), 101);
    // The session is tracked as soon as the handshake is answered.
    assert_eq!(server.engine.web_socket_sessions().len(), 1);

    ws.send(Message::Text("ping".into())).await.unwrap();
    let echoed = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(echoed, Message::Text("ping".into()));

    // Clearing the state closes the session from the server side.
    server.engine.clear_state();
    let closing = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap();
    assert!(matches!(closing, Some(Ok(Message::Close(_))) | None));

    server.stop().await;
}

#[tokio::test]
async fn test_reset_right_after_handshake_closes_session() {
    let server = TestServer::start(server_config(free_port())).await;
    let url = format!("ws://127.0.0.1:{}/chat", server.config.port);

    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    server.engine.clear_state();
    assert!(server.engine.web_socket_sessions().is_empty());

    let closing = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap();
    assert!(matches!(closing, Some(Ok(Message::Close(_))) | None));

    server.stop().await;
}

#[tokio::test]
async fn test_restart_on_same_port_serves_again() {
    let config = server_config(free_port());
    let server = TestServer::start(config.clone()).await;
    let client = client();

    let resp = client.get(server.url("/hello")).send().await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "hello");

    server.engine.shutdown().await.unwrap();
    assert!(client.get(server.url("/hello")).send().await.is_err());

    server.engine.start(&config).await.unwrap();
    // Ordering counters were reset, so the sequence starts over.
    let resp = client.get(server.url("/hello")).send().await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "hello");

    server.stop().await;
}

/// Fails on `/boom`, stalls on `/slow`, finds nothing elsewhere.
struct TroubledResolver;

#[async_trait]
impl MockResolver for TroubledResolver {
    async fn resolve(&self, request: &MockRequest) -> Result<Resolution, ResolverFault> {
        match request.path.as_str() {
            "/boom" => Err(ResolverFault::new("store offline")),
            "/slow" => {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(Resolution::NotFound)
            }
            _ => Ok(Resolution::NotFound),
        }
    }
}

async fn next_event(events: &mut broadcast::Receiver<Arc<LiveLogEvent>>) -> Arc<LiveLogEvent> {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_fault_and_timeout_answers_are_filtered_and_logged() {
    let config = MockedServerConfig {
        timeout_millis: 300,
        ..server_config(free_port())
    }
    .with_property(ENABLE_CORS_PARAM, "true");
    let live_log = Arc::new(LiveLoggingHandler::new());
    let engine = MockServerEngine::builder()
        .resolver(Arc::new(TroubledResolver))
        .traffic_sink(live_log.clone())
        .build();
    engine.start(&config).await.unwrap();
    let mut events = live_log.subscribe();
    let client = client();

    for (path, status) in [("/boom", 500u16), ("/slow", 503)] {
        let resp = client
            .get(format!("http://127.0.0.1:{}{}", config.port, path))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), status, "{path}");
        assert_eq!(resp.headers()["access-control-allow-origin"], "*", "{path}");
        let trace_id = resp.headers()[TRACE_ID_HEADER].to_str().unwrap().to_string();
        assert!(resp.bytes().await.unwrap().is_empty());

        let inbound = next_event(&mut events).await;
        let outbound = next_event(&mut events).await;
        match (inbound.as_ref(), outbound.as_ref()) {
            (LiveLogEvent::Inbound(inbound), LiveLogEvent::Outbound(outbound)) => {
                assert_eq!(inbound.id, trace_id);
                assert_eq!(outbound.id, trace_id);
                assert_eq!(outbound.status, status);
            }
            other => panic!("unexpected events for {path}: {:?}", other),
        }
    }

    engine.shutdown().await.unwrap();
}
