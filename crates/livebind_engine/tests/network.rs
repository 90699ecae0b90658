//! `NetworkConnector` against real sockets: wiremock for HTTP and SSE, an
//! in-test tokio-tungstenite server for WebSocket.

use futures::{SinkExt, StreamExt};
use livebind_core::{Document, Element, Format, Payload, SyncError};
use livebind_engine::{Connector, EngineConfig, LiveBind, NetworkConnector, TargetState};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn connector() -> NetworkConnector {
    NetworkConnector::new(Duration::from_secs(2), Duration::from_secs(2)).unwrap()
}

/// Serves each accepted WebSocket connection the given text frames, then
/// closes it.
async fn websocket_server(frames: Vec<&'static str>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let frames = frames.clone();
            tokio::spawn(async move {
                let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
                for frame in frames {
                    socket.send(Message::Text(frame.into())).await.unwrap();
                }
                let _ = socket.close(None).await;
            });
        }
    });
    format!("http://{addr}/ws")
}

async fn wait_for(element: &Element, expected: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while element.inner_html() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out, content is {:?}", element.inner_html()));
}

#[tokio::test]
async fn fetch_decodes_by_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"v": 1})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"v\":2}"))
        .mount(&server)
        .await;

    let connector = connector();
    let json = connector
        .fetch(&format!("{}/data.json", server.uri()), Format::Auto)
        .await
        .unwrap();
    assert_eq!(json, Payload::Json(json!({"v": 1})));

    let url = format!("{}/plain", server.uri());
    let text = connector.fetch(&url, Format::Auto).await.unwrap();
    assert_eq!(text, Payload::Text("{\"v\":2}".into()));

    let forced = connector.fetch(&url, Format::Json).await.unwrap();
    assert_eq!(forced, Payload::Json(json!({"v": 2})));
}

#[tokio::test]
async fn fetch_maps_error_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = connector()
        .fetch(&format!("{}/boom", server.uri()), Format::Auto)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::HttpStatus { status: 500, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn fetch_reports_unreachable_hosts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = connector()
        .fetch(&format!("http://{addr}/gone"), Format::Auto)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Transport { .. }));
}

#[tokio::test]
async fn sse_yields_unnamed_event_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stream"))
        .and(header("accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            ": hello\n\nevent: ping\ndata: heartbeat\n\ndata: {\"v\":1}\n\ndata: line one\ndata: line two\n\n",
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let stream = connector()
        .open_sse(&format!("{}/stream", server.uri()))
        .await
        .unwrap();
    let messages: Vec<String> = stream.map(Result::unwrap).collect().await;
    assert_eq!(messages, vec!["{\"v\":1}", "line one\nline two"]);
}

#[tokio::test]
async fn sse_rejects_error_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = connector()
        .open_sse(&format!("{}/stream", server.uri()))
        .await;
    assert!(matches!(result, Err(SyncError::HttpStatus { status: 404, .. })));
}

#[tokio::test]
async fn websocket_yields_text_frames() {
    let url = websocket_server(vec!["first", "{\"v\":2}"]).await;

    let stream = connector().open_websocket(&url).await.unwrap();
    let messages: Vec<String> = stream.filter_map(|m| async move { m.ok() }).collect().await;
    assert_eq!(messages, vec!["first", "{\"v\":2}"]);
}

#[tokio::test]
async fn polling_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let config = EngineConfig::new().with_base_url(server.uri().parse().unwrap());
    let live = LiveBind::new(Arc::new(Document::new()), config).unwrap();
    let element = live.document().append(
        Element::new("div")
            .with_attribute("sync", "true")
            .with_attribute("endpoint", "/status.json")
            .with_attribute("format", "json"),
    );

    let handles = live.start(None);
    wait_for(&element, "<pre>{\n  &quot;ok&quot;: true\n}</pre>").await;
    assert_eq!(handles[0].state(), TargetState::Connected);
    live.stop();
}

#[tokio::test]
async fn websocket_end_to_end() {
    let url = websocket_server(vec!["hello"]).await;

    let live = LiveBind::new(Arc::new(Document::new()), EngineConfig::new()).unwrap();
    let element = live.document().append(
        Element::new("div")
            .with_attribute("sync", "true")
            .with_attribute("endpoint", url)
            .with_attribute("mode", "websocket"),
    );

    live.start(None);
    wait_for(&element, "hello").await;
    live.stop();
}
