//! Network access used by transport adapters.
//!
//! The [`Connector`] trait abstracts the network layer so adapters can run
//! against real endpoints ([`NetworkConnector`]) or scripted ones
//! ([`MockConnector`]) in tests.

use crate::sse::{SseDecoder, SseEvent};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use livebind_core::{Format, Payload, SyncError, SyncResult};
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Raw inbound messages of a persistent connection.
///
/// The stream ends when the remote side closes the connection.
pub type MessageStream = BoxStream<'static, SyncResult<String>>;

/// Network operations needed by the adapters.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Performs one GET and decodes the body.
    async fn fetch(&self, url: &str, format: Format) -> SyncResult<Payload>;

    /// Opens a Server-Sent Events stream, yielding each event's data.
    async fn open_sse(&self, url: &str) -> SyncResult<MessageStream>;

    /// Opens a WebSocket, yielding each text frame.
    async fn open_websocket(&self, url: &str) -> SyncResult<MessageStream>;
}

/// Rewrites an `http(s)` endpoint to the matching `ws(s)` scheme.
pub fn websocket_url(endpoint: &str) -> String {
    let lower = endpoint.to_ascii_lowercase();
    if lower.starts_with("https://") {
        format!("wss://{}", &endpoint["https://".len()..])
    } else if lower.starts_with("http://") {
        format!("ws://{}", &endpoint["http://".len()..])
    } else {
        endpoint.to_owned()
    }
}

fn transport_error(err: reqwest::Error) -> SyncError {
    if err.is_builder() {
        SyncError::transport_fatal(err.to_string())
    } else {
        SyncError::transport_retryable(err.to_string())
    }
}

fn parse_endpoint(url: &str) -> SyncResult<Url> {
    Url::parse(url).map_err(|e| SyncError::InvalidUrl {
        url: url.to_owned(),
        reason: e.to_string(),
    })
}

fn status_error(status: reqwest::StatusCode) -> SyncError {
    SyncError::HttpStatus {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or_default().to_owned(),
    }
}

/// Connector backed by `reqwest` and `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct NetworkConnector {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl NetworkConnector {
    /// Creates a connector.
    ///
    /// `request_timeout` bounds one-shot fetches only; streams stay open
    /// until the server closes them.
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| SyncError::transport_fatal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            request_timeout,
        })
    }
}

#[async_trait]
impl Connector for NetworkConnector {
    async fn fetch(&self, url: &str, format: Format) -> SyncResult<Payload> {
        let response = self
            .client
            .get(parse_endpoint(url)?)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.map_err(transport_error)?;
        Ok(Payload::from_http_body(body, content_type.as_deref(), format))
    }

    async fn open_sse(&self, url: &str) -> SyncResult<MessageStream> {
        let response = self
            .client
            .get(parse_endpoint(url)?)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        let bytes = response.bytes_stream().boxed();
        let events = stream::unfold(
            (bytes, SseDecoder::new(), VecDeque::new()),
            |(mut bytes, mut decoder, mut ready)| async move {
                loop {
                    if let Some(data) = ready.pop_front() {
                        return Some((Ok(data), (bytes, decoder, ready)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            ready.extend(
                                decoder
                                    .feed(&chunk)
                                    .into_iter()
                                    .filter(SseEvent::is_message)
                                    .map(|e| e.data),
                            );
                        }
                        Some(Err(err)) => {
                            return Some((Err(transport_error(err)), (bytes, decoder, ready)));
                        }
                        None => return None,
                    }
                }
            },
        );
        Ok(events.boxed())
    }

    async fn open_websocket(&self, url: &str) -> SyncResult<MessageStream> {
        let url = parse_endpoint(&websocket_url(url))?;
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| SyncError::transport_retryable(format!("websocket connect: {e}")))?;

        let frames = socket.filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => String::from_utf8(bytes.to_vec()).ok().map(Ok),
                Ok(_) => None,
                Err(err) => Some(Err(SyncError::transport_retryable(format!(
                    "websocket: {err}"
                )))),
            }
        });
        Ok(frames.boxed())
    }
}

/// Scripted HTTP response for [`MockConnector`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockResponse {
    /// A successfully decoded body.
    Payload(Payload),
    /// A non-success status.
    Status(u16),
    /// A connection failure.
    Fail(String),
}

/// Scripted connection for [`MockConnector`].
pub enum MockStream {
    /// Delivers the messages, then the remote side closes.
    Closing(Vec<String>),
    /// Delivers the messages and stays open.
    Open(Vec<String>),
    /// Delivers the messages, then fails with a transport error.
    Failing(Vec<String>, String),
    /// The connection attempt itself fails.
    Refused(String),
    /// The connection attempt fails in a way no retry can fix.
    Rejected(String),
    /// Messages are pushed by the test through a channel.
    Channel(futures::channel::mpsc::UnboundedReceiver<SyncResult<String>>),
}

/// A record of one call made to a [`MockConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Requested url.
    pub url: String,
    /// When the call started.
    pub at: Instant,
}

/// A scripted connector for testing.
///
/// Fetch responses are consumed in order per url; the last one repeats.
/// Stream scripts are consumed one per connection attempt; once exhausted,
/// further attempts are refused.
#[derive(Default)]
pub struct MockConnector {
    responses: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    streams: Mutex<HashMap<String, VecDeque<MockStream>>>,
    fetches: Mutex<Vec<MockCall>>,
    connects: Mutex<Vec<MockCall>>,
    fetch_delay: Mutex<Option<Duration>>,
}

impl MockConnector {
    /// Creates an empty mock connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a fetch response for `url`.
    pub fn push_response(&self, url: impl Into<String>, response: MockResponse) {
        self.responses
            .lock()
            .entry(url.into())
            .or_default()
            .push_back(response);
    }

    /// Queues a JSON or text payload for `url`.
    pub fn push_payload(&self, url: impl Into<String>, payload: impl Into<Payload>) {
        self.push_response(url, MockResponse::Payload(payload.into()));
    }

    /// Queues a stream script for `url`.
    pub fn push_stream(&self, url: impl Into<String>, stream: MockStream) {
        self.streams
            .lock()
            .entry(url.into())
            .or_default()
            .push_back(stream);
    }

    /// Queues a channel-driven stream for `url` and returns its sender.
    pub fn push_channel(
        &self,
        url: impl Into<String>,
    ) -> futures::channel::mpsc::UnboundedSender<SyncResult<String>> {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        self.push_stream(url, MockStream::Channel(rx));
        tx
    }

    /// Makes every fetch take `delay` before answering.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock() = Some(delay);
    }

    /// Fetch calls made so far.
    pub fn fetches(&self) -> Vec<MockCall> {
        self.fetches.lock().clone()
    }

    /// Connection attempts made so far (SSE and WebSocket).
    pub fn connects(&self) -> Vec<MockCall> {
        self.connects.lock().clone()
    }

    fn next_response(&self, url: &str) -> Option<MockResponse> {
        let mut responses = self.responses.lock();
        let queue = responses.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn open(&self, url: &str) -> SyncResult<MessageStream> {
        self.connects.lock().push(MockCall {
            url: url.to_owned(),
            at: Instant::now(),
        });
        let script = self
            .streams
            .lock()
            .get_mut(url)
            .and_then(VecDeque::pop_front);

        let messages = |msgs: Vec<String>| stream::iter(msgs.into_iter().map(Ok));
        match script {
            Some(MockStream::Closing(msgs)) => Ok(messages(msgs).boxed()),
            Some(MockStream::Open(msgs)) => Ok(messages(msgs).chain(stream::pending()).boxed()),
            Some(MockStream::Failing(msgs, reason)) => Ok(messages(msgs)
                .chain(stream::once(async move {
                    Err(SyncError::transport_retryable(reason))
                }))
                .boxed()),
            Some(MockStream::Channel(rx)) => Ok(rx.boxed()),
            Some(MockStream::Refused(reason)) => Err(SyncError::transport_retryable(reason)),
            Some(MockStream::Rejected(reason)) => Err(SyncError::transport_fatal(reason)),
            None => Err(SyncError::transport_retryable(format!(
                "connection refused: {url}"
            ))),
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn fetch(&self, url: &str, _format: Format) -> SyncResult<Payload> {
        self.fetches.lock().push(MockCall {
            url: url.to_owned(),
            at: Instant::now(),
        });
        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.next_response(url) {
            Some(MockResponse::Payload(payload)) => Ok(payload),
            Some(MockResponse::Status(status)) => Err(SyncError::HttpStatus {
                status,
                reason: String::new(),
            }),
            Some(MockResponse::Fail(reason)) => Err(SyncError::transport_retryable(reason)),
            None => Err(SyncError::transport_retryable(format!(
                "no mock response set for {url}"
            ))),
        }
    }

    async fn open_sse(&self, url: &str) -> SyncResult<MessageStream> {
        self.open(url)
    }

    async fn open_websocket(&self, url: &str) -> SyncResult<MessageStream> {
        self.open(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn websocket_url_rewrites_http_schemes() {
        assert_eq!(websocket_url("http://a.test/ws"), "ws://a.test/ws");
        assert_eq!(websocket_url("HTTPS://a.test/ws"), "wss://a.test/ws");
        assert_eq!(websocket_url("wss://a.test/ws"), "wss://a.test/ws");
    }

    #[tokio::test]
    async fn mock_responses_repeat_last() {
        let mock = MockConnector::new();
        mock.push_payload("http://a.test/v.json", json!({"v": 1}));
        mock.push_payload("http://a.test/v.json", json!({"v": 2}));

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(mock.fetch("http://a.test/v.json", Format::Auto).await.unwrap());
        }
        assert_eq!(
            seen,
            vec![
                Payload::Json(json!({"v": 1})),
                Payload::Json(json!({"v": 2})),
                Payload::Json(json!({"v": 2})),
            ]
        );
        assert_eq!(mock.fetches().len(), 3);
    }

    #[tokio::test]
    async fn mock_without_script_fails() {
        let mock = MockConnector::new();
        assert!(mock.fetch("http://a.test/x", Format::Auto).await.is_err());
        assert!(mock.open_websocket("ws://a.test/x").await.is_err());
        assert_eq!(mock.connects().len(), 1);
    }

    #[tokio::test]
    async fn mock_streams_follow_script() {
        let mock = MockConnector::new();
        mock.push_stream(
            "ws://a.test/x",
            MockStream::Failing(vec!["one".into()], "reset".into()),
        );

        let mut stream = mock.open_websocket("ws://a.test/x").await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "one");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }
}
