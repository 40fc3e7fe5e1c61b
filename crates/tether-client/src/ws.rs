//! WebSocket transport.
//!
//! Frames are JSON text messages `{"event": <name>, "data": <payload>}`. The
//! access token travels in the `Authorization` header of the upgrade request,
//! so an expired token surfaces as an HTTP 401 on the handshake.
//!
//! The stream half runs its own keepalive: a ping after every quiet
//! `ping_interval`, and a [`DisconnectReason::PingTimeout`] if nothing comes
//! back within `ping_timeout`.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, stream::SplitStream};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core::{
    ConnectError, ConnectErrorCode, DisconnectReason, OutboundMessage, SocketEvent, SocketSink,
    SocketStream, Transport, TransportError,
};
use tokio::{
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        self, Message,
        client::IntoClientRequest,
        http::{HeaderValue, StatusCode, header::AUTHORIZATION},
        protocol::CloseFrame,
    },
};
use tracing::{debug, trace};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Keepalive timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Quiet period after which a ping is sent.
    pub ping_interval: Duration,
    /// Time allowed for any frame to arrive after a ping.
    pub ping_timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self { ping_interval: Duration::from_secs(25), ping_timeout: Duration::from_secs(20) }
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// [`Transport`] over `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WsTransport {
    keepalive: KeepaliveConfig,
}

impl WsTransport {
    /// Transport with default keepalive timing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override keepalive timing.
    #[must_use]
    pub fn with_keepalive(mut self, keepalive: KeepaliveConfig) -> Self {
        self.keepalive = keepalive;
        self
    }
}

#[async_trait]
impl Transport for WsTransport {
    type Sink = WsSink;
    type Stream = WsStream;

    async fn open(&self, url: &str, access_token: &str) -> Result<(WsSink, WsStream), ConnectError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ConnectError::new(ConnectErrorCode::Protocol, e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .map_err(|e| ConnectError::new(ConnectErrorCode::Protocol, e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (socket, _response) = connect_async(request).await.map_err(classify)?;
        debug!(url, "websocket open");

        let (mut write, read) = socket.split();
        let (outbound, mut queue) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(error) = write.send(message).await {
                    debug!(%error, "websocket write failed");
                    return;
                }
                if closing {
                    break;
                }
            }
            let _ = write.close().await;
        });

        let stream = WsStream {
            read,
            outbound: outbound.clone(),
            keepalive: self.keepalive,
            next_ping: Instant::now() + self.keepalive.ping_interval,
            ping_sent: None,
        };
        Ok((WsSink { outbound, writer }, stream))
    }
}

/// Map a handshake failure onto a [`ConnectError`].
fn classify(error: tungstenite::Error) -> ConnectError {
    match &error {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            let body = response
                .body()
                .as_deref()
                .map(String::from_utf8_lossy)
                .unwrap_or_default();
            let code = match status {
                StatusCode::UNAUTHORIZED => ConnectErrorCode::Unauthorized,
                StatusCode::FORBIDDEN => ConnectErrorCode::Forbidden,
                _ => ConnectErrorCode::Protocol,
            };
            ConnectError::new(code, format!("HTTP {status}: {body}"))
        },
        tungstenite::Error::Io(io) => ConnectError::new(ConnectErrorCode::Refused, io.to_string()),
        _ => ConnectError::from_message(error.to_string()),
    }
}

/// Outbound half of a [`WsTransport`] socket.
#[derive(Debug)]
pub struct WsSink {
    outbound: mpsc::UnboundedSender<Message>,
    writer: JoinHandle<()>,
}

impl SocketSink for WsSink {
    fn emit(&mut self, message: &OutboundMessage) -> Result<(), TransportError> {
        let envelope = Envelope { event: message.event.clone(), data: message.payload.clone() };
        let text =
            serde_json::to_string(&envelope).map_err(|e| TransportError::Encode(e.to_string()))?;
        self.outbound.send(Message::Text(text)).map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        if self.outbound.send(Message::Close(None)).is_err() {
            self.writer.abort();
        }
    }
}

/// Inbound half of a [`WsTransport`] socket.
pub struct WsStream {
    read: SplitStream<Socket>,
    outbound: mpsc::UnboundedSender<Message>,
    keepalive: KeepaliveConfig,
    next_ping: Instant,
    ping_sent: Option<Instant>,
}

impl std::fmt::Debug for WsStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsStream")
            .field("keepalive", &self.keepalive)
            .field("awaiting_pong", &self.ping_sent.is_some())
            .finish_non_exhaustive()
    }
}

impl WsStream {
    fn deadline(&self) -> Instant {
        self.ping_sent.map_or(self.next_ping, |sent| sent + self.keepalive.ping_timeout)
    }

    fn mark_alive(&mut self) {
        self.ping_sent = None;
        self.next_ping = Instant::now() + self.keepalive.ping_interval;
    }
}

#[async_trait]
impl SocketStream for WsStream {
    async fn recv(&mut self) -> SocketEvent {
        loop {
            let deadline = self.deadline();
            tokio::select! {
                frame = self.read.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(error)) => return SocketEvent::Closed(read_error_reason(&error)),
                        None => return SocketEvent::Closed(DisconnectReason::TransportClose),
                    };
                    self.mark_alive();
                    match frame {
                        Message::Text(text) => match serde_json::from_str::<Envelope>(&text) {
                            Ok(envelope) => {
                                return SocketEvent::Message {
                                    event: envelope.event,
                                    payload: envelope.data,
                                };
                            },
                            Err(error) => debug!(%error, "ignoring malformed frame"),
                        },
                        Message::Close(frame) => return SocketEvent::Closed(close_reason(frame)),
                        other => trace!(kind = frame_kind(&other), "control frame"),
                    }
                },
                () = sleep_until(deadline) => {
                    if self.ping_sent.is_some() {
                        debug!("keepalive timed out");
                        return SocketEvent::Closed(DisconnectReason::PingTimeout);
                    }
                    if self.outbound.send(Message::Ping(Vec::new())).is_err() {
                        return SocketEvent::Closed(DisconnectReason::TransportClose);
                    }
                    self.ping_sent = Some(Instant::now());
                },
            }
        }
    }
}

fn close_reason(frame: Option<CloseFrame<'_>>) -> DisconnectReason {
    match frame {
        Some(frame) if !frame.reason.is_empty() => match DisconnectReason::from_wire(&frame.reason) {
            DisconnectReason::Other(_) => DisconnectReason::ServerDisconnect,
            known => known,
        },
        Some(_) => DisconnectReason::ServerDisconnect,
        None => DisconnectReason::TransportClose,
    }
}

fn read_error_reason(error: &tungstenite::Error) -> DisconnectReason {
    match error {
        tungstenite::Error::ConnectionClosed
        | tungstenite::Error::AlreadyClosed
        | tungstenite::Error::Io(_) => DisconnectReason::TransportClose,
        _ => {
            debug!(%error, "websocket read failed");
            DisconnectReason::TransportError
        },
    }
}

fn frame_kind(message: &Message) -> &'static str {
    match message {
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Binary(_) => "binary",
        _ => "other",
    }
}
