//! Realtime transport abstraction.
//!
//! Abstracts over event-channel transports (WebSocket in production, scripted
//! in-memory sockets in tests). Opening a socket completes only once the
//! server has acknowledged the connection, so a successful `open` is the
//! "connected" signal.
//!
//! A socket is split into a [`SocketSink`] kept by the runtime for outbound
//! emits and a [`SocketStream`] drained by a per-socket reader task. Dropping
//! or aborting that reader detaches every listener of the socket.

use async_trait::async_trait;

use crate::{
    dispatch::OutboundMessage,
    error::{ConnectError, DisconnectReason, TransportError},
};

/// Event read from an open socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// Named event with its payload, exactly as received.
    Message {
        /// Event name.
        event: String,
        /// Event payload.
        payload: serde_json::Value,
    },

    /// Socket is gone. No further events follow.
    Closed(DisconnectReason),
}

/// Opens authenticated realtime sockets.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Outbound half of an open socket.
    type Sink: SocketSink;

    /// Inbound half of an open socket.
    type Stream: SocketStream;

    /// Open a socket to `url`, presenting `access_token`.
    ///
    /// Resolves once the server acknowledges the connection. Credential
    /// rejections should carry [`crate::ConnectErrorCode::Unauthorized`] when
    /// the transport can tell; otherwise the message is classified
    /// heuristically.
    async fn open(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<(Self::Sink, Self::Stream), ConnectError>;
}

/// Outbound half of a socket.
pub trait SocketSink: Send + 'static {
    /// Hand a message to the transport. Fire-and-forget: success means the
    /// message was queued, not delivered.
    fn emit(&mut self, message: &OutboundMessage) -> Result<(), TransportError>;

    /// Close the socket. Idempotent.
    fn close(&mut self);
}

/// Inbound half of a socket.
#[async_trait]
pub trait SocketStream: Send + 'static {
    /// Next event. Returns [`SocketEvent::Closed`] exactly once, after which
    /// the stream must not be polled again.
    async fn recv(&mut self) -> SocketEvent;
}
