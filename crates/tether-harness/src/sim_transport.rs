//! Scripted in-memory transport.
//!
//! Each call to [`Transport::open`] consumes the next [`OpenOutcome`] from the
//! script (accepting once the script is empty) and records the token it was
//! given. Accepted opens produce a [`SimSocket`], the server's end of the
//! channel, through which a test pushes events or drops the connection.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tether_core::{
    ConnectError, DisconnectReason, OutboundMessage, SocketEvent, SocketSink, SocketStream,
    Transport, TransportError,
};
use tokio::sync::mpsc;

/// Scripted result of one open.
#[derive(Debug, Clone)]
pub enum OpenOutcome {
    /// Open succeeds.
    Accept,
    /// Open succeeds after a delay.
    AcceptAfter(Duration),
    /// Open fails with this error.
    Reject(ConnectError),
    /// Open never completes.
    Hang,
}

/// One recorded open.
#[derive(Debug, Clone)]
pub struct OpenRecord {
    /// Access token presented.
    pub access_token: String,
    /// Virtual time of the call.
    pub at: tokio::time::Instant,
}

#[derive(Debug, Default)]
struct TransportState {
    script: VecDeque<OpenOutcome>,
    opens: Vec<OpenRecord>,
    sockets: Vec<SimSocket>,
}

/// [`Transport`] double. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<TransportState>>,
}

impl ScriptedTransport {
    /// Transport that accepts every open.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of a future open.
    pub fn script(&self, outcome: OpenOutcome) -> &Self {
        self.state.lock().script.push_back(outcome);
        self
    }

    /// Every open so far, in call order.
    pub fn opens(&self) -> Vec<OpenRecord> {
        self.state.lock().opens.clone()
    }

    /// Number of opens so far.
    pub fn open_count(&self) -> usize {
        self.state.lock().opens.len()
    }

    /// Sockets accepted so far, in order.
    pub fn sockets(&self) -> Vec<SimSocket> {
        self.state.lock().sockets.clone()
    }

    /// Most recently accepted socket.
    pub fn last_socket(&self) -> Option<SimSocket> {
        self.state.lock().sockets.last().cloned()
    }

    /// Accepted sockets the client has not closed.
    pub fn live_sockets(&self) -> usize {
        self.state.lock().sockets.iter().filter(|s| !s.is_closed()).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Sink = SimSink;
    type Stream = SimStream;

    async fn open(&self, _url: &str, access_token: &str) -> Result<(SimSink, SimStream), ConnectError> {
        let outcome = {
            let mut state = self.state.lock();
            state.opens.push(OpenRecord {
                access_token: access_token.to_string(),
                at: tokio::time::Instant::now(),
            });
            state.script.pop_front().unwrap_or(OpenOutcome::Accept)
        };

        match outcome {
            OpenOutcome::Accept => {},
            OpenOutcome::AcceptAfter(delay) => tokio::time::sleep(delay).await,
            OpenOutcome::Reject(error) => return Err(error),
            OpenOutcome::Hang => std::future::pending::<()>().await,
        }

        let (events, inbox) = mpsc::unbounded_channel();
        let socket = SimSocket {
            events,
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };
        self.state.lock().sockets.push(socket.clone());

        let sink = SimSink { sent: Arc::clone(&socket.sent), closed: Arc::clone(&socket.closed) };
        Ok((sink, SimStream { inbox }))
    }
}

/// Server's end of an accepted socket.
#[derive(Debug, Clone)]
pub struct SimSocket {
    events: mpsc::UnboundedSender<SocketEvent>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    closed: Arc<AtomicBool>,
}

impl SimSocket {
    /// Deliver a named event to the client.
    pub fn push(&self, event: &str, payload: Value) {
        let _ = self.events.send(SocketEvent::Message { event: event.to_string(), payload });
    }

    /// Drop the connection with `reason`.
    pub fn drop_with(&self, reason: DisconnectReason) {
        let _ = self.events.send(SocketEvent::Closed(reason));
    }

    /// Messages the client emitted on this socket.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    /// Whether the client closed this socket.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Client's outbound half of a [`SimSocket`].
#[derive(Debug)]
pub struct SimSink {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    closed: Arc<AtomicBool>,
}

impl SocketSink for SimSink {
    fn emit(&mut self, message: &OutboundMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Client's inbound half of a [`SimSocket`].
#[derive(Debug)]
pub struct SimStream {
    inbox: mpsc::UnboundedReceiver<SocketEvent>,
}

#[async_trait]
impl SocketStream for SimStream {
    async fn recv(&mut self) -> SocketEvent {
        self.inbox.recv().await.unwrap_or(SocketEvent::Closed(DisconnectReason::TransportClose))
    }
}
