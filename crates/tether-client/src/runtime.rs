//! Actor that executes supervisor actions.
//!
//! One task owns the [`Supervisor`], the live socket and the reconnect timer.
//! Everything that can block (credential lookup, socket open, socket reads)
//! runs in a helper task that reports back over the completion channel with
//! the cycle or [`SocketId`] it was started for, so results from superseded
//! attempts are discarded by the supervisor instead of racing it.

use std::sync::Arc;

use serde_json::Value;
use tether_core::{
    AppState, ConnectError, Environment, InboundMessage, KeyValueStore, LifecycleBridge,
    LifecycleSignal, OutboundMessage, SocketEvent, SocketId, SocketSink, SocketStream, Supervisor,
    SupervisorAction, SupervisorError, SupervisorState, TokenExchange, Transport,
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, info, trace, warn};

use crate::{config::ClientConfig, handlers::HandlerSlot, refresh::CredentialRefresher};

/// Requests from [`crate::RealtimeClient`].
#[derive(Debug)]
pub(crate) enum Command {
    /// Start connecting; acknowledged once the request has been applied.
    Connect(oneshot::Sender<()>),
    Disconnect,
    ForceReconnect,
    Send { event: String, payload: Value },
    AppState(AppState),
    Shutdown,
}

/// Callback slots shared between the handle and the runtime.
#[derive(Debug, Clone, Default)]
pub(crate) struct Handlers {
    pub(crate) messages: HandlerSlot<InboundMessage>,
    pub(crate) errors: HandlerSlot<SupervisorError>,
}

/// Observable state published by the runtime.
#[derive(Debug)]
pub(crate) struct Published {
    pub(crate) connected: watch::Sender<bool>,
    pub(crate) state: watch::Sender<SupervisorState>,
}

/// Results reported by helper tasks.
enum Completion<T: Transport> {
    Credential { cycle: u64, result: Result<String, SupervisorError> },
    Opened { socket: SocketId, result: Result<(T::Sink, T::Stream), ConnectError> },
    Event { socket: SocketId, event: SocketEvent },
}

struct LiveSocket<K> {
    id: SocketId,
    sink: K,
    reader: JoinHandle<()>,
}

pub(crate) struct Runtime<T: Transport, S, X, E> {
    supervisor: Supervisor,
    config: ClientConfig,
    transport: Arc<T>,
    refresher: Arc<CredentialRefresher<S, X, E>>,
    env: E,
    bridge: LifecycleBridge,
    live: Option<LiveSocket<T::Sink>>,
    handlers: Handlers,
    published: Published,
    completions: mpsc::UnboundedSender<Completion<T>>,
    completion_rx: mpsc::UnboundedReceiver<Completion<T>>,
}

impl<T, S, X, E> Runtime<T, S, X, E>
where
    T: Transport,
    S: KeyValueStore,
    X: TokenExchange,
    E: Environment,
{
    pub(crate) fn new(
        config: ClientConfig,
        transport: T,
        refresher: Arc<CredentialRefresher<S, X, E>>,
        env: E,
        handlers: Handlers,
        published: Published,
    ) -> Self {
        let (completions, completion_rx) = mpsc::unbounded_channel();
        Self {
            supervisor: Supervisor::new(config.policy),
            config,
            transport: Arc::new(transport),
            refresher,
            env,
            bridge: LifecycleBridge::default(),
            live: None,
            handlers,
            published,
            completions,
            completion_rx,
        }
    }

    /// Process commands until shutdown, then tear down.
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!(url = %self.config.url, "runtime started");
        loop {
            let wait = self.supervisor.time_until_reconnect(self.env.now());

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(completion) = self.completion_rx.recv() => self.handle_completion(completion),
                () = self.env.sleep(wait.unwrap_or_default()), if wait.is_some() => {
                    let actions = self.supervisor.tick(self.env.now());
                    self.execute(actions);
                },
            }

            self.publish_state();
        }

        let actions = self.supervisor.disconnect();
        self.execute(actions);
        self.publish_state();
        debug!("runtime stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(ack) => {
                let actions = self.supervisor.connect();
                self.execute(actions);
                let _ = ack.send(());
            },
            Command::Disconnect => {
                let actions = self.supervisor.disconnect();
                self.execute(actions);
            },
            Command::ForceReconnect => {
                let actions = self.supervisor.force_reconnect();
                self.execute(actions);
            },
            Command::Send { event, payload } => self.emit(&OutboundMessage::new(event, payload)),
            Command::AppState(state) => match self.bridge.observe(state) {
                Some(LifecycleSignal::Foregrounded) => {
                    let actions = self.supervisor.app_foregrounded();
                    self.execute(actions);
                },
                Some(LifecycleSignal::Backgrounded) => {
                    info!("app backgrounded, leaving channel to the transport");
                },
                None => {},
            },
            Command::Shutdown => {},
        }
    }

    fn handle_completion(&mut self, completion: Completion<T>) {
        let now = self.env.now();
        let actions = match completion {
            Completion::Credential { cycle, result: Ok(token) } => {
                self.supervisor.credential_ready(cycle, token)
            },
            Completion::Credential { cycle, result: Err(error) } => {
                self.supervisor.credential_failed(cycle, error)
            },
            Completion::Opened { socket, result: Ok((sink, stream)) } => {
                self.install(socket, sink, stream)
            },
            Completion::Opened { socket, result: Err(error) } => {
                self.supervisor.socket_failed(socket, &error, now)
            },
            Completion::Event { socket, event } => self.deliver(socket, event, now),
        };
        self.execute(actions);
    }

    fn execute(&mut self, actions: Vec<SupervisorAction>) {
        for action in actions {
            match action {
                SupervisorAction::AcquireCredential { cycle, force_refresh } => {
                    self.acquire_credential(cycle, force_refresh);
                },
                SupervisorAction::OpenSocket { socket, access_token } => {
                    self.open_socket(socket, access_token);
                },
                SupervisorAction::CloseSocket { socket } => self.close_socket(socket),
                SupervisorAction::ConnectionChanged(connected) => {
                    self.published.connected.send_replace(connected);
                },
                SupervisorAction::ReportError(error) => {
                    if !self.handlers.errors.call(&error) {
                        warn!(%error, "no error handler bound");
                    }
                },
            }
        }
    }

    fn acquire_credential(&self, cycle: u64, force_refresh: bool) {
        let refresher = Arc::clone(&self.refresher);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = refresher.ensure_fresh(force_refresh).await;
            let _ = completions.send(Completion::Credential { cycle, result });
        });
    }

    fn open_socket(&self, socket: SocketId, access_token: String) {
        let transport = Arc::clone(&self.transport);
        let url = self.config.url.clone();
        let timeout = self.config.handshake_timeout;
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = tokio::time::timeout(timeout, transport.open(&url, &access_token))
                .await
                .unwrap_or_else(|_| Err(ConnectError::timeout()));
            let _ = completions.send(Completion::Opened { socket, result });
        });
    }

    /// Attach a freshly opened socket, unless it was superseded meanwhile.
    fn install(
        &mut self,
        socket: SocketId,
        mut sink: T::Sink,
        stream: T::Stream,
    ) -> Vec<SupervisorAction> {
        if !self.supervisor.is_current(socket) {
            debug!(%socket, "closing socket that opened after being superseded");
            sink.close();
            return Vec::new();
        }

        let reader = self.spawn_reader(socket, stream);
        self.live = Some(LiveSocket { id: socket, sink, reader });
        self.supervisor.socket_opened(socket)
    }

    fn spawn_reader(&self, socket: SocketId, mut stream: T::Stream) -> JoinHandle<()> {
        let completions = self.completions.clone();
        tokio::spawn(async move {
            loop {
                let event = stream.recv().await;
                let closed = matches!(event, SocketEvent::Closed(_));
                if completions.send(Completion::Event { socket, event }).is_err() || closed {
                    break;
                }
            }
        })
    }

    fn deliver(
        &mut self,
        socket: SocketId,
        event: SocketEvent,
        now: std::time::Instant,
    ) -> Vec<SupervisorAction> {
        if self.live.as_ref().map(|live| live.id) != Some(socket) {
            trace!(%socket, "dropping event from detached socket");
            return Vec::new();
        }

        match event {
            SocketEvent::Message { event, payload } => {
                if let Some(message) = self.config.router.route(&event, payload) {
                    if !self.handlers.messages.call(&message) {
                        trace!(event = %message.event, "no message handler bound");
                    }
                }
                Vec::new()
            },
            SocketEvent::Closed(reason) => self.supervisor.socket_closed(socket, reason, now),
        }
    }

    fn emit(&mut self, message: &OutboundMessage) {
        if !self.supervisor.is_connected() {
            debug!(event = %message.event, "send dropped, not connected");
            return;
        }
        let Some(live) = self.live.as_mut() else {
            return;
        };
        if let Err(error) = live.sink.emit(message) {
            warn!(socket = %live.id, event = %message.event, %error, "send failed");
        }
    }

    /// Detach listeners and close the socket.
    fn close_socket(&mut self, socket: SocketId) {
        match self.live.take() {
            Some(mut live) if live.id == socket => {
                live.reader.abort();
                live.sink.close();
                debug!(%socket, "socket closed");
            },
            other => self.live = other,
        }
    }

    fn publish_state(&self) {
        let current = self.supervisor.state();
        self.published.state.send_if_modified(|published| {
            if published == current {
                return false;
            }
            *published = current.clone();
            true
        });
    }
}
