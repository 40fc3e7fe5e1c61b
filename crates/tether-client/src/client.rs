//! Public handle to the connection runtime.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tether_core::{
    AppState, Environment, InboundMessage, KeyValueStore, SupervisorError, SupervisorState,
    TokenExchange, Transport,
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    config::ClientConfig,
    refresh::CredentialRefresher,
    runtime::{Command, Handlers, Published, Runtime},
    store::CredentialStore,
};

/// Handle to a realtime connection managed in the background.
///
/// Cheap calls post a request to the runtime task and return immediately;
/// the outcome is observed through [`is_connected`](Self::is_connected),
/// [`watch_connected`](Self::watch_connected) and the bound handlers.
/// Dropping the handle disconnects and stops the runtime.
///
/// Must be created inside a tokio runtime.
#[derive(Debug)]
pub struct RealtimeClient {
    commands: mpsc::UnboundedSender<Command>,
    connected: watch::Receiver<bool>,
    state: watch::Receiver<SupervisorState>,
    handlers: Handlers,
    actor: Option<JoinHandle<()>>,
    lifecycle: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeClient {
    /// Start a runtime with its own refresher over `store`.
    pub fn spawn<T, S, X, E>(
        config: ClientConfig,
        transport: T,
        store: S,
        exchange: X,
        env: E,
    ) -> Self
    where
        T: Transport,
        S: KeyValueStore,
        X: TokenExchange,
        E: Environment,
    {
        let refresher = CredentialRefresher::new(CredentialStore::new(store, env.clone()), exchange);
        Self::with_refresher(config, transport, Arc::new(refresher), env)
    }

    /// Start a runtime sharing `refresher` with other callers, such as a
    /// REST client that refreshes on HTTP 401.
    pub fn with_refresher<T, S, X, E>(
        config: ClientConfig,
        transport: T,
        refresher: Arc<CredentialRefresher<S, X, E>>,
        env: E,
    ) -> Self
    where
        T: Transport,
        S: KeyValueStore,
        X: TokenExchange,
        E: Environment,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected) = watch::channel(false);
        let (state_tx, state) = watch::channel(SupervisorState::Idle);
        let handlers = Handlers::default();

        let runtime = Runtime::new(
            config,
            transport,
            refresher,
            env,
            handlers.clone(),
            Published { connected: connected_tx, state: state_tx },
        );
        let actor = tokio::spawn(runtime.run(command_rx));

        Self {
            commands,
            connected,
            state,
            handlers,
            actor: Some(actor),
            lifecycle: Mutex::new(None),
        }
    }

    /// Start connecting.
    ///
    /// Resolves once the request has been applied, not once the channel is
    /// open. A no-op while an attempt is in progress or connected. Failures
    /// are reported to the error handler.
    pub async fn connect(&self) {
        let (ack, applied) = oneshot::channel();
        if !self.command(Command::Connect(ack)) {
            return;
        }
        let _ = applied.await;
    }

    /// Tear down the channel and cancel any pending reconnect.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Drop the current channel and reconnect with a fresh attempt budget.
    pub fn force_reconnect(&self) {
        self.command(Command::ForceReconnect);
    }

    /// Send a named event.
    ///
    /// Returns `false` without touching the transport when not connected.
    pub fn send_message(&self, event: impl Into<String>, payload: Value) -> bool {
        let event = event.into();
        if !self.is_connected() {
            debug!(%event, "send refused, not connected");
            return false;
        }
        self.command(Command::Send { event, payload })
    }

    /// Whether the channel is currently open.
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Subscribe to the connected flag.
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// Current supervisor state.
    pub fn state(&self) -> SupervisorState {
        self.state.borrow().clone()
    }

    /// Subscribe to supervisor state changes.
    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }

    /// Bind the message handler, replacing any previous one.
    ///
    /// Takes effect for the next delivered message without reconnecting.
    pub fn set_message_handler<F>(&self, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.handlers.messages.set(handler);
    }

    /// Unbind the message handler.
    pub fn clear_message_handler(&self) {
        self.handlers.messages.clear();
    }

    /// Bind the error handler, replacing any previous one.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&SupervisorError) + Send + Sync + 'static,
    {
        self.handlers.errors.set(handler);
    }

    /// Unbind the error handler.
    pub fn clear_error_handler(&self) {
        self.handlers.errors.clear();
    }

    /// Report a host application state change.
    pub fn set_app_state(&self, state: AppState) {
        self.command(Command::AppState(state));
    }

    /// Follow a stream of host application states.
    ///
    /// Replaces any previously attached source.
    pub fn attach_lifecycle(&self, mut source: watch::Receiver<AppState>) {
        let commands = self.commands.clone();
        let forwarder = tokio::spawn(async move {
            while source.changed().await.is_ok() {
                let state = *source.borrow_and_update();
                if commands.send(Command::AppState(state)).is_err() {
                    break;
                }
            }
        });
        if let Some(previous) = self.lifecycle.lock().replace(forwarder) {
            previous.abort();
        }
    }

    /// Disconnect and wait for the runtime to stop.
    pub async fn shutdown(mut self) {
        self.stop_lifecycle();
        self.command(Command::Shutdown);
        if let Some(actor) = self.actor.take() {
            if let Err(error) = actor.await {
                warn!(%error, "runtime task failed");
            }
        }
    }

    fn command(&self, command: Command) -> bool {
        let delivered = self.commands.send(command).is_ok();
        if !delivered {
            debug!("runtime already stopped");
        }
        delivered
    }

    fn stop_lifecycle(&self) {
        if let Some(forwarder) = self.lifecycle.lock().take() {
            forwarder.abort();
        }
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.stop_lifecycle();
        let _ = self.commands.send(Command::Shutdown);
    }
}
