//! Runtime for the Tether realtime connection manager
//!
//! Executes the actions of [`tether_core::Supervisor`] against real I/O: a
//! single actor task owns the supervisor and the live socket, credential
//! lookups and socket opens run as short-lived tasks that report back to it,
//! and callers talk to it through [`RealtimeClient`].
//!
//! # Components
//!
//! - [`RealtimeClient`]: Handle exposing connect, disconnect, send and the
//!   observable connected flag
//! - [`CredentialStore`]: Always-read-through access to the persisted pair
//! - [`CredentialRefresher`]: Single-flight token refresh
//! - [`HandlerSlot`]: Rebindable callback slot
//! - [`FileStore`], [`MemoryStore`]: Key-value stores
//! - `WsTransport`, `HttpTokenExchange`: Production adapters (feature
//!   `transport`)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod config;
mod file_store;
mod handlers;
#[cfg(feature = "transport")]
mod http;
mod refresh;
mod runtime;
mod store;
#[cfg(feature = "transport")]
mod ws;

pub use client::RealtimeClient;
pub use config::{ClientConfig, DEFAULT_HANDSHAKE_TIMEOUT};
pub use file_store::FileStore;
pub use handlers::HandlerSlot;
#[cfg(feature = "transport")]
pub use http::HttpTokenExchange;
pub use refresh::CredentialRefresher;
pub use store::{CredentialStore, MemoryStore};
pub use tether_core::{
    AppState, CredentialPair, DisconnectReason, InboundMessage, SupervisorError, SupervisorState,
};
#[cfg(feature = "transport")]
pub use ws::{KeepaliveConfig, WsSink, WsStream, WsTransport};
