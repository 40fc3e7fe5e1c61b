//! Tether realtime connection core logic
//!
//! Pure state machine logic for keeping one authenticated realtime channel
//! open, completely decoupled from I/O. This enables deterministic testing of
//! reconnect, backoff and reauthentication behaviour.
//!
//! # Architecture
//!
//! The [`supervisor::Supervisor`] never touches a socket, a clock or a token
//! store. Callers feed it events (a credential became available, a socket
//! opened, a socket closed with a reason) together with the current time, and
//! it answers with declarative [`supervisor::SupervisorAction`]s describing the
//! effects to perform. A runtime interprets those actions against real I/O;
//! tests interpret them against scripted doubles.
//!
//! # Components
//!
//! - [`supervisor`]: Connection supervisor state machine (connect, backoff,
//!   reauthentication)
//! - [`policy`]: Reconnect backoff policy and attempt budget
//! - [`credential`]: Credential pair and JWT expiry inspection
//! - [`lifecycle`]: Application foreground/background bridge
//! - [`dispatch`]: Inbound event routing table
//! - [`mod@env`]: Environment abstraction (time)
//! - [`transport`]: Realtime transport abstraction
//! - [`store`]: Key-value persistence abstraction
//! - [`refresh`]: Token exchange abstraction
//! - [`error`]: Disconnect reasons, connect errors, supervisor errors

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod credential;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod lifecycle;
pub mod policy;
pub mod refresh;
pub mod store;
pub mod supervisor;
pub mod transport;

pub use credential::{CredentialPair, TokenClaims, is_token_valid};
pub use dispatch::{EventRouter, InboundMessage, OutboundMessage};
pub use env::{Environment, SystemEnv};
pub use error::{ConnectError, ConnectErrorCode, DisconnectReason, SupervisorError, TransportError};
pub use lifecycle::{AppState, LifecycleBridge, LifecycleSignal};
pub use policy::{ReconnectBudget, ReconnectPolicy};
pub use refresh::{RefreshError, TokenExchange};
pub use store::{KeyValueStore, StoreError};
pub use supervisor::{SocketId, Supervisor, SupervisorAction, SupervisorState};
pub use transport::{SocketEvent, SocketSink, SocketStream, Transport};
