//! Deterministic test doubles for the Tether connection manager.
//!
//! Everything here runs on tokio's clock, so tests built on a paused runtime
//! (`#[tokio::test(start_paused = true)]`) control backoff timers, handshake
//! timeouts and token expiry from one place.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod sim_env;
pub mod sim_exchange;
pub mod sim_transport;
pub mod tokens;

use std::time::Duration;

pub use sim_env::SimEnv;
pub use sim_exchange::CountingExchange;
pub use sim_transport::{OpenOutcome, OpenRecord, ScriptedTransport, SimSocket};
pub use tokens::mint_token;

/// Let every runnable task finish, then advance the clock by one
/// millisecond.
///
/// On a paused runtime the clock only advances once all tasks are idle, so
/// this drains pending work without firing any timer longer than 1 ms.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
