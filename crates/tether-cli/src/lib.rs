//! Line-oriented shell for the Tether connection manager
//!
//! Reads slash commands from a terminal and drives a
//! [`tether_client::RealtimeClient`], printing inbound events and reported
//! errors as they arrive. Useful for poking a backend by hand.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod commands;
pub mod error;
pub mod shell;

pub use commands::Command;
pub use error::CliError;
pub use shell::{Flow, Shell};
