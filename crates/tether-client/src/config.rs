//! Runtime configuration.

use std::time::Duration;

use tether_core::{EventRouter, ReconnectPolicy};

/// Default bound on the opening handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// Configuration for a [`crate::RealtimeClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Endpoint the transport connects to.
    pub url: String,
    /// Time allowed for a socket to open and be acknowledged.
    pub handshake_timeout: Duration,
    /// Reconnect backoff.
    pub policy: ReconnectPolicy,
    /// Inbound events delivered to the message handler.
    pub router: EventRouter,
}

impl ClientConfig {
    /// Defaults for everything but the endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            policy: ReconnectPolicy::default(),
            router: EventRouter::default(),
        }
    }

    /// Override the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Override the reconnect policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the recognized inbound events.
    #[must_use]
    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.router = EventRouter::new(events);
        self
    }
}
