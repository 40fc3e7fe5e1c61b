//! Inbound event routing.
//!
//! The router decides which named events reach the caller's message handler.
//! Payloads pass through untouched; unknown event names are dropped.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Event names delivered by default.
pub const DEFAULT_EVENTS: &[&str] =
    &["message", "notification", "newMessage", "orderUpdate", "stopUpdate"];

/// Named event received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Event name.
    pub event: String,
    /// Payload as received.
    pub payload: serde_json::Value,
}

/// Named event to send to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Event name.
    pub event: String,
    /// Payload to send.
    pub payload: serde_json::Value,
}

impl OutboundMessage {
    /// Build an outbound message.
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { event: event.into(), payload }
    }
}

/// Set of recognized inbound event names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRouter {
    events: BTreeSet<String>,
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new(DEFAULT_EVENTS.iter().copied())
    }
}

impl EventRouter {
    /// Router recognizing exactly `events`.
    pub fn new<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { events: events.into_iter().map(Into::into).collect() }
    }

    /// Add one more recognized event.
    pub fn recognize(&mut self, event: impl Into<String>) {
        self.events.insert(event.into());
    }

    /// Whether `event` is delivered.
    pub fn recognizes(&self, event: &str) -> bool {
        self.events.contains(event)
    }

    /// Route an event: `Some` if the handler should see it.
    pub fn route(&self, event: &str, payload: serde_json::Value) -> Option<InboundMessage> {
        if self.recognizes(event) {
            Some(InboundMessage { event: event.to_string(), payload })
        } else {
            tracing::trace!(event, "dropping unrecognized event");
            None
        }
    }
}
