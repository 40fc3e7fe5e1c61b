//! Error and reason types shared by the supervisor and its collaborators.

use std::fmt;

use thiserror::Error;

use crate::{refresh::RefreshError, store::StoreError};

/// Why an established (or establishing) channel went away.
///
/// Wire tags follow the socket.io reason strings the backend and transport
/// report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Server closed the channel deliberately.
    ServerDisconnect,
    /// Keepalive pong did not arrive in time.
    PingTimeout,
    /// Underlying connection closed (network change, proxy reset).
    TransportClose,
    /// This client asked for the disconnect.
    ClientDisconnect,
    /// Transport failed with an error other than close/timeout.
    TransportError,
    /// Opening handshake failed for a non-auth reason.
    HandshakeFailed,
    /// Unrecognized tag reported by the transport.
    Other(String),
}

impl DisconnectReason {
    /// Map a transport reason tag.
    pub fn from_wire(tag: &str) -> Self {
        match tag {
            "io server disconnect" => Self::ServerDisconnect,
            "ping timeout" => Self::PingTimeout,
            "transport close" => Self::TransportClose,
            "io client disconnect" => Self::ClientDisconnect,
            "transport error" => Self::TransportError,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the supervisor should reconnect automatically.
    ///
    /// Only hiccups (server kick, missed keepalive, dropped transport, failed
    /// handshake) qualify. A client-initiated disconnect, a hard transport
    /// error or anything unrecognized stops automatic retries.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ServerDisconnect | Self::PingTimeout | Self::TransportClose | Self::HandshakeFailed
        )
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerDisconnect => f.write_str("io server disconnect"),
            Self::PingTimeout => f.write_str("ping timeout"),
            Self::TransportClose => f.write_str("transport close"),
            Self::ClientDisconnect => f.write_str("io client disconnect"),
            Self::TransportError => f.write_str("transport error"),
            Self::HandshakeFailed => f.write_str("handshake failed"),
            Self::Other(tag) => f.write_str(tag),
        }
    }
}

/// Structured failure class reported by a transport, when it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectErrorCode {
    /// Credential missing, expired or invalid (HTTP 401).
    Unauthorized,
    /// Credential valid but not allowed (HTTP 403).
    Forbidden,
    /// Handshake did not complete in time.
    Timeout,
    /// Endpoint unreachable.
    Refused,
    /// Peer spoke something unexpected.
    Protocol,
}

/// Failure to open a channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("connect error: {message}")]
pub struct ConnectError {
    /// Structured class, if the transport exposes one.
    pub code: Option<ConnectErrorCode>,
    /// Human-readable message from the transport or server.
    pub message: String,
}

/// Lowercase phrases that mark a connect error as a credential problem when
/// no structured code is available.
const AUTH_FAILURE_PHRASES: &[&str] = &[
    "jwt expired",
    "token expired",
    "expired",
    "invalid token",
    "invalid signature",
    "unauthorized",
    "authentication",
];

impl ConnectError {
    /// Error with a structured code.
    pub fn new(code: ConnectErrorCode, message: impl Into<String>) -> Self {
        Self { code: Some(code), message: message.into() }
    }

    /// Error carrying only a message.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self { code: None, message: message.into() }
    }

    /// Handshake timeout.
    pub fn timeout() -> Self {
        Self::new(ConnectErrorCode::Timeout, "handshake timed out")
    }

    /// Whether refreshing the credential could fix this failure.
    ///
    /// A structured code is authoritative. Without one, the message is
    /// matched against known phrases; this is best effort and depends on the
    /// server's wording.
    pub fn is_auth_failure(&self) -> bool {
        match self.code {
            Some(ConnectErrorCode::Unauthorized) => true,
            Some(_) => false,
            None => {
                let message = self.message.to_lowercase();
                AUTH_FAILURE_PHRASES.iter().any(|phrase| message.contains(phrase))
            },
        }
    }
}

/// Failure to hand an outbound message to a live socket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Socket is already closed.
    #[error("socket closed")]
    Closed,

    /// Payload could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Failures the supervisor surfaces through the error callback.
///
/// None of these cross the public API as `Err`; they are delivered to the
/// caller-supplied error handler while the supervisor settles into a
/// disconnected state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    /// No credential pair is persisted (logged out).
    #[error("no credential available")]
    NoCredential,

    /// Refresh token itself has expired or cannot be decoded.
    #[error("refresh token expired")]
    RefreshTokenExpired,

    /// Token exchange failed.
    #[error("credential refresh failed: {0}")]
    RefreshFailed(#[from] RefreshError),

    /// Server still rejected the channel after a fresh credential.
    #[error("server rejected refreshed credential: {0}")]
    AuthRejected(String),

    /// Automatic reconnect attempts are used up.
    #[error("gave up after {attempts} reconnect attempts")]
    ReconnectExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Credential storage failed.
    #[error("credential storage failed: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_reasons() {
        assert!(DisconnectReason::from_wire("io server disconnect").is_recoverable());
        assert!(DisconnectReason::from_wire("ping timeout").is_recoverable());
        assert!(DisconnectReason::from_wire("transport close").is_recoverable());
        assert!(DisconnectReason::HandshakeFailed.is_recoverable());
    }

    #[test]
    fn terminal_reasons() {
        assert!(!DisconnectReason::from_wire("io client disconnect").is_recoverable());
        assert!(!DisconnectReason::from_wire("transport error").is_recoverable());
        assert!(!DisconnectReason::from_wire("parse error").is_recoverable());
    }

    #[test]
    fn wire_tags_round_trip_through_display() {
        for tag in ["io server disconnect", "ping timeout", "transport close", "io client disconnect"]
        {
            assert_eq!(DisconnectReason::from_wire(tag).to_string(), tag);
        }
    }

    #[test]
    fn structured_code_wins_over_message() {
        assert!(ConnectError::new(ConnectErrorCode::Unauthorized, "nope").is_auth_failure());
        assert!(!ConnectError::new(ConnectErrorCode::Refused, "token expired").is_auth_failure());
    }

    #[test]
    fn message_heuristic_matches_known_phrases() {
        assert!(ConnectError::from_message("jwt expired").is_auth_failure());
        assert!(ConnectError::from_message("Authentication error").is_auth_failure());
        assert!(ConnectError::from_message("Invalid token provided").is_auth_failure());
        assert!(ConnectError::from_message("UNAUTHORIZED").is_auth_failure());
        assert!(!ConnectError::from_message("xhr poll error").is_auth_failure());
        assert!(!ConnectError::timeout().is_auth_failure());
    }
}
