//! Token exchange abstraction.
//!
//! The exchange is a one-shot network call trading a refresh token for a new
//! credential pair. Deduplication and persistence live in the runtime; this
//! trait only describes the call itself.

use async_trait::async_trait;
use thiserror::Error;

use crate::credential::CredentialPair;

/// Failure of a token exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// Server refused the refresh token. The session cannot be recovered.
    #[error("refresh token rejected by server")]
    Rejected,

    /// Request did not complete.
    #[error("refresh request failed: {0}")]
    Network(String),

    /// Server answered with something other than a credential pair.
    #[error("refresh response invalid: {0}")]
    InvalidResponse(String),
}

/// Exchanges a refresh token for a fresh credential pair.
#[async_trait]
pub trait TokenExchange: Send + Sync + 'static {
    /// Perform one exchange.
    async fn exchange(&self, refresh_token: &str) -> Result<CredentialPair, RefreshError>;
}
