//! Single-flight credential refresh.

use tether_core::{CredentialPair, Environment, KeyValueStore, SupervisorError, TokenExchange};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::store::CredentialStore;

/// Exchanges the stored refresh token for a new pair, at most once at a time.
///
/// Shared by every path that needs a fresh credential (the connection
/// runtime and any REST layer of the host app). Concurrent callers serialize
/// on an internal lock; a caller that waited while another refresh completed
/// gets the freshly stored pair instead of spending the refresh token again.
#[derive(Debug)]
pub struct CredentialRefresher<S, X, E> {
    store: CredentialStore<S, E>,
    exchange: X,
    in_flight: Mutex<()>,
}

impl<S, X, E> CredentialRefresher<S, X, E>
where
    S: KeyValueStore,
    X: TokenExchange,
    E: Environment,
{
    /// Refresher over `store` using `exchange` for the network call.
    pub fn new(store: CredentialStore<S, E>, exchange: X) -> Self {
        Self { store, exchange, in_flight: Mutex::new(()) }
    }

    /// Credential store this refresher reads and writes.
    pub fn store(&self) -> &CredentialStore<S, E> {
        &self.store
    }

    /// Replace the stored pair using the stored refresh token.
    ///
    /// Fails without a network call when no pair is stored or the refresh
    /// token itself has expired.
    pub async fn refresh(&self) -> Result<CredentialPair, SupervisorError> {
        let observed = self.store.read().await.ok_or(SupervisorError::NoCredential)?;
        self.refresh_from(&observed, false).await
    }

    /// Access token safe to present right now.
    ///
    /// Returns the stored access token if it is unexpired and `force_refresh`
    /// is false; otherwise refreshes first.
    pub async fn ensure_fresh(&self, force_refresh: bool) -> Result<String, SupervisorError> {
        let pair = self.store.read().await.ok_or(SupervisorError::NoCredential)?;
        if !force_refresh && self.store.is_valid(&pair.access_token) {
            return Ok(pair.access_token);
        }

        debug!(force_refresh, "access token needs refresh");
        self.refresh_from(&pair, !force_refresh).await.map(|pair| pair.access_token)
    }

    /// Exchange `observed` unless another caller replaced it while this one
    /// waited for the lock. With `accept_valid`, a stored access token that
    /// is unexpired by the time the lock is held is used as-is.
    async fn refresh_from(
        &self,
        observed: &CredentialPair,
        accept_valid: bool,
    ) -> Result<CredentialPair, SupervisorError> {
        let _guard = self.in_flight.lock().await;

        let current = self.store.read().await.ok_or(SupervisorError::NoCredential)?;
        if current != *observed {
            debug!("credential replaced while waiting, reusing it");
            return Ok(current);
        }
        if accept_valid && self.store.is_valid(&current.access_token) {
            return Ok(current);
        }

        if !self.store.is_valid(&current.refresh_token) {
            warn!("refresh token expired, session cannot be renewed");
            return Err(SupervisorError::RefreshTokenExpired);
        }

        info!("refreshing credential");
        let pair = self.exchange.exchange(&current.refresh_token).await.map_err(|error| {
            warn!(%error, "credential refresh failed");
            SupervisorError::RefreshFailed(error)
        })?;

        self.store.write(&pair).await?;
        Ok(pair)
    }
}
