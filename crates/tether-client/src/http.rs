//! HTTP token exchange.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tether_core::{CredentialPair, RefreshError, TokenExchange};
use tracing::debug;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// [`TokenExchange`] that POSTs the refresh token as JSON.
///
/// Expects `{"refreshToken": ...}` in and `{"accessToken": ..., "refreshToken": ...}`
/// out. HTTP 401 and 403 mean the refresh token was rejected.
#[derive(Debug, Clone)]
pub struct HttpTokenExchange {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTokenExchange {
    /// Exchange against `endpoint` with a default HTTP client.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    /// Exchange against `endpoint` with a caller-configured client.
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { client, endpoint: endpoint.into() }
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, refresh_token: &str) -> Result<CredentialPair, RefreshError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        let status = response.status();
        debug!(%status, "refresh response");
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RefreshError::Rejected);
        }
        if !status.is_success() {
            return Err(RefreshError::Network(format!("HTTP {status}")));
        }

        response
            .json::<CredentialPair>()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))
    }
}
