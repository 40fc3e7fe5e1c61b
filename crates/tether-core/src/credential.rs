//! Credential pair and JWT expiry inspection.
//!
//! The client never verifies token signatures; the backend does that. All the
//! client needs from a token is its `exp` claim, so it can refresh an access
//! token before presenting it and avoid a round trip that is bound to fail.

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access/refresh token pair.
///
/// Created on login, replaced wholesale by every successful refresh and
/// destroyed on logout. Serialized with the camelCase field names used by the
/// backend and by persisted storage.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    /// Short-lived bearer token presented when opening the channel.
    pub access_token: String,
    /// Longer-lived token exchanged for a new pair.
    pub refresh_token: String,
}

impl CredentialPair {
    /// Create a pair from its two tokens.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self { access_token: access_token.into(), refresh_token: refresh_token.into() }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    format!("{prefix}…({} chars)", token.chars().count())
}

/// Reasons a token could not be inspected.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Token is not three dot-separated segments.
    #[error("token is not a compact JWT")]
    Malformed,

    /// Payload segment is not base64url.
    #[error("token payload is not base64url: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// Payload segment is not a JSON object.
    #[error("token payload is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload has no usable `exp` claim.
    #[error("token has no expiry claim")]
    MissingExpiry,
}

#[derive(Deserialize)]
struct RawClaims {
    exp: Option<serde_json::Number>,
    sub: Option<serde_json::Value>,
}

/// Claims the client reads from a token payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Expiry, in seconds since the Unix epoch.
    pub exp: u64,
    /// Subject, if present. Numeric subjects are rendered as strings.
    pub sub: Option<String>,
}

impl TokenClaims {
    /// Decode the payload segment of a compact JWT without verifying it.
    pub fn decode(token: &str) -> Result<Self, CredentialError> {
        let mut segments = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (segments.next(), segments.next(), segments.next(), segments.next())
        else {
            return Err(CredentialError::Malformed);
        };

        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
        let raw: RawClaims = serde_json::from_slice(&bytes)?;

        let exp = raw
            .exp
            .and_then(|n| n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)))
            .ok_or(CredentialError::MissingExpiry)?;

        let sub = raw.sub.and_then(|value| match value {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Ok(Self { exp, sub })
    }

    /// Whether the token is still usable at `now` (Unix seconds).
    pub fn is_live_at(&self, now: u64) -> bool {
        self.exp > now
    }
}

/// Check a token's expiry against `now` (Unix seconds).
///
/// Returns `false` for anything that cannot be decoded, so a corrupt token is
/// treated exactly like an expired one.
pub fn is_token_valid(token: &str, now: u64) -> bool {
    if token.is_empty() {
        return false;
    }
    TokenClaims::decode(token).is_ok_and(|claims| claims.is_live_at(now))
}
