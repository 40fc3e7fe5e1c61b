//! Key-value persistence abstraction.
//!
//! Credentials live in a scoped async key-value store provided by the host
//! platform (keychain, app storage, a file). The supervisor never caches what
//! it reads: a concurrent refresh may replace the pair at any time, so every
//! read goes back to the store.

use async_trait::async_trait;
use thiserror::Error;

/// Storage key for the access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Storage key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Failure reported by a key-value store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backing medium failed.
    #[error("storage I/O failed: {0}")]
    Io(String),

    /// Stored data could not be decoded or encoded.
    #[error("storage contents are corrupt: {0}")]
    Corrupt(String),
}

/// Scoped async key-value storage.
///
/// `set` and `remove` must be idempotent: writing the same value twice or
/// removing a missing key succeeds. Stores that can commit several entries
/// at once should override [`set_many`](Self::set_many) and
/// [`remove_many`](Self::remove_many); the defaults apply entries one by one.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read a value. Missing keys are `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a value.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Write several values as one update.
    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    /// Delete several values as one update.
    async fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}
