//! Persisted credential access.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_core::{
    CredentialPair, Environment, KeyValueStore, StoreError, is_token_valid,
    store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY},
};
use tracing::{debug, warn};

/// Typed view over a [`KeyValueStore`] holding the credential pair.
///
/// Nothing is cached: every read goes to the store, so a pair written by a
/// login screen or a REST-side refresh is picked up by the next connection
/// attempt without any notification.
#[derive(Debug)]
pub struct CredentialStore<S, E> {
    store: S,
    env: E,
}

impl<S: KeyValueStore, E: Environment> CredentialStore<S, E> {
    /// Wrap a key-value store.
    pub fn new(store: S, env: E) -> Self {
        Self { store, env }
    }

    /// Current pair, or `None` if either half is missing or unreadable.
    pub async fn read(&self) -> Option<CredentialPair> {
        let access_token = self.get(ACCESS_TOKEN_KEY).await?;
        let refresh_token = self.get(REFRESH_TOKEN_KEY).await?;
        Some(CredentialPair { access_token, refresh_token })
    }

    /// Replace the stored pair in a single store update.
    pub async fn write(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        self.store
            .set_many(&[
                (REFRESH_TOKEN_KEY, pair.refresh_token.as_str()),
                (ACCESS_TOKEN_KEY, pair.access_token.as_str()),
            ])
            .await?;
        debug!("credential pair stored");
        Ok(())
    }

    /// Remove both tokens.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY]).await?;
        debug!("credential pair cleared");
        Ok(())
    }

    /// Whether `token` is unexpired by the environment's wall clock.
    pub fn is_valid(&self, token: &str) -> bool {
        is_token_valid(token, self.env.unix_time())
    }

    /// Underlying key-value store.
    pub fn inner(&self) -> &S {
        &self.store
    }

    async fn get(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(Some(value)) if !value.is_empty() => Some(value),
            Ok(_) => None,
            Err(error) => {
                warn!(key, %error, "credential read failed");
                None
            },
        }
    }
}

/// In-process [`KeyValueStore`].
///
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a credential pair.
    pub fn with_pair(pair: &CredentialPair) -> Self {
        let store = Self::new();
        {
            let mut entries = store.entries.lock();
            entries.insert(ACCESS_TOKEN_KEY.to_string(), pair.access_token.clone());
            entries.insert(REFRESH_TOKEN_KEY.to_string(), pair.refresh_token.clone());
        }
        store
    }

    /// Synchronous read, for inspection.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut map = self.entries.lock();
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut map = self.entries.lock();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use tether_core::SystemEnv;

    use super::*;

    fn token(exp: u64) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));
        format!("h.{payload}.s")
    }

    #[tokio::test]
    async fn read_requires_both_halves() {
        let backing = MemoryStore::new();
        let store = CredentialStore::new(backing.clone(), SystemEnv);
        assert_eq!(store.read().await, None);

        backing.set(ACCESS_TOKEN_KEY, "a").await.unwrap();
        assert_eq!(store.read().await, None);

        backing.set(REFRESH_TOKEN_KEY, "r").await.unwrap();
        assert_eq!(store.read().await, Some(CredentialPair::new("a", "r")));
    }

    #[tokio::test]
    async fn empty_values_count_as_missing() {
        let store = CredentialStore::new(MemoryStore::with_pair(&CredentialPair::new("", "r")), SystemEnv);
        assert_eq!(store.read().await, None);
    }

    #[tokio::test]
    async fn external_writes_are_seen_immediately() {
        let backing = MemoryStore::with_pair(&CredentialPair::new("a1", "r1"));
        let store = CredentialStore::new(backing.clone(), SystemEnv);
        assert_eq!(store.read().await.unwrap().access_token, "a1");

        backing.set(ACCESS_TOKEN_KEY, "a2").await.unwrap();
        assert_eq!(store.read().await.unwrap().access_token, "a2");
    }

    #[tokio::test]
    async fn clear_removes_both_keys() {
        let backing = MemoryStore::with_pair(&CredentialPair::new("a", "r"));
        let store = CredentialStore::new(backing.clone(), SystemEnv);
        store.clear().await.unwrap();
        assert_eq!(backing.peek(ACCESS_TOKEN_KEY), None);
        assert_eq!(backing.peek(REFRESH_TOKEN_KEY), None);
    }

    #[derive(Default)]
    struct Recording {
        inner: MemoryStore,
        updates: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl KeyValueStore for Recording {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.updates.lock().push(vec![key.to_string()]);
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.updates.lock().push(vec![key.to_string()]);
            self.inner.remove(key).await
        }

        async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
            self.updates.lock().push(entries.iter().map(|(key, _)| (*key).to_string()).collect());
            self.inner.set_many(entries).await
        }

        async fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
            self.updates.lock().push(keys.iter().map(|key| (*key).to_string()).collect());
            self.inner.remove_many(keys).await
        }
    }

    #[tokio::test]
    async fn pair_is_written_and_cleared_in_one_update() {
        let store = CredentialStore::new(Recording::default(), SystemEnv);

        store.write(&CredentialPair::new("a", "r")).await.unwrap();
        assert_eq!(store.inner().updates.lock().len(), 1);
        assert_eq!(store.read().await, Some(CredentialPair::new("a", "r")));

        store.clear().await.unwrap();
        assert_eq!(store.inner().updates.lock().len(), 2);
        assert_eq!(store.read().await, None);
    }

    #[test]
    fn validity_uses_wall_clock() {
        let store = CredentialStore::new(MemoryStore::new(), SystemEnv);
        assert!(store.is_valid(&token(u64::from(u32::MAX) * 4)));
        assert!(!store.is_valid(&token(1)));
    }
}
