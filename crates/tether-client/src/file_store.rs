//! JSON-file backed key-value store.

use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use tether_core::{KeyValueStore, StoreError};
use tokio::sync::Mutex;
use tracing::trace;

/// [`KeyValueStore`] persisted as a single JSON object on disk.
///
/// Writes go to a sibling temp file that is then renamed over the target, so
/// a crash mid-write leaves the previous contents intact. Clones share one
/// write lock.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

type Entries = BTreeMap<String, String>;

impl FileStore {
    /// Store backed by `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Arc::new(Mutex::new(())) }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Entries, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Entries::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(io_error(&self.path, &e)),
        }
    }

    async fn save(&self, entries: &Entries) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| io_error(parent, &e))?;
        }

        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        tokio::fs::write(&temp, &bytes).await.map_err(|e| io_error(&temp, &e))?;
        tokio::fs::rename(&temp, &self.path).await.map_err(|e| io_error(&self.path, &e))?;
        trace!(path = %self.path.display(), keys = entries.len(), "store saved");
        Ok(())
    }

    async fn update<F>(&self, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Entries) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        if mutate(&mut entries) {
            self.save(&entries).await?;
        }
        Ok(())
    }
}

fn io_error(path: &Path, error: &std::io::Error) -> StoreError {
    StoreError::Io(format!("{}: {error}", path.display()))
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|entries| entries.remove(key).is_some()).await
    }

    async fn set_many(&self, pairs: &[(&str, &str)]) -> Result<(), StoreError> {
        self.update(|entries| {
            for (key, value) in pairs {
                entries.insert((*key).to_string(), (*value).to_string());
            }
            true
        })
        .await
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        self.update(|entries| keys.iter().fold(false, |changed, key| entries.remove(*key).is_some() || changed))
            .await
    }
}
