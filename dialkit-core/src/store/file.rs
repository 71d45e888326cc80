use crate::store::{StoreBackend, StoreChange};
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

const CHANGE_CHANNEL_SIZE: usize = 16;

/// JSON-file backed store. The whole map is rewritten on every mutation;
/// payloads are a handful of small strings, not a database.
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
    change_tx: broadcast::Sender<StoreChange>,
}

impl FileStore {
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Malformed store file {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            change_tx: broadcast::channel(CHANGE_CHANNEL_SIZE).0,
        })
    }

    async fn persist(&self) -> anyhow::Result<()> {
        let raw = {
            let entries = self.entries.read();
            serde_json::to_string_pretty(&*entries)?
        };
        tokio::fs::write(&self.path, raw)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    fn notify(&self, key: &str, value: Option<String>) {
        let change = StoreChange {
            key: key.to_string(),
            value,
        };
        if self.change_tx.send(change).is_err() {
            tracing::trace!(key, "No store change subscribers");
        }
    }
}

#[async_trait]
impl StoreBackend for FileStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> anyhow::Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.clone());
        self.persist().await?;
        self.notify(key, Some(value));
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.write().remove(key);
        self.persist().await?;
        self.notify(key, None);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.change_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_log::test;

    #[test(tokio::test)]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let store = FileStore::open(&path).await.unwrap();
            store.set("k", "v".to_string()).await.unwrap();
        }

        let store = FileStore::open(&path).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[test(tokio::test)]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("missing.json"))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
