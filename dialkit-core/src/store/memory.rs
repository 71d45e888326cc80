use crate::store::{StoreBackend, StoreChange};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::broadcast;

const CHANGE_CHANNEL_SIZE: usize = 16;

pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    change_tx: broadcast::Sender<StoreChange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            change_tx: broadcast::channel(CHANGE_CHANNEL_SIZE).0,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
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
impl StoreBackend for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> anyhow::Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.clone());
        self.notify(key, Some(value));
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.write().remove(key);
        self.notify(key, None);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.change_tx.subscribe()
    }
}
