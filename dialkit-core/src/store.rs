pub mod file;
pub mod memory;

use async_trait::async_trait;
use tokio::sync::broadcast;

pub const SETTINGS_KEY: &str = "softphone.settings";
pub const DISPLAY_NAME_KEY: &str = "softphone.display_name";

/// Emitted for every mutation of the store, including mutations performed by
/// other holders of the same backing storage (the cross-tab case).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
    /// `None` when the key was removed.
    pub value: Option<String>,
}

/// Key-value persistence for settings and profile data. Values are opaque
/// strings; the caller owns the encoding.
#[async_trait]
pub trait StoreBackend: Send + Sync + 'static {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> anyhow::Result<()>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}
