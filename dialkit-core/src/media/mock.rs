//! Configurable platform media surface for tests.

use crate::media::{MediaDevices, MediaError, PermissionState};
use async_trait::async_trait;
use dialkit_signaling::MediaStream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

pub struct MockMediaDevices {
    state_tx: watch::Sender<PermissionState>,
    prompt_count: AtomicUsize,
    deny: AtomicBool,
    prompt_delay: Option<Duration>,
    supports_query: bool,
}

impl MockMediaDevices {
    pub fn new(initial: PermissionState) -> Self {
        Self {
            state_tx: watch::channel(initial).0,
            prompt_count: AtomicUsize::new(0),
            deny: AtomicBool::new(false),
            prompt_delay: None,
            supports_query: true,
        }
    }

    /// Simulates a platform without a permission-query capability.
    pub fn without_query(mut self) -> Self {
        self.supports_query = false;
        self
    }

    pub fn deny_prompt(self) -> Self {
        self.deny.store(true, Ordering::SeqCst);
        self
    }

    /// Delays prompt resolution, letting tests overlap concurrent requests.
    pub fn with_prompt_delay(mut self, delay: Duration) -> Self {
        self.prompt_delay = Some(delay);
        self
    }

    /// Number of user-facing prompts that were issued.
    pub fn prompt_count(&self) -> usize {
        self.prompt_count.load(Ordering::SeqCst)
    }

    /// Pushes a permission change as the platform does when the user edits
    /// site settings.
    pub fn push_change(&self, state: PermissionState) {
        self.state_tx.send_replace(state);
    }
}

#[async_trait]
impl MediaDevices for MockMediaDevices {
    async fn query_microphone(&self) -> Option<PermissionState> {
        self.supports_query.then(|| *self.state_tx.borrow())
    }

    fn watch_microphone(&self) -> Option<watch::Receiver<PermissionState>> {
        self.supports_query.then(|| self.state_tx.subscribe())
    }

    async fn acquire_microphone(&self) -> Result<MediaStream, MediaError> {
        self.prompt_count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.prompt_delay {
            tokio::time::sleep(delay).await;
        }
        if self.deny.load(Ordering::SeqCst) {
            self.state_tx.send_replace(PermissionState::Denied);
            return Err(MediaError::PermissionDenied);
        }
        self.state_tx.send_replace(PermissionState::Granted);
        Ok(MediaStream::new("mock-microphone"))
    }
}
