#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

use crate::notify::Notifier;
use async_trait::async_trait;
use dialkit_signaling::MediaStream;
use thiserror::Error;
use tokio::sync::{Mutex, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaPermissions {
    pub microphone: PermissionState,
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("microphone access denied")]
    PermissionDenied,
    #[error("no microphone available")]
    DeviceUnavailable,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The platform's permission-query and media-acquisition surface.
#[async_trait]
pub trait MediaDevices: Send + Sync + 'static {
    /// Current microphone permission state, `None` when the platform has no
    /// permission-query capability.
    async fn query_microphone(&self) -> Option<PermissionState>;

    /// Change notifications for the microphone permission, when supported.
    fn watch_microphone(&self) -> Option<watch::Receiver<PermissionState>>;

    /// Prompts for microphone access and returns the acquired stream.
    async fn acquire_microphone(&self) -> Result<MediaStream, MediaError>;
}

/// Tracks microphone permission and guarantees at most one concurrent
/// permission prompt.
pub struct PermissionGate {
    devices: std::sync::Arc<dyn MediaDevices>,
    state_tx: watch::Sender<MediaPermissions>,
    request_lock: Mutex<()>,
    notifier: Notifier,
}

impl PermissionGate {
    pub fn new(devices: std::sync::Arc<dyn MediaDevices>, notifier: Notifier) -> Self {
        let (state_tx, _) = watch::channel(MediaPermissions::default());
        Self {
            devices,
            state_tx,
            request_lock: Mutex::new(()),
            notifier,
        }
    }

    pub fn permissions(&self) -> MediaPermissions {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MediaPermissions> {
        self.state_tx.subscribe()
    }

    /// Reads the current permission state and mirrors subsequent platform
    /// change notifications into [`MediaPermissions`].
    pub async fn check(&self) {
        if let Some(state) = self.devices.query_microphone().await {
            tracing::debug!(?state, "Microphone permission state queried");
            self.set(state);
        }

        if let Some(mut rx) = self.devices.watch_microphone() {
            let state_tx = self.state_tx.clone();
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let state = *rx.borrow();
                    tracing::debug!(?state, "Microphone permission changed");
                    state_tx.send_modify(|p| p.microphone = state);
                }
                tracing::trace!("Microphone permission watch closed");
            });
        }
    }

    /// Requests microphone access. The acquired stream is only a permission
    /// probe and is released immediately. Concurrent callers share one
    /// prompt: whoever loses the race re-reads the settled state.
    pub async fn request(&self) -> bool {
        if self.permissions().microphone == PermissionState::Granted {
            return true;
        }

        let _guard = self.request_lock.lock().await;
        match self.permissions().microphone {
            PermissionState::Granted => return true,
            PermissionState::Denied => {
                self.notifier
                    .error("Microphone access is blocked. Allow it in your browser settings.");
                return false;
            }
            PermissionState::Prompt | PermissionState::Unknown => {}
        }

        match self.devices.acquire_microphone().await {
            Ok(stream) => {
                // Probe only; the call path acquires its own stream.
                drop(stream);
                self.set(PermissionState::Granted);
                self.notifier.success("Microphone access granted");
                true
            }
            Err(err) => {
                tracing::warn!(?err, "Microphone request failed");
                self.set(PermissionState::Denied);
                self.notifier.error("Microphone access denied");
                false
            }
        }
    }

    fn set(&self, state: PermissionState) {
        self.state_tx.send_modify(|p| p.microphone = state);
    }
}
