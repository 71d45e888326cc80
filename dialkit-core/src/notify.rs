use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

const NOTIFICATION_CHANNEL_SIZE: usize = 32;

const ERROR_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_DURATION: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

/// Ephemeral, fire-and-forget user-facing message. Auto-expiry after
/// `duration` is the consumer's job.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub duration: Duration,
}

impl Notification {
    fn new(kind: NotificationKind, message: String) -> Self {
        let duration = match kind {
            NotificationKind::Error => ERROR_DURATION,
            _ => DEFAULT_DURATION,
        };
        Self {
            id: Uuid::new_v4(),
            kind,
            message,
            duration,
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self {
            tx: broadcast::channel(NOTIFICATION_CHANNEL_SIZE).0,
        }
    }
}

impl Notifier {
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn success(&self, message: impl Into<String>) {
        self.send(NotificationKind::Success, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(NotificationKind::Error, message.into());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.send(NotificationKind::Warning, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.send(NotificationKind::Info, message.into());
    }

    fn send(&self, kind: NotificationKind, message: String) {
        tracing::debug!(?kind, %message, "Emitting notification");
        if self.tx.send(Notification::new(kind, message)).is_err() {
            tracing::trace!("No notification subscribers");
        }
    }
}
