pub mod call;
pub mod config;
pub mod error;
pub mod manager;
pub mod media;
pub mod notify;
pub mod store;
mod timer;

pub use call::{CallSnapshot, CallStatus};
pub use config::{Settings, TransportKind};
pub use error::{Error, SettingsError};
pub use manager::{CallManager, ConnectionStatus, IncomingSnapshot, Snapshot, UserAgentFactory};
pub use media::{MediaDevices, MediaError, MediaPermissions, PermissionGate, PermissionState};
pub use notify::{Notification, NotificationKind, Notifier};
pub use store::{DISPLAY_NAME_KEY, SETTINGS_KEY, StoreBackend, StoreChange};
