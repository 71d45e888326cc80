use crate::error::AgentError;
use crate::rtc::{MediaConstraints, RtcConfig};
use crate::session::Session;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub media: MediaConstraints,
    pub rtc: RtcConfig,
    pub session_timers: bool,
}

/// Transport, registration and session-creation events emitted by a user
/// agent.
#[derive(Debug)]
pub enum AgentEvent<S> {
    Connecting,
    Connected,
    Disconnected { error: Option<String> },
    Registered,
    Unregistered,
    RegistrationFailed { cause: String },
    NewSession { session: Arc<S> },
}

// Derived Clone would require S: Clone; sessions are always shared via Arc.
impl<S> Clone for AgentEvent<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Connecting => Self::Connecting,
            Self::Connected => Self::Connected,
            Self::Disconnected { error } => Self::Disconnected {
                error: error.clone(),
            },
            Self::Registered => Self::Registered,
            Self::Unregistered => Self::Unregistered,
            Self::RegistrationFailed { cause } => Self::RegistrationFailed {
                cause: cause.clone(),
            },
            Self::NewSession { session } => Self::NewSession {
                session: session.clone(),
            },
        }
    }
}

/// The signaling client instance: manages the websocket transport, SIP
/// registration and session creation. Consumed as an opaque collaborator;
/// implementations bind a concrete SIP stack.
#[async_trait]
pub trait UserAgent: Send + Sync + 'static {
    type Session: Session;

    fn subscribe(&self) -> broadcast::Receiver<AgentEvent<Self::Session>>;

    /// Starts the transport. Returns once the connection attempt has been
    /// issued; the outcome arrives as `Connected`/`Disconnected` events.
    async fn start(&self) -> Result<(), AgentError>;
    async fn stop(&self) -> Result<(), AgentError>;

    async fn register(&self) -> Result<(), AgentError>;
    async fn unregister(&self, all: bool) -> Result<(), AgentError>;

    /// Creates an outgoing session towards `target`. The returned session is
    /// in its initial state; call progress arrives through session events.
    async fn call(
        &self,
        target: &str,
        options: CallOptions,
    ) -> Result<Arc<Self::Session>, AgentError>;
}
