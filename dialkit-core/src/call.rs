use dialkit_signaling::{Direction, MediaStream, RemoteIdentity, Session};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Application-visible call progression. Ringing of a not-yet-answered
/// incoming call is not a call status; it is represented by the pending
/// incoming slot alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Progress,
    Answered,
    Confirmed,
}

/// The single call the user is engaged with. Created, mutated and destroyed
/// exclusively by the call manager.
pub(crate) struct CallState<S: Session> {
    pub(crate) id: Uuid,
    pub(crate) direction: Direction,
    pub(crate) session: Arc<S>,
    pub(crate) status: CallStatus,
    pub(crate) remote_identity: RemoteIdentity,
    pub(crate) local_stream: Option<MediaStream>,
    pub(crate) remote_stream: Option<MediaStream>,
    pub(crate) start_time: Option<SystemTime>,
    pub(crate) end_time: Option<SystemTime>,
    pub(crate) duration: Duration,
    pub(crate) local_hold: bool,
    pub(crate) remote_hold: bool,
    pub(crate) muted: bool,
    /// Cancels the session event pump on teardown.
    pub(crate) adapter_guard: CancellationToken,
}

impl<S: Session> CallState<S> {
    pub(crate) fn new(session: Arc<S>, adapter_guard: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction: session.direction(),
            remote_identity: session.remote_identity(),
            session,
            status: CallStatus::Progress,
            local_stream: None,
            remote_stream: None,
            start_time: None,
            end_time: None,
            duration: Duration::ZERO,
            local_hold: false,
            remote_hold: false,
            muted: false,
            adapter_guard,
        }
    }

    /// Established once the remote side has accepted.
    pub(crate) fn is_established(&self) -> bool {
        matches!(self.status, CallStatus::Answered | CallStatus::Confirmed)
    }

    /// Hold is only available once the session is established.
    pub(crate) fn can_hold(&self) -> bool {
        self.is_established()
    }

    pub(crate) fn is_held(&self) -> bool {
        self.local_hold || self.remote_hold
    }

    pub(crate) fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            id: self.id,
            direction: self.direction,
            status: self.status,
            remote_identity: self.remote_identity.clone(),
            local_stream: self.local_stream.clone(),
            remote_stream: self.remote_stream.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            duration: self.duration,
            local_hold: self.local_hold,
            remote_hold: self.remote_hold,
            muted: self.muted,
        }
    }
}

/// Read-only view of the active call published to UI surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSnapshot {
    pub id: Uuid,
    pub direction: Direction,
    pub status: CallStatus,
    pub remote_identity: RemoteIdentity,
    pub local_stream: Option<MediaStream>,
    pub remote_stream: Option<MediaStream>,
    pub start_time: Option<SystemTime>,
    pub end_time: Option<SystemTime>,
    pub duration: Duration,
    pub local_hold: bool,
    pub remote_hold: bool,
    pub muted: bool,
}

impl CallSnapshot {
    pub fn is_held(&self) -> bool {
        self.local_hold || self.remote_hold
    }
}
