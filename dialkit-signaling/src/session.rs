use crate::error::SessionError;
use crate::rtc::{MediaConstraints, RtcConfig};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Which side of the dialog triggered a hold/unhold transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Originator {
    Local,
    Remote,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteIdentity {
    pub uri: String,
    pub display_name: Option<String>,
}

impl RemoteIdentity {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            display_name: None,
        }
    }

    /// Display name when the remote party provided one, otherwise the URI.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.uri)
    }
}

/// Opaque handle to a platform media stream. The media stack owns the actual
/// tracks; dropping the handle releases them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub id: String,
}

impl MediaStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Host,
    Srflx,
    Prflx,
    Relay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    /// Raw candidate line as produced by the ICE agent.
    pub candidate: String,
    pub kind: CandidateKind,
    pub related_address: Option<String>,
    pub related_port: Option<u16>,
}

impl IceCandidate {
    /// Server-reflexive candidates carrying both related address and port are
    /// safe to hand to the signaling exchange without waiting for gathering
    /// to complete.
    pub fn is_releasable_srflx(&self) -> bool {
        self.kind == CandidateKind::Srflx
            && self.related_address.is_some()
            && self.related_port.is_some()
    }
}

/// Lifecycle events emitted by a signaling session.
///
/// The peer-connection/ontrack pair of the underlying stack is collapsed into
/// [`SessionEvent::TrackAdded`]: the stack announces remote media delivery
/// together with the streams it belongs to.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Progress,
    Accepted,
    Confirmed,
    Failed { cause: String },
    Ended { cause: String },
    Hold { originator: Originator },
    Unhold { originator: Originator },
    TrackAdded { streams: Vec<MediaStream> },
    IceCandidate(IceCandidate),
}

#[derive(Debug, Clone, Default)]
pub struct AnswerOptions {
    pub media: MediaConstraints,
    pub rtc: RtcConfig,
}

/// One SIP call attempt/leg. Implementations wrap a session object of the
/// underlying signaling stack; all call-control operations are delegated
/// verbatim.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    fn id(&self) -> Uuid;
    fn direction(&self) -> Direction;
    fn remote_identity(&self) -> RemoteIdentity;

    /// Local media stream once negotiation has produced one.
    fn local_stream(&self) -> Option<MediaStream>;

    /// Terminal-state query. Used to guard against double-terminate, which
    /// the underlying stack treats as an error.
    fn is_ended(&self) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    async fn answer(&self, options: AnswerOptions) -> Result<(), SessionError>;
    async fn terminate(&self) -> Result<(), SessionError>;
    async fn hold(&self, use_update: bool) -> Result<(), SessionError>;
    async fn unhold(&self, use_update: bool) -> Result<(), SessionError>;
    async fn send_dtmf(&self, digit: char, duration: Duration) -> Result<(), SessionError>;

    /// Enable or disable the local audio senders.
    fn set_muted(&self, muted: bool);

    /// Force-release a gathered candidate to the signaling exchange instead
    /// of waiting for the gathering timeout.
    fn release_candidate(&self, candidate: &IceCandidate);
}
