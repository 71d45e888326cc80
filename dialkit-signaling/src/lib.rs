pub mod agent;
pub mod error;
pub mod rtc;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use agent::{AgentEvent, CallOptions, UserAgent};
pub use error::{AgentError, SessionError};
pub use rtc::{IceServer, MediaConstraints, RtcConfig};
pub use session::{
    AnswerOptions, CandidateKind, Direction, IceCandidate, MediaStream, Originator,
    RemoteIdentity, Session, SessionEvent,
};
