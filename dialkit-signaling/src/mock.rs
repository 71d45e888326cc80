//! Drivable in-memory user agent and session for tests.
//!
//! Tests emit lifecycle events directly through [`MockSession::emit`] and
//! [`MockUserAgent::emit`]; call-control operations are recorded instead of
//! hitting a real stack.

use crate::agent::{AgentEvent, CallOptions, UserAgent};
use crate::error::{AgentError, SessionError};
use crate::session::{
    AnswerOptions, Direction, IceCandidate, MediaStream, RemoteIdentity, Session, SessionEvent,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_CHANNEL_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOp {
    Answer,
    Terminate,
    Hold { use_update: bool },
    Unhold { use_update: bool },
    Dtmf { digit: char, duration: Duration },
    SetMuted(bool),
}

pub struct MockSession {
    id: Uuid,
    direction: Direction,
    remote: RemoteIdentity,
    events_tx: broadcast::Sender<SessionEvent>,
    ended: AtomicBool,
    fail_answer: AtomicBool,
    local_stream: Mutex<Option<MediaStream>>,
    ops: Mutex<Vec<SessionOp>>,
    released: Mutex<Vec<IceCandidate>>,
}

impl MockSession {
    pub fn new(direction: Direction, remote: RemoteIdentity) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            direction,
            remote,
            events_tx: broadcast::channel(EVENT_CHANNEL_SIZE).0,
            ended: AtomicBool::new(false),
            fail_answer: AtomicBool::new(false),
            local_stream: Mutex::new(None),
            ops: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        })
    }

    /// Emits a lifecycle event to all subscribers. Terminal events also flip
    /// the terminal-state flag, mirroring a real session.
    pub fn emit(&self, event: SessionEvent) {
        if matches!(
            event,
            SessionEvent::Ended { .. } | SessionEvent::Failed { .. }
        ) {
            self.ended.store(true, Ordering::SeqCst);
        }
        if self.events_tx.send(event).is_err() {
            tracing::trace!("No subscribers for mock session event");
        }
    }

    /// Makes the next `answer()` call fail, simulating a stack rejection
    /// after the application has already committed to answering.
    pub fn fail_next_answer(&self) {
        self.fail_answer.store(true, Ordering::SeqCst);
    }

    pub fn set_local_stream(&self, stream: MediaStream) {
        *self.local_stream.lock() = Some(stream);
    }

    pub fn ops(&self) -> Vec<SessionOp> {
        self.ops.lock().clone()
    }

    pub fn released_candidates(&self) -> Vec<IceCandidate> {
        self.released.lock().clone()
    }

    fn record(&self, op: SessionOp) {
        self.ops.lock().push(op);
    }
}

#[async_trait]
impl Session for MockSession {
    fn id(&self) -> Uuid {
        self.id
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn remote_identity(&self) -> RemoteIdentity {
        self.remote.clone()
    }

    fn local_stream(&self) -> Option<MediaStream> {
        self.local_stream.lock().clone()
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    async fn answer(&self, _options: AnswerOptions) -> Result<(), SessionError> {
        if self.fail_answer.swap(false, Ordering::SeqCst) {
            return Err(SessionError::InvalidState("answer rejected".to_string()));
        }
        self.record(SessionOp::Answer);
        Ok(())
    }

    async fn terminate(&self) -> Result<(), SessionError> {
        if self.ended.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Terminated);
        }
        self.record(SessionOp::Terminate);
        self.emit(SessionEvent::Ended {
            cause: "terminated".to_string(),
        });
        Ok(())
    }

    async fn hold(&self, use_update: bool) -> Result<(), SessionError> {
        self.record(SessionOp::Hold { use_update });
        Ok(())
    }

    async fn unhold(&self, use_update: bool) -> Result<(), SessionError> {
        self.record(SessionOp::Unhold { use_update });
        Ok(())
    }

    async fn send_dtmf(&self, digit: char, duration: Duration) -> Result<(), SessionError> {
        self.record(SessionOp::Dtmf { digit, duration });
        Ok(())
    }

    fn set_muted(&self, muted: bool) {
        self.record(SessionOp::SetMuted(muted));
    }

    fn release_candidate(&self, candidate: &IceCandidate) {
        self.released.lock().push(candidate.clone());
    }
}

struct AgentInner {
    events_tx: broadcast::Sender<AgentEvent<MockSession>>,
    started: AtomicBool,
    fail_call: AtomicBool,
    calls: Mutex<Vec<String>>,
    sessions: Mutex<Vec<Arc<MockSession>>>,
}

/// Cheap to clone; all clones share the same agent state, so a test can keep
/// a handle to the instance it hands out.
#[derive(Clone)]
pub struct MockUserAgent {
    inner: Arc<AgentInner>,
}

impl Default for MockUserAgent {
    fn default() -> Self {
        Self {
            inner: Arc::new(AgentInner {
                events_tx: broadcast::channel(EVENT_CHANNEL_SIZE).0,
                started: AtomicBool::new(false),
                fail_call: AtomicBool::new(false),
                calls: Mutex::new(Vec::new()),
                sessions: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl MockUserAgent {
    pub fn emit(&self, event: AgentEvent<MockSession>) {
        if self.inner.events_tx.send(event).is_err() {
            tracing::trace!("No subscribers for mock agent event");
        }
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Makes the next `call()` fail before a session is created.
    pub fn fail_next_call(&self) {
        self.inner.fail_call.store(true, Ordering::SeqCst);
    }

    /// Targets passed to `call()`, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().clone()
    }

    /// Sessions created by `call()`, in order.
    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.inner.sessions.lock().clone()
    }

    /// Delivers a new incoming session, as the stack does on an inbound
    /// INVITE.
    pub fn push_incoming(&self, remote: RemoteIdentity) -> Arc<MockSession> {
        let session = MockSession::new(Direction::Incoming, remote);
        self.emit(AgentEvent::NewSession {
            session: session.clone(),
        });
        session
    }
}

#[async_trait]
impl UserAgent for MockUserAgent {
    type Session = MockSession;

    fn subscribe(&self) -> broadcast::Receiver<AgentEvent<MockSession>> {
        self.inner.events_tx.subscribe()
    }

    async fn start(&self) -> Result<(), AgentError> {
        self.inner.started.store(true, Ordering::SeqCst);
        self.emit(AgentEvent::Connecting);
        self.emit(AgentEvent::Connected);
        Ok(())
    }

    async fn stop(&self) -> Result<(), AgentError> {
        self.inner.started.store(false, Ordering::SeqCst);
        self.emit(AgentEvent::Disconnected { error: None });
        Ok(())
    }

    async fn register(&self) -> Result<(), AgentError> {
        if !self.is_started() {
            return Err(AgentError::NotStarted);
        }
        self.emit(AgentEvent::Registered);
        Ok(())
    }

    async fn unregister(&self, _all: bool) -> Result<(), AgentError> {
        self.emit(AgentEvent::Unregistered);
        Ok(())
    }

    async fn call(
        &self,
        target: &str,
        _options: CallOptions,
    ) -> Result<Arc<MockSession>, AgentError> {
        if self.inner.fail_call.swap(false, Ordering::SeqCst) {
            return Err(AgentError::InvalidTarget(target.to_string()));
        }
        self.inner.calls.lock().push(target.to_string());
        let session = MockSession::new(Direction::Outgoing, RemoteIdentity::new(target));
        self.inner.sessions.lock().push(session.clone());
        Ok(session)
    }
}
