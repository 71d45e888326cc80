//! Translates the lifecycle events of one signaling session into call-state
//! mutations and audio side effects.

use crate::call::CallStatus;
use crate::manager::{Inner, ManagerState, SessionOf, UserAgentFactory};
use dialkit_audio::{AudioBackend, Cue};
use dialkit_signaling::{Direction, Originator, Session, SessionEvent};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

/// Attaches the event pump to a session exactly once. Re-attachment (a host
/// remount without teardown) keeps the original pump.
pub(crate) fn attach<F, B>(
    inner: &Arc<Inner<F, B>>,
    session: Arc<SessionOf<F>>,
    cancel: CancellationToken,
) where
    F: UserAgentFactory,
    B: AudioBackend,
{
    let id = session.id();
    if !inner.attached.lock().insert(id) {
        tracing::debug!(session = %id, "Session listeners already attached");
        return;
    }
    let events = session.subscribe();
    tokio::spawn(pump(inner.clone(), session, events, cancel));
}

async fn pump<F, B>(
    inner: Arc<Inner<F, B>>,
    session: Arc<SessionOf<F>>,
    mut events: broadcast::Receiver<SessionEvent>,
    cancel: CancellationToken,
) where
    F: UserAgentFactory,
    B: AudioBackend,
{
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            event = events.recv() => match event {
                Ok(event) => {
                    if handle_event(&inner, &session, event).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Session event stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
    inner.attached.lock().remove(&session.id());
    tracing::trace!(session = %session.id(), "Session event pump finished");
}

/// Returns `true` once the pump should detach.
async fn handle_event<F, B>(
    inner: &Arc<Inner<F, B>>,
    session: &Arc<SessionOf<F>>,
    event: SessionEvent,
) -> bool
where
    F: UserAgentFactory,
    B: AudioBackend,
{
    let mut state = inner.state.lock().await;
    let is_active = state
        .active_call
        .as_ref()
        .is_some_and(|call| call.session.id() == session.id());
    if !is_active {
        tracing::trace!(session = %session.id(), "Event for a session that is no longer the active call");
        return true;
    }

    match event {
        SessionEvent::Progress => {
            // Remote ringing; the ringback cue is already running for
            // outgoing calls.
        }
        SessionEvent::Accepted => {
            if let Some(call) = state.active_call.as_mut() {
                call.status = CallStatus::Answered;
                if call.start_time.is_none() {
                    call.start_time = Some(SystemTime::now());
                }
                if call.local_stream.is_none() {
                    call.local_stream = session.local_stream();
                }
            }
            inner.cues.stop(Cue::Ringback);
            inner.cues.play(Cue::Answered);
            state.timer = Some(inner.spawn_call_timer());
        }
        SessionEvent::Confirmed => {
            if let Some(call) = state.active_call.as_mut() {
                call.status = CallStatus::Confirmed;
            }
        }
        SessionEvent::Hold { originator } => {
            apply_hold(inner, &mut state, originator, true);
        }
        SessionEvent::Unhold { originator } => {
            apply_hold(inner, &mut state, originator, false);
        }
        SessionEvent::TrackAdded { streams } => {
            if let Some(call) = state.active_call.as_mut()
                && call.remote_stream.is_none()
                && let Some(stream) = streams.first()
            {
                call.remote_stream = Some(stream.clone());
            }
            // Later tracks never displace an established stream reference.
        }
        SessionEvent::IceCandidate(candidate) => {
            if candidate.is_releasable_srflx() {
                tracing::trace!(candidate = %candidate.candidate, "Releasing srflx candidate early");
                session.release_candidate(&candidate);
            }
        }
        SessionEvent::Failed { cause } => {
            teardown(inner, &mut state, true, &cause);
            inner.publish(&state);
            return true;
        }
        SessionEvent::Ended { cause } => {
            teardown(inner, &mut state, false, &cause);
            inner.publish(&state);
            return true;
        }
    }

    inner.publish(&state);
    false
}

/// Each hold/unhold event sets exactly its own side's flag; the moh cue
/// follows the transition of "either side holds".
fn apply_hold<F, B>(
    inner: &Arc<Inner<F, B>>,
    state: &mut ManagerState<F::Agent>,
    originator: Originator,
    held: bool,
) where
    F: UserAgentFactory,
    B: AudioBackend,
{
    let Some(call) = state.active_call.as_mut() else {
        return;
    };
    let was_held = call.is_held();
    match originator {
        Originator::Local => call.local_hold = held,
        Originator::Remote => call.remote_hold = held,
    }
    let now_held = call.is_held();

    if now_held != was_held {
        if now_held {
            inner.cues.play(Cue::Moh);
        } else {
            inner.cues.stop(Cue::Moh);
        }
    }
}

fn teardown<F, B>(
    inner: &Arc<Inner<F, B>>,
    state: &mut ManagerState<F::Agent>,
    failed: bool,
    cause: &str,
) where
    F: UserAgentFactory,
    B: AudioBackend,
{
    let Some(mut call) = state.active_call.take() else {
        return;
    };
    call.end_time = Some(SystemTime::now());
    call.adapter_guard.cancel();
    if let Some(timer) = state.timer.take() {
        timer.stop();
    }

    inner.cues.stop_all();
    if failed && call.direction == Direction::Outgoing {
        inner.cues.play(Cue::Rejected);
    }

    let remote = call.remote_identity.label();
    if failed {
        tracing::warn!(cause, remote, "Call failed");
        inner.notifier.error(format!("Call failed: {cause}"));
    } else {
        tracing::info!(cause, remote, "Call ended");
        inner.notifier.info(format!("Call ended: {cause}"));
    }
}
