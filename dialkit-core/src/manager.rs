mod adapter;

use crate::call::{CallSnapshot, CallState};
use crate::config::{DTMF_DURATION, Settings};
use crate::error::Error;
use crate::media::{MediaDevices, MediaPermissions, PermissionGate};
use crate::notify::{Notification, Notifier};
use crate::store::{DISPLAY_NAME_KEY, SETTINGS_KEY, StoreBackend, StoreChange};
use crate::timer::CallTimer;
use dialkit_audio::{AudioBackend, Cue, CuePlayer};
use dialkit_signaling::{
    AgentError, AgentEvent, AnswerOptions, CallOptions, Direction, MediaConstraints,
    RemoteIdentity, Session, SessionEvent, UserAgent,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Builds a user agent from settings. The manager constructs the agent
/// lazily on the first `connect()` and rebuilds it after settings change.
pub trait UserAgentFactory: Send + Sync + 'static {
    type Agent: UserAgent;

    fn build(&self, settings: &Settings) -> Result<Self::Agent, AgentError>;
}

pub(crate) type SessionOf<F> = <<F as UserAgentFactory>::Agent as UserAgent>::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Registered,
}

/// Read-only view of the pending incoming session, before the user answers
/// or rejects it.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingSnapshot {
    pub session_id: Uuid,
    pub remote_identity: RemoteIdentity,
}

/// The observable state shape consumed by UI surfaces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub connection: ConnectionStatus,
    pub active_call: Option<CallSnapshot>,
    pub incoming_call: Option<IncomingSnapshot>,
    pub permissions: MediaPermissions,
    pub display_name: Option<String>,
}

pub(crate) struct IncomingCall<S: Session> {
    pub(crate) session: Arc<S>,
    /// Cancels the watcher that clears the slot if the session ends before
    /// being answered.
    guard: CancellationToken,
}

pub(crate) struct ManagerState<UA: UserAgent> {
    pub(crate) settings: Settings,
    pub(crate) display_name: Option<String>,
    pub(crate) agent: Option<Arc<UA>>,
    pub(crate) connection: ConnectionStatus,
    pub(crate) active_call: Option<CallState<UA::Session>>,
    pub(crate) incoming: Option<IncomingCall<UA::Session>>,
    pub(crate) timer: Option<CallTimer>,
}

/// The call session manager: sole owner of the connection status, the single
/// active call and the single pending incoming call. All mutation funnels
/// through its operations; signaling and platform events are serialized onto
/// the same state lock.
pub struct CallManager<F: UserAgentFactory, B: AudioBackend> {
    inner: Arc<Inner<F, B>>,
}

pub(crate) struct Inner<F: UserAgentFactory, B: AudioBackend> {
    factory: F,
    pub(crate) cues: CuePlayer<B>,
    pub(crate) permissions: PermissionGate,
    store: Arc<dyn StoreBackend>,
    pub(crate) state: Mutex<ManagerState<F::Agent>>,
    snapshot_tx: watch::Sender<Snapshot>,
    snapshot_rx: watch::Receiver<Snapshot>,
    pub(crate) notifier: Notifier,
    /// Session ids with an attached event pump; keeps attachment idempotent.
    pub(crate) attached: parking_lot::Mutex<HashSet<Uuid>>,
    pub(crate) shutdown: CancellationToken,
}

impl<F: UserAgentFactory, B: AudioBackend> CallManager<F, B> {
    pub async fn new(
        factory: F,
        cues: CuePlayer<B>,
        devices: Arc<dyn MediaDevices>,
        store: Arc<dyn StoreBackend>,
        shutdown: CancellationToken,
    ) -> Result<Self, Error> {
        let notifier = Notifier::default();

        let settings = match store.get(SETTINGS_KEY).await.map_err(Error::Store)? {
            Some(raw) => match Settings::from_stored(&raw) {
                Ok(settings) => settings,
                Err(err) => {
                    tracing::warn!(?err, "Stored settings are malformed, using defaults");
                    Settings::default()
                }
            },
            None => Settings::default(),
        };
        let display_name = store.get(DISPLAY_NAME_KEY).await.map_err(Error::Store)?;

        let permissions = PermissionGate::new(devices, notifier.clone());
        permissions.check().await;

        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());
        let store_changes = store.subscribe();

        let inner = Arc::new(Inner {
            factory,
            cues,
            permissions,
            store,
            state: Mutex::new(ManagerState {
                settings,
                display_name,
                agent: None,
                connection: ConnectionStatus::default(),
                active_call: None,
                incoming: None,
                timer: None,
            }),
            snapshot_tx,
            snapshot_rx,
            notifier,
            attached: parking_lot::Mutex::new(HashSet::new()),
            shutdown,
        });

        {
            let state = inner.state.lock().await;
            inner.publish(&state);
        }

        let permission_changes = inner.permissions.subscribe();
        tokio::spawn(Inner::permissions_pump(inner.clone(), permission_changes));
        tokio::spawn(Inner::store_pump(inner.clone(), store_changes));

        Ok(Self { inner })
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifier.subscribe()
    }

    pub fn permission_gate(&self) -> &PermissionGate {
        &self.inner.permissions
    }

    pub async fn settings(&self) -> Settings {
        self.inner.state.lock().await.settings.clone()
    }

    /// Idempotent: builds the user agent from settings on first use and
    /// starts the transport. No-op while already connecting or connected.
    pub async fn connect(&self) -> Result<(), Error> {
        let mut state = self.inner.state.lock().await;
        if state.connection != ConnectionStatus::Disconnected {
            tracing::debug!(status = ?state.connection, "Already connected, ignoring connect");
            return Ok(());
        }

        let agent = if let Some(agent) = state.agent.clone() {
            agent
        } else {
            if let Err(err) = state.settings.validate() {
                self.inner.notifier.error(format!("Invalid settings: {err}"));
                return Err(err.into());
            }
            let agent = match self.inner.factory.build(&state.settings) {
                Ok(agent) => Arc::new(agent),
                Err(err) => {
                    tracing::warn!(?err, "Failed to build user agent");
                    self.inner
                        .notifier
                        .error(format!("Connection failed: {err}"));
                    return Err(err.into());
                }
            };
            let events = agent.subscribe();
            tokio::spawn(Inner::agent_pump(self.inner.clone(), events));
            state.agent = Some(agent.clone());
            agent
        };

        state.connection = ConnectionStatus::Connecting;
        self.inner.publish(&state);
        drop(state);

        if let Err(err) = agent.start().await {
            tracing::warn!(?err, "Failed to start transport");
            self.inner
                .notifier
                .error(format!("Connection failed: {err}"));
            let mut state = self.inner.state.lock().await;
            state.connection = ConnectionStatus::Disconnected;
            self.inner.publish(&state);
            return Err(err.into());
        }
        Ok(())
    }

    /// Stops the transport. An active call is not ended implicitly; hang up
    /// first, or the signaling layer ends the session on transport loss.
    pub async fn disconnect(&self) {
        let agent = { self.inner.state.lock().await.agent.clone() };
        let Some(agent) = agent else {
            tracing::debug!("Disconnect without initialized agent");
            return;
        };
        if let Err(err) = agent.stop().await {
            tracing::warn!(?err, "Failed to stop transport");
        }
        let mut state = self.inner.state.lock().await;
        state.connection = ConnectionStatus::Disconnected;
        self.inner.publish(&state);
    }

    pub async fn register(&self) {
        let agent = { self.inner.state.lock().await.agent.clone() };
        let Some(agent) = agent else {
            tracing::debug!("Register without initialized agent");
            return;
        };
        if let Err(err) = agent.register().await {
            tracing::warn!(?err, "Registration request failed");
            self.inner
                .notifier
                .error(format!("Registration failed: {err}"));
        }
    }

    pub async fn unregister(&self, all: bool) {
        let agent = { self.inner.state.lock().await.agent.clone() };
        let Some(agent) = agent else {
            tracing::debug!("Unregister without initialized agent");
            return;
        };
        if let Err(err) = agent.unregister(all).await {
            tracing::warn!(?err, "Unregister request failed");
        }
    }

    /// Places an outgoing call. Returns the new call id, or `None` when a
    /// precondition is unmet; precondition failures surface only as
    /// notifications, never as errors.
    pub async fn call(&self, target: &str) -> Option<Uuid> {
        let mut state = self.inner.state.lock().await;
        let Some(agent) = state.agent.clone() else {
            tracing::warn!(uri = target, "Call attempted before connecting");
            self.inner
                .notifier
                .warning("Not connected. Check your settings and connect first.");
            return None;
        };
        if state.active_call.is_some() {
            tracing::warn!(uri = target, "Call attempted while another call is active");
            self.inner.notifier.warning("A call is already in progress");
            return None;
        }

        let options = CallOptions {
            media: MediaConstraints::audio_only(),
            rtc: state.settings.rtc.clone(),
            session_timers: state.settings.session_timers,
        };
        match agent.call(target, options).await {
            Ok(session) => {
                let call_id = self.inner.begin_call(&mut state, session);
                self.inner.cues.play(Cue::Ringback);
                self.inner.publish(&state);
                Some(call_id)
            }
            Err(err) => {
                tracing::warn!(?err, uri = target, "Failed to place call");
                self.inner.notifier.error(format!("Call failed: {err}"));
                None
            }
        }
    }

    /// Promotes the pending incoming session into the active call. The
    /// promotion is visible before the underlying answer is issued; if the
    /// stack rejects the answer the promoted call is kept (the signaling
    /// layer may already be responding) and recovery is `hang_up()`.
    pub async fn answer_incoming(&self) {
        let mut state = self.inner.state.lock().await;
        if state.active_call.is_some() {
            tracing::warn!("Answer attempted while another call is active");
            self.inner.notifier.warning("A call is already in progress");
            return;
        }
        let Some(incoming) = state.incoming.take() else {
            tracing::debug!("Answer without pending incoming call");
            return;
        };
        incoming.guard.cancel();
        self.inner.cues.stop(Cue::Ringing);

        let session = incoming.session;
        self.inner.begin_call(&mut state, session.clone());
        self.inner.publish(&state);

        let options = AnswerOptions {
            media: MediaConstraints::audio_only(),
            rtc: state.settings.rtc.clone(),
        };
        if let Err(err) = session.answer(options).await {
            tracing::warn!(?err, "Failed to answer incoming session");
            self.inner
                .notifier
                .error(format!("Failed to answer call: {err}"));
        }
    }

    /// Terminates the pending incoming session without ever creating a call.
    pub async fn reject_incoming(&self) {
        let mut state = self.inner.state.lock().await;
        let Some(incoming) = state.incoming.take() else {
            tracing::debug!("Reject without pending incoming call");
            return;
        };
        incoming.guard.cancel();
        self.inner.cues.stop(Cue::Ringing);
        self.inner.publish(&state);
        drop(state);

        if !incoming.session.is_ended()
            && let Err(err) = incoming.session.terminate().await
        {
            tracing::warn!(?err, "Failed to terminate rejected session");
        }
    }

    /// Terminates the active call's session unless it is already terminal.
    /// State teardown is driven by the resulting ended event. No-op without
    /// an active call.
    pub async fn hang_up(&self) {
        let session = {
            let state = self.inner.state.lock().await;
            match &state.active_call {
                Some(call) => call.session.clone(),
                None => {
                    tracing::debug!("Hang up without active call");
                    return;
                }
            }
        };
        if !session.is_ended()
            && let Err(err) = session.terminate().await
        {
            tracing::warn!(?err, "Failed to terminate session");
        }
    }

    pub async fn hold(&self) {
        self.set_hold(true).await;
    }

    pub async fn resume(&self) {
        self.set_hold(false).await;
    }

    async fn set_hold(&self, hold: bool) {
        let (session, use_update) = {
            let state = self.inner.state.lock().await;
            let Some(call) = &state.active_call else {
                tracing::debug!(hold, "Hold change without active call");
                return;
            };
            if !call.can_hold() {
                tracing::warn!(status = ?call.status, "Hold change before call is established");
                self.inner.notifier.warning("Call is not established yet");
                return;
            }
            (call.session.clone(), state.settings.hold_with_update)
        };
        let res = if hold {
            session.hold(use_update).await
        } else {
            session.unhold(use_update).await
        };
        if let Err(err) = res {
            tracing::warn!(?err, hold, "Hold change failed");
            self.inner
                .notifier
                .error(format!("Failed to update hold state: {err}"));
        }
        // The hold flag flips when the session confirms with a hold/unhold
        // event carrying the local originator.
    }

    pub async fn set_muted(&self, muted: bool) {
        let mut state = self.inner.state.lock().await;
        let Some(call) = state.active_call.as_mut() else {
            tracing::debug!(muted, "Mute change without active call");
            return;
        };
        call.session.set_muted(muted);
        call.muted = muted;
        self.inner.publish(&state);
    }

    pub async fn send_dtmf(&self, digit: char) {
        if !is_dtmf_digit(digit) {
            tracing::warn!(%digit, "Refusing invalid DTMF digit");
            return;
        }
        let session = {
            let state = self.inner.state.lock().await;
            match &state.active_call {
                Some(call) if call.is_established() => call.session.clone(),
                Some(call) => {
                    tracing::warn!(status = ?call.status, "DTMF before call is established");
                    return;
                }
                None => {
                    tracing::debug!("DTMF without active call");
                    return;
                }
            }
        };
        if let Err(err) = session.send_dtmf(digit, DTMF_DURATION).await {
            tracing::warn!(?err, %digit, "Failed to send DTMF");
        }
    }

    pub async fn set_display_name(&self, name: &str) -> Result<(), Error> {
        self.inner
            .store
            .set(DISPLAY_NAME_KEY, name.to_string())
            .await
            .map_err(Error::Store)?;
        let mut state = self.inner.state.lock().await;
        state.display_name = Some(name.to_string());
        self.inner.publish(&state);
        Ok(())
    }

    /// Persists new settings. The running user agent keeps its configuration;
    /// it is rebuilt on the next connect once idle.
    pub async fn save_settings(&self, settings: Settings) -> Result<(), Error> {
        if let Err(err) = settings.validate() {
            self.inner.notifier.error(format!("Invalid settings: {err}"));
            return Err(err.into());
        }
        let raw = settings.to_stored()?;
        self.inner
            .store
            .set(SETTINGS_KEY, raw)
            .await
            .map_err(Error::Store)?;
        let mut state = self.inner.state.lock().await;
        state.settings = settings;
        self.inner.reset_agent_if_idle(&mut state);
        Ok(())
    }
}

impl<F: UserAgentFactory, B: AudioBackend> Drop for CallManager<F, B> {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl<F: UserAgentFactory, B: AudioBackend> Inner<F, B> {
    /// Attaches the event adapter and installs the new active call. The
    /// caller must have verified the active-call slot is empty.
    fn begin_call(self: &Arc<Self>, state: &mut ManagerState<F::Agent>, session: Arc<SessionOf<F>>) -> Uuid {
        let guard = self.shutdown.child_token();
        adapter::attach(self, session.clone(), guard.clone());
        let call = CallState::new(session, guard);
        let id = call.id;
        state.active_call = Some(call);
        id
    }

    pub(crate) fn publish(&self, state: &ManagerState<F::Agent>) {
        let snapshot = Snapshot {
            connection: state.connection,
            active_call: state.active_call.as_ref().map(CallState::snapshot),
            incoming_call: state.incoming.as_ref().map(|incoming| IncomingSnapshot {
                session_id: incoming.session.id(),
                remote_identity: incoming.session.remote_identity(),
            }),
            permissions: self.permissions.permissions(),
            display_name: state.display_name.clone(),
        };
        self.snapshot_tx.send_replace(snapshot);
    }

    pub(crate) fn spawn_call_timer(self: &Arc<Self>) -> CallTimer {
        let inner = self.clone();
        CallTimer::spawn(&self.shutdown, move || {
            let inner = inner.clone();
            async move {
                let mut state = inner.state.lock().await;
                let Some(call) = state.active_call.as_mut() else {
                    return false;
                };
                let Some(start) = call.start_time else {
                    return false;
                };
                let elapsed = start.elapsed().unwrap_or(Duration::ZERO);
                call.duration = Duration::from_secs(elapsed.as_secs());
                inner.publish(&state);
                true
            }
        })
    }

    fn reset_agent_if_idle(&self, state: &mut ManagerState<F::Agent>) {
        if state.agent.is_none() {
            return;
        }
        if state.connection == ConnectionStatus::Disconnected
            && state.active_call.is_none()
            && state.incoming.is_none()
        {
            tracing::debug!("Dropping user agent so new settings apply on next connect");
            state.agent = None;
        } else {
            self.notifier.info("Settings saved. Reconnect to apply them.");
        }
    }

    async fn agent_pump(
        inner: Arc<Self>,
        mut events: broadcast::Receiver<AgentEvent<SessionOf<F>>>,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = inner.shutdown.cancelled() => break,

                event = events.recv() => match event {
                    Ok(event) => inner.handle_agent_event(event).await,
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Agent event stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        tracing::trace!("Agent event pump finished");
    }

    async fn handle_agent_event(self: &Arc<Self>, event: AgentEvent<SessionOf<F>>) {
        match event {
            AgentEvent::Connecting => self.set_connection(ConnectionStatus::Connecting).await,
            AgentEvent::Connected => self.set_connection(ConnectionStatus::Connected).await,
            AgentEvent::Disconnected { error } => {
                if let Some(error) = &error {
                    tracing::warn!(%error, "Transport disconnected");
                    self.notifier.error(format!("Connection lost: {error}"));
                } else {
                    tracing::debug!("Transport disconnected");
                }
                // No automatic reconnect; the host decides when to retry.
                self.set_connection(ConnectionStatus::Disconnected).await;
            }
            AgentEvent::Registered => {
                self.set_connection(ConnectionStatus::Registered).await;
            }
            AgentEvent::Unregistered => {
                let mut state = self.state.lock().await;
                if state.connection == ConnectionStatus::Registered {
                    state.connection = ConnectionStatus::Connected;
                    self.publish(&state);
                }
            }
            AgentEvent::RegistrationFailed { cause } => {
                tracing::warn!(%cause, "Registration failed");
                self.notifier.error(format!("Registration failed: {cause}"));
                let mut state = self.state.lock().await;
                if state.connection == ConnectionStatus::Registered {
                    state.connection = ConnectionStatus::Connected;
                    self.publish(&state);
                }
            }
            AgentEvent::NewSession { session } => self.handle_new_session(session).await,
        }
    }

    async fn set_connection(&self, status: ConnectionStatus) {
        let mut state = self.state.lock().await;
        if state.connection != status {
            tracing::debug!(?status, "Connection status changed");
            state.connection = status;
            self.publish(&state);
        }
    }

    async fn handle_new_session(self: &Arc<Self>, session: Arc<SessionOf<F>>) {
        if session.direction() != Direction::Incoming {
            // Outgoing sessions are adopted by call() directly.
            tracing::trace!("Ignoring announcement of outgoing session");
            return;
        }

        let remote = session.remote_identity();
        let mut state = self.state.lock().await;
        if state.active_call.is_some() || state.incoming.is_some() {
            tracing::debug!(remote = %remote.label(), "Busy, rejecting additional incoming session");
            drop(state);
            if !session.is_ended()
                && let Err(err) = session.terminate().await
            {
                tracing::warn!(?err, "Failed to reject incoming session");
            }
            return;
        }

        tracing::info!(remote = %remote.label(), "Incoming call");
        let guard = self.shutdown.child_token();
        let events = session.subscribe();
        tokio::spawn(Self::unanswered_watch(
            self.clone(),
            session.clone(),
            events,
            guard.clone(),
        ));

        state.incoming = Some(IncomingCall { session, guard });
        self.cues.play(Cue::Ringing);
        self.notifier
            .info(format!("Incoming call from {}", remote.label()));
        self.publish(&state);
    }

    /// Clears the pending incoming slot if its session terminates before the
    /// user answers or rejects. Cancelled on answer/reject.
    async fn unanswered_watch(
        inner: Arc<Self>,
        session: Arc<SessionOf<F>>,
        mut events: broadcast::Receiver<SessionEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return,

                event = events.recv() => match event {
                    Ok(SessionEvent::Ended { .. } | SessionEvent::Failed { .. }) => break,
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Pending session event stream lagged");
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        }

        let mut state = inner.state.lock().await;
        let Some(incoming) = &state.incoming else {
            return;
        };
        if incoming.session.id() != session.id() {
            return;
        }
        state.incoming = None;
        inner.cues.stop(Cue::Ringing);
        inner
            .notifier
            .warning(format!("Missed call from {}", session.remote_identity().label()));
        inner.publish(&state);
    }

    async fn permissions_pump(inner: Arc<Self>, mut changes: watch::Receiver<MediaPermissions>) {
        loop {
            tokio::select! {
                biased;

                _ = inner.shutdown.cancelled() => break,

                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = inner.state.lock().await;
                    inner.publish(&state);
                }
            }
        }
        tracing::trace!("Permission mirror finished");
    }

    async fn store_pump(inner: Arc<Self>, mut changes: broadcast::Receiver<StoreChange>) {
        loop {
            tokio::select! {
                biased;

                _ = inner.shutdown.cancelled() => break,

                change = changes.recv() => match change {
                    Ok(change) => inner.apply_store_change(change).await,
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Store change stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        tracing::trace!("Store change mirror finished");
    }

    async fn apply_store_change(&self, change: StoreChange) {
        match change.key.as_str() {
            SETTINGS_KEY => {
                let Some(raw) = change.value else { return };
                match Settings::from_stored(&raw) {
                    Ok(settings) => {
                        let mut state = self.state.lock().await;
                        if state.settings != settings {
                            tracing::debug!("Applying settings changed in another context");
                            state.settings = settings;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(?err, "Ignoring malformed settings from store change");
                    }
                }
            }
            DISPLAY_NAME_KEY => {
                let mut state = self.state.lock().await;
                if state.display_name != change.value {
                    state.display_name = change.value;
                    self.publish(&state);
                }
            }
            _ => {}
        }
    }
}

fn is_dtmf_digit(digit: char) -> bool {
    digit.is_ascii_digit()
        || matches!(digit.to_ascii_uppercase(), 'A'..='D')
        || digit == '*'
        || digit == '#'
}
