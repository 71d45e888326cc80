use dialkit_audio::mock::MockBackend;
use dialkit_audio::{CuePlayer, CuePlayerConfig};
use dialkit_core::media::mock::MockMediaDevices;
use dialkit_core::store::SETTINGS_KEY;
use dialkit_core::store::memory::MemoryStore;
use dialkit_core::{
    CallManager, Notification, PermissionState, Settings, Snapshot, StoreBackend,
    UserAgentFactory,
};
use dialkit_signaling::mock::{MockSession, MockUserAgent};
use dialkit_signaling::{AgentError, RemoteIdentity, SessionEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Hands the manager a shared clone of the rig's agent, counting builds.
pub struct MockFactory {
    agent: MockUserAgent,
    builds: Arc<AtomicUsize>,
}

impl UserAgentFactory for MockFactory {
    type Agent = MockUserAgent;

    fn build(&self, _settings: &Settings) -> Result<MockUserAgent, AgentError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.agent.clone())
    }
}

#[allow(unused)]
pub struct TestRig {
    pub manager: CallManager<MockFactory, MockBackend>,
    pub agent: MockUserAgent,
    pub audio: MockBackend,
    pub devices: Arc<MockMediaDevices>,
    pub store: Arc<MemoryStore>,
    pub builds: Arc<AtomicUsize>,
    notifications: broadcast::Receiver<Notification>,
}

#[allow(unused)]
impl TestRig {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        store
            .set(SETTINGS_KEY, test_settings().to_stored().unwrap())
            .await
            .unwrap();

        let audio = MockBackend::default();
        let cues = CuePlayer::new(&audio, CuePlayerConfig::default()).unwrap();
        let devices = Arc::new(MockMediaDevices::new(PermissionState::Granted));
        let agent = MockUserAgent::default();
        let builds = Arc::new(AtomicUsize::new(0));
        let factory = MockFactory {
            agent: agent.clone(),
            builds: builds.clone(),
        };

        let manager = CallManager::new(
            factory,
            cues,
            devices.clone(),
            store.clone(),
            CancellationToken::new(),
        )
        .await
        .expect("Failed to build call manager");
        let notifications = manager.notifications();

        Self {
            manager,
            agent,
            audio,
            devices,
            store,
            builds,
            notifications,
        }
    }

    /// Connects and registers, waiting for the agent events to settle.
    pub async fn connect_registered(&self) {
        self.manager.connect().await.expect("Failed to connect");
        settle().await;
        self.manager.register().await;
        settle().await;
    }

    /// Places an outgoing call and returns the mock session backing it.
    pub async fn place_call(&self, target: &str) -> Arc<MockSession> {
        let call_id = self.manager.call(target).await;
        assert!(call_id.is_some(), "Call was refused");
        settle().await;
        self.agent
            .sessions()
            .last()
            .expect("No session created")
            .clone()
    }

    /// Places a call and drives it to established.
    pub async fn establish_call(&self, target: &str) -> Arc<MockSession> {
        let session = self.place_call(target).await;
        session.emit(SessionEvent::Accepted);
        session.emit(SessionEvent::Confirmed);
        settle().await;
        session
    }

    /// Delivers an incoming session and waits for the manager to adopt it.
    pub async fn push_incoming(&self, uri: &str) -> Arc<MockSession> {
        let session = self.agent.push_incoming(RemoteIdentity::new(uri));
        settle().await;
        session
    }

    pub fn snapshot(&self) -> Snapshot {
        self.manager.snapshot()
    }

    /// Scans buffered notifications for one matching the predicate.
    pub async fn expect_notification<P>(&mut self, predicate: P) -> Notification
    where
        P: Fn(&Notification) -> bool,
    {
        loop {
            match tokio::time::timeout(Duration::from_millis(200), self.notifications.recv())
                .await
            {
                Ok(Ok(notification)) => {
                    if predicate(&notification) {
                        return notification;
                    }
                }
                _ => panic!("Expected notification did not arrive"),
            }
        }
    }

    /// Drops any buffered notifications.
    pub fn drain_notifications(&mut self) {
        while self.notifications.try_recv().is_ok() {}
    }
}

#[allow(unused)]
pub fn test_settings() -> Settings {
    Settings {
        uri: "sip:agent@pbx.example.com".to_string(),
        password: "secret".to_string(),
        websocket_uri: "wss://pbx.example.com:7443".to_string(),
        ..Settings::default()
    }
}

/// Lets spawned event pumps drain their queues.
#[allow(unused)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
