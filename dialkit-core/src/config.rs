use crate::error::SettingsError;
use dialkit_signaling::RtcConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DTMF_DURATION: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Wss,
    Ws,
}

/// SIP credentials and transport configuration. Immutable input to user-agent
/// construction; applying changed settings requires tearing the agent down
/// and re-creating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub uri: String,
    pub password: String,
    pub websocket_uri: String,
    pub transport: TransportKind,
    pub registrar_server: Option<String>,
    pub contact_uri: Option<String>,
    pub authorization_user: Option<String>,
    pub instance_id: Option<String>,
    pub session_timers: bool,
    /// Signal hold/unhold with UPDATE instead of re-INVITE.
    pub hold_with_update: bool,
    pub rtc: RtcConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            uri: String::new(),
            password: String::new(),
            websocket_uri: String::new(),
            transport: TransportKind::default(),
            registrar_server: None,
            contact_uri: None,
            authorization_user: None,
            instance_id: None,
            session_timers: true,
            hold_with_update: false,
            rtc: RtcConfig::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.uri.starts_with("sip:") && !self.uri.starts_with("sips:") {
            return Err(SettingsError::InvalidUri(self.uri.clone()));
        }
        let ws = Url::parse(&self.websocket_uri)
            .map_err(|_| SettingsError::InvalidWebsocketUri(self.websocket_uri.clone()))?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            return Err(SettingsError::InvalidWebsocketUri(
                self.websocket_uri.clone(),
            ));
        }
        Ok(())
    }

    /// Rehydrates settings from a stored JSON payload, deep-merging it over
    /// the defaults so fields added after the payload was written pick up
    /// their default values.
    pub fn from_stored(raw: &str) -> Result<Self, SettingsError> {
        let stored: serde_json::Value = serde_json::from_str(raw)?;
        let mut merged = serde_json::to_value(Settings::default())?;
        merge_value(&mut merged, stored);
        Ok(serde_json::from_value(merged)?)
    }

    pub fn to_stored(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string(self)?)
    }
}

fn merge_value(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialkit_signaling::IceServer;
    use pretty_assertions::assert_eq;
    use test_log::test;

    fn settings() -> Settings {
        Settings {
            uri: "sip:alice@example.com".to_string(),
            password: "secret".to_string(),
            websocket_uri: "wss://sbc.example.com:7443".to_string(),
            authorization_user: Some("alice".to_string()),
            rtc: RtcConfig {
                ice_servers: vec![IceServer::stun("stun:stun.example.com:3478")],
            },
            ..Settings::default()
        }
    }

    #[test]
    fn stored_round_trip() {
        let original = settings();
        let raw = original.to_stored().unwrap();
        let restored = Settings::from_stored(&raw).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn stored_payload_missing_fields_gets_defaults() {
        let raw = r#"{"uri":"sip:bob@example.com","password":"pw"}"#;
        let restored = Settings::from_stored(raw).unwrap();
        assert_eq!(restored.uri, "sip:bob@example.com");
        assert_eq!(restored.password, "pw");
        assert!(restored.session_timers);
        assert_eq!(restored.transport, TransportKind::Wss);
    }

    #[test]
    fn validate_rejects_non_sip_uri() {
        let mut s = settings();
        s.uri = "alice@example.com".to_string();
        assert!(matches!(s.validate(), Err(SettingsError::InvalidUri(_))));
    }

    #[test]
    fn validate_rejects_non_websocket_scheme() {
        let mut s = settings();
        s.websocket_uri = "https://sbc.example.com".to_string();
        assert!(matches!(
            s.validate(),
            Err(SettingsError::InvalidWebsocketUri(_))
        ));
    }

    #[test]
    fn validate_accepts_sips_and_ws() {
        let mut s = settings();
        s.uri = "sips:alice@example.com".to_string();
        s.websocket_uri = "ws://10.0.0.1:5066".to_string();
        assert!(s.validate().is_ok());
    }
}
