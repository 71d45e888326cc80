use crate::media::MediaError;
use dialkit_audio::AudioError;
use dialkit_signaling::{AgentError, SessionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("signaling error: {0}")]
    Agent(#[from] AgentError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),
    #[error("media error: {0}")]
    Media(#[from] MediaError),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("store error: {0}")]
    Store(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid sip uri: {0}")]
    InvalidUri(String),
    #[error("invalid websocket uri: {0}")]
    InvalidWebsocketUri(String),
    #[error("malformed settings payload: {0}")]
    Malformed(#[from] serde_json::Error),
}
