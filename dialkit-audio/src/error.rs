use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    /// The platform refused to start playback, typically because no user
    /// gesture has unlocked audio output yet.
    #[error("playback rejected: {0}")]
    PlaybackRejected(String),
    #[error("audio output unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
