use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("user agent not started")]
    NotStarted,
    #[error("invalid target uri: {0}")]
    InvalidTarget(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session already terminated")]
    Terminated,
    #[error("invalid session state: {0}")]
    InvalidState(String),
    #[error("dtmf rejected: {0}")]
    Dtmf(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
