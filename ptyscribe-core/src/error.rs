use thiserror::Error;

use crate::session::SessionId;

/// Misuse of the engine API. Stream content never produces one of these:
/// odd bytes from the shell degrade gracefully instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("session already open: {0}")]
    SessionExists(SessionId),

    #[error("session {0} is not ready for commands yet")]
    SessionNotReady(SessionId),

    #[error("session {session} already has a command in flight: {command:?}")]
    CommandInFlight { session: SessionId, command: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid prompt pattern: {0}")]
    Pattern(#[from] regex::Error),
}
