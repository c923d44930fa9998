use talks_client::TalksError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("peer connection setup failed: {0}")]
    Setup(String),
    #[error("session description rejected: {0}")]
    Description(String),
    #[error("peer connection is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("talks api: {0}")]
    Transport(#[from] TalksError),
    #[error("peer adapter: {0}")]
    Adapter(#[from] AdapterError),
    #[error("peer connection adapter is not initialized")]
    AdapterNotInitialized,
    #[error("adapter returned neither an answer nor an error")]
    AnswerCreationFailed,
    #[error("a negotiation is already in progress")]
    SessionActive,
    #[error("no active session")]
    NotActive,
    #[error("session was closed before the operation completed")]
    SessionClosed,
    #[error("negotiation coordinator has stopped")]
    CoordinatorStopped,
}
