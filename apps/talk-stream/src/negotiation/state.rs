use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NegotiationState {
    #[default]
    Idle,
    StreamRequested,
    StreamReady,
    RemoteDescriptionSet,
    AnswerCreated,
    /// The answer was accepted by the service.
    Active,
    Closed,
    Failed {
        reason: String,
    },
}

impl NegotiationState {
    /// A negotiation owns the coordinator in these states; a new session
    /// must not start.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            NegotiationState::StreamRequested
                | NegotiationState::StreamReady
                | NegotiationState::RemoteDescriptionSet
                | NegotiationState::AnswerCreated
                | NegotiationState::Active
        )
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationState::Idle => f.write_str("Idle"),
            NegotiationState::StreamRequested => f.write_str("Stream Requested"),
            NegotiationState::StreamReady => f.write_str("Stream Ready"),
            NegotiationState::RemoteDescriptionSet => f.write_str("Remote Description Set"),
            NegotiationState::AnswerCreated => f.write_str("Answer Created"),
            NegotiationState::Active => f.write_str("Active"),
            NegotiationState::Closed => f.write_str("Closed"),
            NegotiationState::Failed { reason } => write!(f, "Failed: {reason}"),
        }
    }
}
