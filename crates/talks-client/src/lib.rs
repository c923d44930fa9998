//! Asynchronous client for the talks streaming REST API.
//!
//! Covers the calls a viewer needs to bring up a streamed avatar session:
//! create the stream, post the SDP answer, trickle ICE candidates, start a
//! talk and delete the stream. Consumers talk to [`TalksApi`] so the
//! negotiation logic can run against a stub in tests.

mod client;
mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{ClientConfig, TalksClient, DEFAULT_API_URL};
pub use types::{IceCandidate, IceServer, SessionDescription, StreamResponse, TalkScript};

#[derive(Debug, Error)]
pub enum TalksError {
    #[error("failed to build request body: {0}")]
    InvalidRequest(#[source] serde_json::Error),
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("response body was empty")]
    EmptyResponse,
    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("unexpected status: {status} body={body}")]
    RemoteServer { status: u16, body: String },
    #[error("http request failed: {0}")]
    Network(#[from] reqwest::Error),
}

impl TalksError {
    /// HTTP status reported by the service, if the failure came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            TalksError::RemoteServer { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[async_trait]
pub trait TalksApi: Send + Sync {
    /// `POST /talks/streams`. Any 2xx with a decodable body is a success.
    async fn create_stream(&self, source_url: &str) -> Result<StreamResponse, TalksError>;

    /// `POST /talks/streams/{stream_id}/sdp`, correlated by the session token.
    async fn send_answer(
        &self,
        stream_id: &str,
        session_token: &str,
        answer: &SessionDescription,
    ) -> Result<(), TalksError>;

    /// `POST /talks/streams/{stream_id}/ice`.
    async fn send_ice_candidate(
        &self,
        stream_id: &str,
        candidate: &IceCandidate,
    ) -> Result<(), TalksError>;

    /// `POST /talks/streams/{stream_id}`: make the avatar speak.
    async fn start_talk(
        &self,
        stream_id: &str,
        session_token: &str,
        script: &TalkScript,
    ) -> Result<(), TalksError>;

    /// `DELETE /talks/streams/{stream_id}`.
    async fn delete_stream(&self, stream_id: &str, session_token: &str)
        -> Result<(), TalksError>;
}
