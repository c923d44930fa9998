//! Peer connection adapter contract.
//!
//! The coordinator never touches a media engine directly. It asks a
//! [`PeerAdapterFactory`] for an adapter configured with the session's ICE
//! servers, drives offer/answer through [`PeerAdapter`], and receives every
//! engine callback as a [`PeerEvent`] through the [`PeerEventSink`] it handed
//! to the factory.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use talks_client::{IceCandidate, IceServer, SessionDescription};
use tokio::sync::mpsc;

use crate::error::AdapterError;
use crate::status::{IceConnectionState, IceGatheringState, PeerConnectionState, SignalingState};

pub mod webrtc;

pub use self::webrtc::WebRtcPeerFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Video,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    IceGatheringChanged(IceGatheringState),
    IceConnectionChanged(IceConnectionState),
    PeerConnectionChanged(PeerConnectionState),
    SignalingChanged(SignalingState),
    /// `None` marks the end of candidate gathering.
    CandidateGenerated(Option<IceCandidate>),
    TrackAdded(RemoteTrack),
    TrackRemoved(RemoteTrack),
    DataChannelOpened(String),
}

/// Where adapter callbacks go. Cheap to clone and safe to call from any
/// thread; `emit` never blocks.
#[derive(Clone)]
pub struct PeerEventSink {
    deliver: Arc<dyn Fn(PeerEvent) -> bool + Send + Sync>,
}

impl PeerEventSink {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(PeerEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// A sink backed by a plain channel, for driving an adapter without a
    /// coordinator.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PeerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self::new(move |event| tx.send(event).is_ok());
        (sink, rx)
    }

    /// Returns `false` once the receiving side is gone.
    pub fn emit(&self, event: PeerEvent) -> bool {
        (self.deliver)(event)
    }
}

impl fmt::Debug for PeerEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerEventSink").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait PeerAdapter: Send + Sync {
    async fn set_remote_description(&self, offer: &SessionDescription)
        -> Result<(), AdapterError>;

    /// Creates an answer without media constraints. `Ok(None)` means the
    /// engine produced neither a description nor an error.
    async fn create_answer(&self) -> Result<Option<SessionDescription>, AdapterError>;

    async fn set_local_description(&self, answer: &SessionDescription)
        -> Result<(), AdapterError>;

    async fn close(&self) -> Result<(), AdapterError>;
}

#[async_trait]
pub trait PeerAdapterFactory: Send + Sync {
    /// Builds a live adapter configured with `ice_servers`. All of its
    /// callbacks are reported through `events`.
    async fn create(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSink,
    ) -> Result<Arc<dyn PeerAdapter>, AdapterError>;
}
