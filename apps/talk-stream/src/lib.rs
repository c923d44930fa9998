//! Negotiates a streamed talking-avatar session over WebRTC.
//!
//! A [`Coordinator`] requests a stream from the talks API, configures a peer
//! connection with the returned ICE servers, answers the service's offer and
//! trickles local candidates back, reporting progress through a
//! [`StatusStream`].

pub mod config;
pub mod error;
pub mod logging;
pub mod negotiation;
pub mod peer;
pub mod session;
pub mod status;

pub use error::{AdapterError, NegotiationError};
pub use negotiation::{Completion, Coordinator, NegotiationState};
pub use peer::{
    PeerAdapter, PeerAdapterFactory, PeerEvent, PeerEventSink, RemoteTrack, TrackKind,
    WebRtcPeerFactory,
};
pub use status::{StatusBoard, StatusObserver, StatusStream, StatusUpdate};
