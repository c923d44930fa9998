//! Connection status as seen by a display layer.
//!
//! The coordinator pushes [`StatusUpdate`]s onto an unbounded channel and
//! never waits on the consumer. The receiving [`StatusStream`] decides which
//! execution context the observer runs on.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::negotiation::NegotiationState;
use crate::peer::RemoteTrack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IceGatheringState {
    New,
    Gathering,
    Complete,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveLocalPranswer,
    HaveRemoteOffer,
    HaveRemotePranswer,
    Closed,
    Unknown,
}

impl fmt::Display for IceGatheringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IceGatheringState::New => "New",
            IceGatheringState::Gathering => "Gathering",
            IceGatheringState::Complete => "Complete",
            IceGatheringState::Unknown => "Unknown",
        })
    }
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IceConnectionState::New => "New",
            IceConnectionState::Checking => "Checking",
            IceConnectionState::Connected => "Connected",
            IceConnectionState::Completed => "Completed",
            IceConnectionState::Failed => "Failed",
            IceConnectionState::Disconnected => "Disconnected",
            IceConnectionState::Closed => "Closed",
            IceConnectionState::Unknown => "Unknown",
        })
    }
}

impl fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PeerConnectionState::New => "New",
            PeerConnectionState::Connecting => "Connecting",
            PeerConnectionState::Connected => "Connected",
            PeerConnectionState::Disconnected => "Disconnected",
            PeerConnectionState::Failed => "Failed",
            PeerConnectionState::Closed => "Closed",
            PeerConnectionState::Unknown => "Unknown",
        })
    }
}

impl fmt::Display for SignalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignalingState::Stable => "Stable",
            SignalingState::HaveLocalOffer => "Local Offer",
            SignalingState::HaveLocalPranswer => "Local PrAnswer",
            SignalingState::HaveRemoteOffer => "Remote Offer",
            SignalingState::HaveRemotePranswer => "Remote PrAnswer",
            SignalingState::Closed => "Closed",
            SignalingState::Unknown => "Unknown",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    IceGathering(IceGatheringState),
    IceConnection(IceConnectionState),
    PeerConnection(PeerConnectionState),
    Signaling(SignalingState),
    Negotiation(NegotiationState),
    /// The first remote video track of a session; attach a render surface.
    RemoteVideo(RemoteTrack),
}

pub trait StatusObserver: Send + 'static {
    fn on_status(&mut self, update: StatusUpdate);
}

impl<F> StatusObserver for F
where
    F: FnMut(StatusUpdate) + Send + 'static,
{
    fn on_status(&mut self, update: StatusUpdate) {
        self(update)
    }
}

pub(crate) type StatusSender = mpsc::UnboundedSender<StatusUpdate>;

pub(crate) fn status_channel() -> (StatusSender, StatusStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, StatusStream { rx })
}

/// Receiving end of the coordinator's status notifications. Ends once the
/// coordinator task has exited.
#[derive(Debug)]
pub struct StatusStream {
    rx: mpsc::UnboundedReceiver<StatusUpdate>,
}

impl StatusStream {
    pub async fn recv(&mut self) -> Option<StatusUpdate> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StatusUpdate> {
        self.rx.try_recv().ok()
    }

    /// Delivers updates to `observer` on a Tokio task.
    pub fn spawn<O: StatusObserver>(mut self, mut observer: O) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(update) = self.rx.recv().await {
                observer.on_status(update);
            }
        })
    }

    /// Delivers updates to `observer` on the calling thread until the stream
    /// ends. Must not be called from inside an async context.
    pub fn run_blocking<O: StatusObserver>(mut self, mut observer: O) {
        while let Some(update) = self.rx.blocking_recv() {
            observer.on_status(update);
        }
    }
}

/// Latest value of every status field. Applying a value that is already
/// current is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusBoard {
    pub ice_gathering: Option<IceGatheringState>,
    pub ice_connection: Option<IceConnectionState>,
    pub peer_connection: Option<PeerConnectionState>,
    pub signaling: Option<SignalingState>,
    pub negotiation: NegotiationState,
    pub remote_video: Option<RemoteTrack>,
}

impl StatusBoard {
    /// Returns whether the update changed anything.
    pub fn apply(&mut self, update: &StatusUpdate) -> bool {
        fn replace<T: PartialEq + Clone>(slot: &mut Option<T>, value: &T) -> bool {
            if slot.as_ref() == Some(value) {
                return false;
            }
            *slot = Some(value.clone());
            true
        }

        match update {
            StatusUpdate::IceGathering(state) => replace(&mut self.ice_gathering, state),
            StatusUpdate::IceConnection(state) => replace(&mut self.ice_connection, state),
            StatusUpdate::PeerConnection(state) => replace(&mut self.peer_connection, state),
            StatusUpdate::Signaling(state) => replace(&mut self.signaling, state),
            StatusUpdate::RemoteVideo(track) => replace(&mut self.remote_video, track),
            StatusUpdate::Negotiation(state) => {
                if &self.negotiation == state {
                    return false;
                }
                self.negotiation = state.clone();
                true
            }
        }
    }

    /// Forgets the per-connection values, keeping the negotiation state.
    pub fn reset_connection(&mut self) {
        self.ice_gathering = None;
        self.ice_connection = None;
        self.peer_connection = None;
        self.signaling = None;
        self.remote_video = None;
    }

    pub fn labels(&self) -> StatusLabels {
        fn label<T: fmt::Display>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string())
        }

        StatusLabels {
            ice_gathering: label(&self.ice_gathering),
            ice_connection: label(&self.ice_connection),
            peer_connection: label(&self.peer_connection),
            signaling: label(&self.signaling),
            negotiation: self.negotiation.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLabels {
    pub ice_gathering: String,
    pub ice_connection: String,
    pub peer_connection: String,
    pub signaling: String,
    pub negotiation: String,
}

impl fmt::Display for StatusLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gathering={} ice={} peer={} signaling={} negotiation={}",
            self.ice_gathering, self.ice_connection, self.peer_connection, self.signaling,
            self.negotiation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::TrackKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn signaling_labels_match_display_names() {
        assert_eq!(SignalingState::HaveLocalOffer.to_string(), "Local Offer");
        assert_eq!(SignalingState::HaveRemotePranswer.to_string(), "Remote PrAnswer");
        assert_eq!(IceConnectionState::Unknown.to_string(), "Unknown");
    }

    #[test]
    fn board_applies_updates_idempotently() {
        let mut board = StatusBoard::default();
        let failed = StatusUpdate::IceConnection(IceConnectionState::Failed);
        assert!(board.apply(&failed));
        assert!(!board.apply(&failed));
        assert!(board.apply(&StatusUpdate::IceConnection(IceConnectionState::Checking)));
        assert_eq!(board.labels().ice_connection, "Checking");
        assert_eq!(board.labels().signaling, "-");
    }

    #[test]
    fn reset_keeps_negotiation_state() {
        let mut board = StatusBoard::default();
        board.apply(&StatusUpdate::Negotiation(NegotiationState::Active));
        board.apply(&StatusUpdate::Signaling(SignalingState::Stable));
        board.apply(&StatusUpdate::RemoteVideo(RemoteTrack {
            id: "v0".into(),
            stream_id: "s".into(),
            kind: TrackKind::Video,
        }));
        board.reset_connection();
        assert_eq!(board.signaling, None);
        assert_eq!(board.remote_video, None);
        assert_eq!(board.negotiation, NegotiationState::Active);
    }

    #[tokio::test]
    async fn spawned_observer_sees_updates_in_order() {
        let (tx, stream) = status_channel();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let handle = stream.spawn(move |update| {
            let _ = seen_tx.send(update);
        });

        tx.send(StatusUpdate::Signaling(SignalingState::HaveRemoteOffer))
            .unwrap();
        tx.send(StatusUpdate::Signaling(SignalingState::Stable))
            .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(
            seen_rx.recv().await,
            Some(StatusUpdate::Signaling(SignalingState::HaveRemoteOffer))
        );
        assert_eq!(
            seen_rx.recv().await,
            Some(StatusUpdate::Signaling(SignalingState::Stable))
        );
    }

    #[test]
    fn blocking_observer_runs_until_stream_ends() {
        let (tx, stream) = status_channel();
        tx.send(StatusUpdate::IceGathering(IceGatheringState::Gathering))
            .unwrap();
        tx.send(StatusUpdate::IceGathering(IceGatheringState::Complete))
            .unwrap();
        drop(tx);

        let changes = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&changes);
        let mut board = StatusBoard::default();
        stream.run_blocking(move |update: StatusUpdate| {
            if board.apply(&update) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(changes.load(Ordering::SeqCst), 2);
    }
}
