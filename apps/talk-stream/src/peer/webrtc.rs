use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use talks_client::{IceCandidate, IceServer, SessionDescription};
use tracing::{debug, trace, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

use super::{PeerAdapter, PeerAdapterFactory, PeerEvent, PeerEventSink, RemoteTrack, TrackKind};
use crate::error::AdapterError;
use crate::status::{IceConnectionState, IceGatheringState, PeerConnectionState, SignalingState};

static API_INSTANCE: OnceCell<API> = OnceCell::new();

/// Media engine with the default codecs and interceptors, built on first
/// use and shared by every peer connection in the process.
fn shared_api() -> Result<&'static API, AdapterError> {
    API_INSTANCE.get_or_try_init(|| {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(to_setup_error)?;

        let mut registry = Registry::new();
        registry =
            register_default_interceptors(registry, &mut media_engine).map_err(to_setup_error)?;

        Ok(APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build())
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WebRtcPeerFactory;

impl WebRtcPeerFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerAdapterFactory for WebRtcPeerFactory {
    async fn create(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSink,
    ) -> Result<Arc<dyn PeerAdapter>, AdapterError> {
        let api = shared_api()?;
        let config = RTCConfiguration {
            ice_servers: rtc_ice_servers(ice_servers),
            ..Default::default()
        };
        trace!(ice_servers = config.ice_servers.len(), "creating peer connection");
        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(to_setup_error)?,
        );
        register_callbacks(&pc, events);
        Ok(Arc::new(WebRtcPeer { pc }))
    }
}

pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerAdapter for WebRtcPeer {
    async fn set_remote_description(
        &self,
        offer: &SessionDescription,
    ) -> Result<(), AdapterError> {
        let description = rtc_description(offer)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(to_description_error)
    }

    async fn create_answer(&self) -> Result<Option<SessionDescription>, AdapterError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(to_description_error)?;
        if answer.sdp.is_empty() {
            return Ok(None);
        }
        Ok(Some(SessionDescription::new(
            answer.sdp_type.to_string(),
            answer.sdp,
        )))
    }

    async fn set_local_description(
        &self,
        answer: &SessionDescription,
    ) -> Result<(), AdapterError> {
        let description = rtc_description(answer)?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(to_description_error)
    }

    async fn close(&self) -> Result<(), AdapterError> {
        self.pc.close().await.map_err(to_setup_error)
    }
}

fn register_callbacks(pc: &Arc<RTCPeerConnection>, events: PeerEventSink) {
    let sink = events.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let sink = sink.clone();
        Box::pin(async move {
            let candidate = match candidate {
                Some(candidate) => match candidate.to_json() {
                    Ok(init) => Some(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                    }),
                    Err(err) => {
                        warn!(error = %err, "failed to serialize local candidate");
                        return;
                    }
                },
                None => None,
            };
            sink.emit(PeerEvent::CandidateGenerated(candidate));
        })
    }));

    let sink = events.clone();
    pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
        sink.emit(PeerEvent::IceGatheringChanged(state.into()));
        Box::pin(async {})
    }));

    let sink = events.clone();
    pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
        sink.emit(PeerEvent::IceConnectionChanged(state.into()));
        Box::pin(async {})
    }));

    let sink = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        sink.emit(PeerEvent::PeerConnectionChanged(state.into()));
        Box::pin(async {})
    }));

    let sink = events.clone();
    pc.on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
        sink.emit(PeerEvent::SignalingChanged(state.into()));
        Box::pin(async {})
    }));

    let sink = events.clone();
    pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
        let remote = RemoteTrack {
            id: track.id(),
            stream_id: track.stream_id(),
            kind: track_kind(track.kind()),
        };
        sink.emit(PeerEvent::TrackAdded(remote.clone()));
        let sink = sink.clone();
        tokio::spawn(async move {
            // Rendering is out of scope; keep the jitter buffer drained until
            // the track ends.
            while track.read_rtp().await.is_ok() {}
            sink.emit(PeerEvent::TrackRemoved(remote));
        });
        Box::pin(async {})
    }));

    let sink = events;
    pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
        let sink = sink.clone();
        Box::pin(async move {
            let label = dc.label().to_string();
            debug!(%label, "remote data channel announced");
            let sink_for_open = sink.clone();
            dc.on_open(Box::new(move || {
                sink_for_open.emit(PeerEvent::DataChannelOpened(label));
                Box::pin(async {})
            }));
        })
    }));
}

fn rtc_ice_servers(servers: &[IceServer]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .filter(|server| !server.urls.is_empty())
        .map(|server| RTCIceServer {
            urls: server.urls.clone(),
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

fn rtc_description(description: &SessionDescription) -> Result<RTCSessionDescription, AdapterError> {
    let sdp = description.sdp.clone();
    match RTCSdpType::from(description.sdp_type.as_str()) {
        RTCSdpType::Offer => RTCSessionDescription::offer(sdp),
        RTCSdpType::Answer => RTCSessionDescription::answer(sdp),
        RTCSdpType::Pranswer => RTCSessionDescription::pranswer(sdp),
        RTCSdpType::Rollback | RTCSdpType::Unspecified => {
            return Err(AdapterError::Description(format!(
                "unsupported sdp type {}",
                description.sdp_type
            )));
        }
    }
    .map_err(to_description_error)
}

fn track_kind(kind: RTPCodecType) -> TrackKind {
    match kind {
        RTPCodecType::Audio => TrackKind::Audio,
        RTPCodecType::Video => TrackKind::Video,
        _ => TrackKind::Unknown,
    }
}

impl From<RTCIceGathererState> for IceGatheringState {
    fn from(state: RTCIceGathererState) -> Self {
        match state {
            RTCIceGathererState::New => IceGatheringState::New,
            RTCIceGathererState::Gathering => IceGatheringState::Gathering,
            RTCIceGathererState::Complete => IceGatheringState::Complete,
            _ => IceGatheringState::Unknown,
        }
    }
}

impl From<RTCIceConnectionState> for IceConnectionState {
    fn from(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::New => IceConnectionState::New,
            RTCIceConnectionState::Checking => IceConnectionState::Checking,
            RTCIceConnectionState::Connected => IceConnectionState::Connected,
            RTCIceConnectionState::Completed => IceConnectionState::Completed,
            RTCIceConnectionState::Failed => IceConnectionState::Failed,
            RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
            RTCIceConnectionState::Closed => IceConnectionState::Closed,
            _ => IceConnectionState::Unknown,
        }
    }
}

impl From<RTCPeerConnectionState> for PeerConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::New => PeerConnectionState::New,
            RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
            RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
            RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
            _ => PeerConnectionState::Unknown,
        }
    }
}

impl From<RTCSignalingState> for SignalingState {
    fn from(state: RTCSignalingState) -> Self {
        match state {
            RTCSignalingState::Stable => SignalingState::Stable,
            RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
            RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
            RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
            RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
            RTCSignalingState::Closed => SignalingState::Closed,
            _ => SignalingState::Unknown,
        }
    }
}

fn to_setup_error<E: std::fmt::Display>(err: E) -> AdapterError {
    AdapterError::Setup(err.to_string())
}

fn to_description_error(err: webrtc::Error) -> AdapterError {
    match err {
        webrtc::Error::ErrConnectionClosed => AdapterError::Closed,
        other => AdapterError::Description(other.to_string()),
    }
}
