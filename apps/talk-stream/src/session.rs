use talks_client::{IceServer, SessionDescription, StreamResponse};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DescriptionStatus {
    #[default]
    Unset,
    Applying,
    Applied,
}

/// The one stream a coordinator negotiates at a time. Created from a
/// successful create-stream response and dropped on teardown or failure.
#[derive(Debug, Clone)]
pub struct Session {
    generation: u64,
    stream_id: String,
    session_token: String,
    ice_servers: Vec<IceServer>,
    offer: SessionDescription,
    pub remote_description: DescriptionStatus,
    pub local_description: DescriptionStatus,
    candidates_sent: u32,
    candidates_failed: u32,
    video_attached: bool,
}

impl Session {
    pub fn new(generation: u64, response: StreamResponse) -> Self {
        Self {
            generation,
            stream_id: response.id,
            session_token: response.session_id,
            ice_servers: response.ice_servers,
            offer: response.offer,
            remote_description: DescriptionStatus::Unset,
            local_description: DescriptionStatus::Unset,
            candidates_sent: 0,
            candidates_failed: 0,
            video_attached: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Correlator for the answer and talk requests; not the stream id.
    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn ice_servers(&self) -> &[IceServer] {
        &self.ice_servers
    }

    pub fn offer(&self) -> &SessionDescription {
        &self.offer
    }

    pub fn record_candidate(&mut self, delivered: bool) {
        if delivered {
            self.candidates_sent += 1;
        } else {
            self.candidates_failed += 1;
        }
    }

    pub fn candidates_sent(&self) -> u32 {
        self.candidates_sent
    }

    pub fn candidates_failed(&self) -> u32 {
        self.candidates_failed
    }

    /// True only for the first call; later video tracks do not get a surface.
    pub fn attach_video(&mut self) -> bool {
        !std::mem::replace(&mut self.video_attached, true)
    }
}
