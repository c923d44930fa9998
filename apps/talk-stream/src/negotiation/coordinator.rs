use std::future::Future;
use std::sync::Arc;

use talks_client::{
    IceCandidate, IceServer, SessionDescription, StreamResponse, TalkScript, TalksApi, TalksError,
};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use super::{Completion, NegotiationState};
use crate::error::{AdapterError, NegotiationError};
use crate::peer::{PeerAdapter, PeerAdapterFactory, PeerEvent, PeerEventSink, TrackKind};
use crate::session::{DescriptionStatus, Session};
use crate::status::{StatusBoard, StatusSender, StatusStream, StatusUpdate, status_channel};

type Reply<T> = oneshot::Sender<Result<T, NegotiationError>>;

enum Command {
    Create { reply: Reply<()> },
    Start { script: TalkScript, reply: Reply<()> },
    Destroy { reply: Reply<()> },
    Status { reply: Reply<StatusBoard> },
    Peer { generation: u64, event: PeerEvent },
    Step { generation: u64, outcome: StepOutcome },
}

enum StepOutcome {
    StreamCreated(Result<StreamResponse, TalksError>),
    AdapterReady(Result<Arc<dyn PeerAdapter>, AdapterError>),
    RemoteDescriptionSet(Result<(), AdapterError>),
    AnswerCreated(Result<Option<SessionDescription>, AdapterError>),
    LocalDescriptionSet(Result<SessionDescription, AdapterError>),
    AnswerSent(Result<(), TalksError>),
    CandidateSent(Result<(), TalksError>),
}

/// Handle to a negotiation task. Clones share the same task; it stops once
/// the last handle is dropped.
#[derive(Clone)]
pub struct Coordinator {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<NegotiationState>,
}

impl Coordinator {
    /// Spawns the negotiation task on the current Tokio runtime.
    pub fn spawn(
        api: Arc<dyn TalksApi>,
        peers: Arc<dyn PeerAdapterFactory>,
        source_url: impl Into<String>,
    ) -> (Self, StatusStream) {
        let (commands, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(NegotiationState::Idle);
        let (status, stream) = status_channel();
        let negotiator = Negotiator {
            api,
            peers,
            source_url: source_url.into(),
            commands: commands.downgrade(),
            state: state_tx,
            status,
            board: StatusBoard::default(),
            next_generation: 0,
            live: None,
            session: None,
            adapter: None,
            pending_create: None,
        };
        tokio::spawn(negotiator.run(rx));
        (Self { commands, state }, stream)
    }

    /// Requests a stream and negotiates it. Resolves once the answer has been
    /// accepted, or with the error that failed the negotiation.
    pub fn create_session(&self) -> Completion<()> {
        self.request(|reply| Command::Create { reply })
    }

    pub fn start_session(&self, script: TalkScript) -> Completion<()> {
        self.request(|reply| Command::Start { script, reply })
    }

    /// Closes the adapter, clears the session and deletes the stream. Safe to
    /// call in any state.
    pub fn destroy_session(&self) -> Completion<()> {
        self.request(|reply| Command::Destroy { reply })
    }

    /// Snapshot of the latest status values, taken after every event queued
    /// before this call has been handled.
    pub fn status(&self) -> Completion<StatusBoard> {
        self.request(|reply| Command::Status { reply })
    }

    pub fn state(&self) -> NegotiationState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<NegotiationState> {
        self.state.clone()
    }

    fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Completion<T> {
        let (reply, completion) = Completion::channel();
        // On a stopped task the reply is dropped with the command.
        let _ = self.commands.send(build(reply));
        completion
    }
}

struct Negotiator {
    api: Arc<dyn TalksApi>,
    peers: Arc<dyn PeerAdapterFactory>,
    source_url: String,
    commands: mpsc::WeakUnboundedSender<Command>,
    state: watch::Sender<NegotiationState>,
    status: StatusSender,
    board: StatusBoard,
    next_generation: u64,
    live: Option<u64>,
    session: Option<Session>,
    adapter: Option<Arc<dyn PeerAdapter>>,
    pending_create: Option<Reply<()>>,
}

impl Negotiator {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        if let Some(adapter) = self.adapter.take() {
            if let Err(err) = adapter.close().await {
                debug!(error = %err, "peer adapter close failed during shutdown");
            }
        }
        debug!("negotiation coordinator stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Create { reply } => self.create(reply),
            Command::Start { script, reply } => self.start(script, reply),
            Command::Destroy { reply } => self.destroy(reply),
            Command::Status { reply } => {
                let _ = reply.send(Ok(self.board.clone()));
            }
            Command::Peer { generation, event } => {
                if self.live != Some(generation) {
                    debug!(generation, ?event, "dropping peer event from stale session");
                    return;
                }
                self.on_peer_event(generation, event);
            }
            Command::Step {
                generation,
                outcome,
            } => {
                if self.live != Some(generation) {
                    self.discard_stale(generation, outcome);
                    return;
                }
                self.on_step(generation, outcome);
            }
        }
    }

    fn current(&self) -> NegotiationState {
        self.state.borrow().clone()
    }

    fn create(&mut self, reply: Reply<()>) {
        if self.current().is_live() {
            let _ = reply.send(Err(NegotiationError::SessionActive));
            return;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        self.live = Some(generation);
        self.pending_create = Some(reply);
        self.board.reset_connection();
        self.transition(NegotiationState::StreamRequested);

        info!(generation, source_url = %self.source_url, "requesting talk stream");
        let api = Arc::clone(&self.api);
        let source_url = self.source_url.clone();
        self.spawn_step(generation, async move {
            StepOutcome::StreamCreated(api.create_stream(&source_url).await)
        });
    }

    fn start(&mut self, script: TalkScript, reply: Reply<()>) {
        let active = *self.state.borrow() == NegotiationState::Active;
        let Some(session) = self.session.as_ref().filter(|_| active) else {
            let _ = reply.send(Err(NegotiationError::NotActive));
            return;
        };

        let api = Arc::clone(&self.api);
        let stream_id = session.stream_id().to_string();
        let token = session.session_token().to_string();
        tokio::spawn(async move {
            let result = api
                .start_talk(&stream_id, &token, &script)
                .await
                .map_err(NegotiationError::from);
            match &result {
                Ok(()) => debug!(%stream_id, "talk started"),
                Err(err) => warn!(%stream_id, error = %err, "failed to start talk"),
            }
            let _ = reply.send(result);
        });
    }

    fn destroy(&mut self, reply: Reply<()>) {
        let Some(generation) = self.live.take() else {
            debug!(state = %self.current(), "no live session to destroy");
            let _ = reply.send(Ok(()));
            return;
        };

        info!(generation, "tearing down session");
        let adapter = self.adapter.take();
        let session = self.session.take();
        self.transition(NegotiationState::Closed);
        if let Some(pending) = self.pending_create.take() {
            let _ = pending.send(Err(NegotiationError::SessionClosed));
        }
        self.release(adapter, session, Some(reply));
    }

    fn fail(&mut self, err: NegotiationError) {
        let reason = err.to_string();
        warn!(generation = ?self.live, %reason, "negotiation failed");
        self.live = None;
        let adapter = self.adapter.take();
        let session = self.session.take();
        self.transition(NegotiationState::Failed { reason });
        if let Some(pending) = self.pending_create.take() {
            let _ = pending.send(Err(err));
        }
        self.release(adapter, session, None);
    }

    fn on_step(&mut self, generation: u64, outcome: StepOutcome) {
        match outcome {
            StepOutcome::StreamCreated(Ok(stream)) => {
                info!(
                    generation,
                    stream_id = %stream.id,
                    ice_servers = stream.ice_servers.len(),
                    "talk stream ready"
                );
                let session = Session::new(generation, stream);
                let ice_servers = session.ice_servers().to_vec();
                self.session = Some(session);
                self.transition(NegotiationState::StreamReady);
                self.configure(generation, ice_servers);
            }
            StepOutcome::AdapterReady(Ok(adapter)) => {
                self.adapter = Some(adapter);
                self.set_remote_offer(generation);
            }
            StepOutcome::RemoteDescriptionSet(Ok(())) => {
                if let Some(session) = self.session.as_mut() {
                    session.remote_description = DescriptionStatus::Applied;
                }
                self.transition(NegotiationState::RemoteDescriptionSet);
                self.create_answer(generation);
            }
            StepOutcome::AnswerCreated(Ok(Some(answer))) => {
                self.transition(NegotiationState::AnswerCreated);
                self.set_local_answer(generation, answer);
            }
            StepOutcome::AnswerCreated(Ok(None)) => {
                self.fail(NegotiationError::AnswerCreationFailed)
            }
            StepOutcome::LocalDescriptionSet(Ok(answer)) => self.send_answer(generation, answer),
            StepOutcome::AnswerSent(Ok(())) => {
                info!(generation, "answer accepted; session active");
                self.transition(NegotiationState::Active);
                if let Some(pending) = self.pending_create.take() {
                    let _ = pending.send(Ok(()));
                }
            }
            StepOutcome::CandidateSent(result) => self.record_candidate(generation, result),
            StepOutcome::StreamCreated(Err(err)) | StepOutcome::AnswerSent(Err(err)) => {
                self.fail(err.into())
            }
            StepOutcome::AdapterReady(Err(err))
            | StepOutcome::RemoteDescriptionSet(Err(err))
            | StepOutcome::AnswerCreated(Err(err))
            | StepOutcome::LocalDescriptionSet(Err(err)) => self.fail(err.into()),
        }
    }

    fn discard_stale(&self, generation: u64, outcome: StepOutcome) {
        match outcome {
            StepOutcome::StreamCreated(Ok(stream)) => {
                debug!(generation, stream_id = %stream.id, "deleting stream of a closed session");
                self.release(None, Some(Session::new(generation, stream)), None);
            }
            StepOutcome::AdapterReady(Ok(adapter)) => {
                debug!(generation, "closing adapter of a closed session");
                self.release(Some(adapter), None, None);
            }
            _ => debug!(generation, "dropping step outcome from stale session"),
        }
    }

    fn configure(&mut self, generation: u64, ice_servers: Vec<IceServer>) {
        let peers = Arc::clone(&self.peers);
        let events = self.event_sink(generation);
        self.spawn_step(generation, async move {
            StepOutcome::AdapterReady(peers.create(&ice_servers, events).await)
        });
    }

    fn set_remote_offer(&mut self, generation: u64) {
        let Some(adapter) = self.adapter.clone() else {
            return self.fail(NegotiationError::AdapterNotInitialized);
        };
        let Some(session) = self.session.as_mut() else {
            return self.fail(NegotiationError::SessionClosed);
        };
        session.remote_description = DescriptionStatus::Applying;
        let offer = session.offer().clone();
        self.spawn_step(generation, async move {
            StepOutcome::RemoteDescriptionSet(adapter.set_remote_description(&offer).await)
        });
    }

    fn create_answer(&mut self, generation: u64) {
        let Some(adapter) = self.adapter.clone() else {
            return self.fail(NegotiationError::AdapterNotInitialized);
        };
        self.spawn_step(generation, async move {
            StepOutcome::AnswerCreated(adapter.create_answer().await)
        });
    }

    fn set_local_answer(&mut self, generation: u64, answer: SessionDescription) {
        let Some(adapter) = self.adapter.clone() else {
            return self.fail(NegotiationError::AdapterNotInitialized);
        };
        if let Some(session) = self.session.as_mut() {
            session.local_description = DescriptionStatus::Applying;
        }
        self.spawn_step(generation, async move {
            let result = adapter.set_local_description(&answer).await.map(|()| answer);
            StepOutcome::LocalDescriptionSet(result)
        });
    }

    fn send_answer(&mut self, generation: u64, answer: SessionDescription) {
        let Some(session) = self.session.as_mut() else {
            return self.fail(NegotiationError::SessionClosed);
        };
        session.local_description = DescriptionStatus::Applied;
        let stream_id = session.stream_id().to_string();
        let token = session.session_token().to_string();

        debug!(generation, %stream_id, "posting answer");
        let api = Arc::clone(&self.api);
        self.spawn_step(generation, async move {
            StepOutcome::AnswerSent(api.send_answer(&stream_id, &token, &answer).await)
        });
    }

    fn on_peer_event(&mut self, generation: u64, event: PeerEvent) {
        match event {
            PeerEvent::IceGatheringChanged(state) => self.notify(StatusUpdate::IceGathering(state)),
            PeerEvent::IceConnectionChanged(state) => {
                self.notify(StatusUpdate::IceConnection(state))
            }
            PeerEvent::PeerConnectionChanged(state) => {
                self.notify(StatusUpdate::PeerConnection(state))
            }
            PeerEvent::SignalingChanged(state) => self.notify(StatusUpdate::Signaling(state)),
            PeerEvent::CandidateGenerated(Some(candidate)) => self.trickle(generation, candidate),
            PeerEvent::CandidateGenerated(None) => {
                debug!(generation, "local candidate gathering finished")
            }
            PeerEvent::TrackAdded(track) => {
                let attach = track.kind == TrackKind::Video
                    && self
                        .session
                        .as_mut()
                        .is_some_and(|session| session.attach_video());
                if attach {
                    info!(generation, track_id = %track.id, "remote video track attached");
                    self.notify(StatusUpdate::RemoteVideo(track));
                } else {
                    debug!(generation, track_id = %track.id, kind = ?track.kind, "remote track added");
                }
            }
            PeerEvent::TrackRemoved(track) => {
                debug!(generation, track_id = %track.id, "remote track removed")
            }
            PeerEvent::DataChannelOpened(label) => {
                debug!(generation, %label, "data channel opened")
            }
        }
    }

    fn trickle(&mut self, generation: u64, candidate: IceCandidate) {
        let Some(session) = self.session.as_ref() else {
            debug!(generation, "dropping candidate without a session");
            return;
        };
        let stream_id = session.stream_id().to_string();
        trace!(generation, candidate = %candidate.candidate, "trickling ice candidate");
        let api = Arc::clone(&self.api);
        self.spawn_step(generation, async move {
            StepOutcome::CandidateSent(api.send_ice_candidate(&stream_id, &candidate).await)
        });
    }

    fn record_candidate(&mut self, generation: u64, result: Result<(), TalksError>) {
        let delivered = match result {
            Ok(()) => true,
            Err(err) => {
                warn!(generation, error = %err, "ice candidate was not accepted");
                false
            }
        };
        if let Some(session) = self.session.as_mut() {
            session.record_candidate(delivered);
            trace!(
                generation,
                sent = session.candidates_sent(),
                failed = session.candidates_failed(),
                "candidate trickle progress"
            );
        }
    }

    fn transition(&mut self, next: NegotiationState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next.clone();
            true
        });
        if changed {
            debug!(state = %next, "negotiation state changed");
            self.notify(StatusUpdate::Negotiation(next));
        }
    }

    fn notify(&mut self, update: StatusUpdate) {
        if self.board.apply(&update) {
            let _ = self.status.send(update);
        }
    }

    fn event_sink(&self, generation: u64) -> PeerEventSink {
        let commands = self.commands.clone();
        PeerEventSink::new(move |event| match commands.upgrade() {
            Some(commands) => commands.send(Command::Peer { generation, event }).is_ok(),
            None => false,
        })
    }

    fn spawn_step<F>(&self, generation: u64, step: F)
    where
        F: Future<Output = StepOutcome> + Send + 'static,
    {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let outcome = step.await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::Step {
                    generation,
                    outcome,
                });
            }
        });
    }

    /// Closes the adapter and deletes the stream in the background, then
    /// resolves `reply`.
    fn release(
        &self,
        adapter: Option<Arc<dyn PeerAdapter>>,
        session: Option<Session>,
        reply: Option<Reply<()>>,
    ) {
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            if let Some(adapter) = adapter {
                if let Err(err) = adapter.close().await {
                    debug!(error = %err, "peer adapter close failed");
                }
            }
            if let Some(session) = session {
                let generation = session.generation();
                let stream_id = session.stream_id();
                match api.delete_stream(stream_id, session.session_token()).await {
                    Ok(()) => debug!(generation, %stream_id, "talk stream deleted"),
                    Err(err) => {
                        warn!(generation, %stream_id, error = %err, "failed to delete talk stream")
                    }
                }
            }
            if let Some(reply) = reply {
                let _ = reply.send(Ok(()));
            }
        });
    }
}
