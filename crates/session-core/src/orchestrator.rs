//! Per-session orchestration.
//!
//! One [`SessionOrchestrator`] is created per call via
//! [`create_session`](SessionOrchestrator::create_session) with its
//! collaborators injected through [`SessionDeps`]; nothing here is
//! global. Creation acquires local media first (failure there aborts
//! creation entirely), wires up the signaling relay, control channel,
//! and quality monitor, persists the initial record, and spawns a router
//! task that feeds transport, relay, and media events into the lifecycle
//! state machine.
//!
//! Teardown runs once, no matter how the session reached a terminal
//! state: hang-up, remote disconnect, negotiation timeout, and transport
//! failure all land in [`finalize`](SessionOrchestrator::finalize),
//! which is guarded so concurrent paths release timers, channels, media,
//! and the room claim exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use televisit_media_core::{
    MediaCapabilityProvider, MediaProviderEvent, MediaTrack, QualitySample, TrackBundle,
};
use televisit_signaling_core::{
    LinkState, PeerConnection, PeerConnectionEvent, PeerConnectionFactory, RelayConfig,
    RelayEvent, RoomId, SignalingError, SignalingRelay, SignalingTransport,
};

use crate::config::SessionConfig;
use crate::control::{ControlBody, ControlChannel, ControlMessage};
use crate::errors::{Result, SessionError};
use crate::events::{SessionEvent, SessionEventHub, SessionEventStream};
use crate::manager::{SessionManager, TransitionOutcome};
use crate::observer::{dispatch_event, SessionObserver};
use crate::quality::QualityMonitor;
use crate::registry::SessionRegistry;
use crate::state_machine::LifecycleEvent;
use crate::store::SessionStore;
use crate::types::{
    Participant, ParticipantId, ParticipantInfo, Session, SessionId, SessionStatus,
};

/// Collaborators injected into every session
#[derive(Clone)]
pub struct SessionDeps {
    /// Device/media layer; one provider serves one session
    pub media: Arc<dyn MediaCapabilityProvider>,
    pub peers: Arc<dyn PeerConnectionFactory>,
    pub signaling: Arc<dyn SignalingTransport>,
    pub store: Arc<dyn SessionStore>,
    pub registry: Arc<SessionRegistry>,
}

struct MediaState {
    bundle: TrackBundle,
    /// Set while the outgoing video is the screen capture
    screen_track: Option<MediaTrack>,
}

/// Orchestrates one video consultation session.
pub struct SessionOrchestrator {
    session_id: SessionId,
    room_id: RoomId,
    config: SessionConfig,
    local_participant: ParticipantId,
    manager: Arc<SessionManager>,
    relay: Arc<SignalingRelay>,
    control: Arc<ControlChannel>,
    monitor: Arc<QualityMonitor>,
    hub: Arc<SessionEventHub>,
    media: Arc<dyn MediaCapabilityProvider>,
    peer: Arc<dyn PeerConnection>,
    registry: Arc<SessionRegistry>,
    media_state: Mutex<MediaState>,
    finalized: AtomicBool,
    router: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("session_id", &self.session_id)
            .field("room_id", &self.room_id)
            .finish_non_exhaustive()
    }
}

impl SessionOrchestrator {
    /// Create a session for a room.
    ///
    /// Fails with [`SessionError::DuplicateSession`] if the room already
    /// has a live session, and with a media error if local tracks cannot
    /// be acquired; in both cases nothing is left behind. The returned
    /// session is in `waiting`.
    pub async fn create_session(
        deps: SessionDeps,
        config: SessionConfig,
        room_id: RoomId,
        host: ParticipantInfo,
    ) -> Result<Arc<Self>> {
        let session_id = SessionId::generate();
        deps.registry.claim(&room_id, &session_id)?;

        // Media comes first: acquisition failure aborts creation and no
        // session object exists afterwards
        let bundle = match deps
            .media
            .acquire_local_media(&config.media_constraints)
            .await
        {
            Ok(bundle) => bundle,
            Err(e) => {
                deps.registry.release(&room_id, &session_id);
                return Err(e.into());
            }
        };
        let media_events = deps.media.take_events().await;

        let (peer, peer_events) = match deps.peers.create_peer().await {
            Ok(created) => created,
            Err(e) => {
                let _ = deps.media.release_media(&bundle).await;
                deps.registry.release(&room_id, &session_id);
                return Err(e.into());
            }
        };

        let (publisher, incoming) = match deps.signaling.join(&room_id).await {
            Ok(joined) => joined,
            Err(e) => {
                peer.close().await;
                let _ = deps.media.release_media(&bundle).await;
                deps.registry.release(&room_id, &session_id);
                return Err(e.into());
            }
        };

        let record = Session::new(
            session_id.clone(),
            room_id.clone(),
            host.clone(),
            config.chat_enabled,
        );
        let hub = Arc::new(SessionEventHub::new(config.event_buffer_capacity));
        let manager = Arc::new(SessionManager::new(record, deps.store.clone(), hub.clone()));
        manager.persist_initial().await;

        let (relay_tx, relay_events) = mpsc::channel(32);
        let relay = SignalingRelay::start(
            session_id.as_str(),
            room_id.clone(),
            RelayConfig {
                answer_timeout: config.negotiation_timeout,
            },
            peer.clone(),
            publisher,
            incoming,
            relay_tx,
        )
        .await;

        let control = Arc::new(ControlChannel::new(session_id.clone(), peer.clone()));
        let monitor = Arc::new(QualityMonitor::new(
            session_id.clone(),
            deps.media.clone(),
            hub.clone(),
            config.quality_interval,
        ));

        let orchestrator = Arc::new(Self {
            session_id,
            room_id,
            config,
            local_participant: host.id,
            manager,
            relay,
            control,
            monitor,
            hub,
            media: deps.media,
            peer,
            registry: deps.registry,
            media_state: Mutex::new(MediaState {
                bundle,
                screen_track: None,
            }),
            finalized: AtomicBool::new(false),
            router: parking_lot::Mutex::new(None),
        });

        let router = tokio::spawn(Self::route_events(
            orchestrator.clone(),
            peer_events,
            relay_events,
            media_events,
        ));
        *orchestrator.router.lock() = Some(router);

        info!(
            "session {} created for room {} by {}",
            orchestrator.session_id, orchestrator.room_id, orchestrator.local_participant
        );
        Ok(orchestrator)
    }

    pub fn id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub async fn status(&self) -> SessionStatus {
        self.manager.status().await
    }

    /// Current copy of the session record
    pub async fn snapshot(&self) -> Session {
        self.manager.snapshot().await
    }

    /// Register for events. Everything published before this call is
    /// replayed first, then the stream continues live.
    pub fn subscribe(&self) -> SessionEventStream {
        self.hub.subscribe()
    }

    /// Attach a typed observer. It sees the buffered history first, then
    /// live events, and detaches when the session is dropped.
    pub fn attach_observer(&self, observer: Arc<dyn SessionObserver>) {
        let mut stream = self.hub.subscribe();
        tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                dispatch_event(observer.as_ref(), &event).await;
            }
        });
    }

    /// Most recent quality sample, if the monitor has produced one
    pub fn latest_quality(&self) -> Option<QualitySample> {
        self.monitor.latest()
    }

    /// Dial out: create and publish the offer. The callee's session
    /// answers automatically when the offer reaches it.
    pub async fn connect(&self) -> Result<()> {
        let status = self.manager.status().await;
        if status != SessionStatus::Waiting {
            return Err(SessionError::invalid_state(status, "connect"));
        }
        match self.relay.create_offer().await {
            Ok(()) => Ok(()),
            Err(e) => {
                if matches!(e, SignalingError::DeliveryFailure(_)) {
                    self.report_signaling_failure(e.to_string()).await;
                }
                Err(e.into())
            }
        }
    }

    /// Feed an external transport notification into the state machine.
    /// Returns the transition it produced, if any.
    pub async fn record_transport_event(&self, state: LinkState) -> Option<TransitionOutcome> {
        self.apply_lifecycle(LifecycleEvent::Link(state)).await
    }

    /// Add a remote participant to the session record
    pub async fn register_participant(&self, info: ParticipantInfo) -> Result<Participant> {
        let status = self.manager.status().await;
        if status.is_terminal() {
            return Err(SessionError::invalid_state(status, "register_participant"));
        }
        Ok(self.manager.register_participant(info).await)
    }

    /// Send a chat message. Fails when chat is disabled for this
    /// session. Delivery itself is asynchronous: a message submitted
    /// after the control channel has permanently closed is dropped and
    /// reported through an [`SessionEvent::Error`], not a returned
    /// error.
    pub async fn send_chat(&self, text: impl Into<String>) -> Result<()> {
        if !self.config.chat_enabled {
            return Err(SessionError::ChatDisabled);
        }
        self.dispatch_control(ControlMessage::chat(self.local_participant.clone(), text))
            .await;
        Ok(())
    }

    pub async fn set_audio_enabled(&self, enabled: bool) -> Result<()> {
        self.manager
            .set_participant_media(&self.local_participant, Some(enabled), None)
            .await
            .map(|_| ())
            .ok_or_else(|| SessionError::internal("local participant missing from record"))
    }

    pub async fn set_video_enabled(&self, enabled: bool) -> Result<()> {
        self.manager
            .set_participant_media(&self.local_participant, None, Some(enabled))
            .await
            .map(|_| ())
            .ok_or_else(|| SessionError::internal("local participant missing from record"))
    }

    /// Swap the outgoing video track (camera switch) without
    /// renegotiating
    pub async fn replace_video_track(&self, track: MediaTrack) -> Result<()> {
        self.media.replace_video_track(track.clone()).await?;
        self.media_state.lock().await.bundle.video = Some(track);
        Ok(())
    }

    /// Capture the screen and make it the outgoing video. The remote
    /// side is told over the control channel. No-op if already sharing.
    pub async fn start_screen_share(&self) -> Result<()> {
        let status = self.manager.status().await;
        if status != SessionStatus::Active {
            return Err(SessionError::invalid_state(status, "start_screen_share"));
        }

        let mut media_state = self.media_state.lock().await;
        if media_state.screen_track.is_some() {
            return Ok(());
        }
        let screen = self.media.capture_screen_track().await?;
        self.media.replace_video_track(screen.clone()).await?;
        media_state.screen_track = Some(screen);
        drop(media_state);

        self.manager
            .set_screen_sharing(&self.local_participant, true)
            .await;
        self.dispatch_control(ControlMessage::screen_share(
            self.local_participant.clone(),
            true,
        ))
        .await;
        Ok(())
    }

    /// Restore the camera as the outgoing video. No-op if not sharing.
    /// On failure the screen track is kept so a retry can finish the
    /// switch.
    pub async fn stop_screen_share(&self) -> Result<()> {
        let mut media_state = self.media_state.lock().await;
        if media_state.screen_track.is_none() {
            return Ok(());
        }
        if let Some(camera) = media_state.bundle.video.clone() {
            self.media.replace_video_track(camera).await?;
        }
        media_state.screen_track = None;
        drop(media_state);

        self.manager
            .set_screen_sharing(&self.local_participant, false)
            .await;
        self.dispatch_control(ControlMessage::screen_share(
            self.local_participant.clone(),
            false,
        ))
        .await;
        Ok(())
    }

    pub async fn start_recording(&self) -> Result<()> {
        let status = self.manager.status().await;
        if status != SessionStatus::Active {
            return Err(SessionError::invalid_state(status, "start_recording"));
        }
        if self.manager.set_recording(true).await {
            self.dispatch_control(ControlMessage::recording(
                self.local_participant.clone(),
                true,
            ))
            .await;
        }
        Ok(())
    }

    pub async fn stop_recording(&self) -> Result<()> {
        if self.manager.set_recording(false).await {
            self.dispatch_control(ControlMessage::recording(
                self.local_participant.clone(),
                false,
            ))
            .await;
        }
        Ok(())
    }

    /// End the session. Ending an already terminal session is a no-op;
    /// resources are released exactly once either way.
    pub async fn end_session(&self) {
        self.apply_lifecycle(LifecycleEvent::HangUp).await;
    }

    /// Hand a message to the control channel. A submission after
    /// permanent close drops the message and reports it as an error
    /// event; the session itself continues.
    async fn dispatch_control(&self, message: ControlMessage) {
        match self.control.send(message).await {
            Ok(()) => {}
            Err(SessionError::ChannelClosed) => {
                warn!(
                    "session {} dropped a control message, channel closed",
                    self.session_id
                );
                self.hub.publish(SessionEvent::Error {
                    session_id: self.session_id.clone(),
                    message: "control channel closed prematurely, message dropped".to_string(),
                });
            }
            Err(e) => warn!(
                "session {} could not send over control channel: {}",
                self.session_id, e
            ),
        }
    }

    async fn apply_lifecycle(&self, event: LifecycleEvent) -> Option<TransitionOutcome> {
        let outcome = self.manager.apply(&event).await?;
        match outcome.current {
            SessionStatus::Active => self.monitor.start(),
            SessionStatus::Ended | SessionStatus::Failed => self.finalize().await,
            SessionStatus::Waiting => {}
        }
        Some(outcome)
    }

    async fn report_signaling_failure(&self, message: String) {
        self.hub.publish(SessionEvent::Error {
            session_id: self.session_id.clone(),
            message: format!("signaling delivery failed: {message}"),
        });
        self.apply_lifecycle(LifecycleEvent::SignalingFailed).await;
    }

    /// Release everything exactly once: quality timer, relay (and its
    /// negotiation timer), control channel, peer link, media tracks, and
    /// the room claim.
    async fn finalize(&self) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("releasing resources for session {}", self.session_id);

        self.monitor.stop();
        self.relay.close().await;
        self.control.close().await;
        self.peer.close().await;

        let bundle = self.media_state.lock().await.bundle.clone();
        if let Err(e) = self.media.release_media(&bundle).await {
            warn!("session {} media release failed: {}", self.session_id, e);
        }

        self.registry.release(&self.room_id, &self.session_id);

        // The router may be the task running finalize; aborting it is
        // therefore the last step, taking effect at its next await
        if let Some(handle) = self.router.lock().take() {
            handle.abort();
        }
    }

    async fn route_events(
        this: Arc<Self>,
        mut peer_events: mpsc::Receiver<PeerConnectionEvent>,
        mut relay_events: mpsc::Receiver<RelayEvent>,
        mut media_events: Option<mpsc::Receiver<MediaProviderEvent>>,
    ) {
        loop {
            tokio::select! {
                maybe = peer_events.recv() => match maybe {
                    Some(event) => this.on_peer_event(event).await,
                    None => break,
                },
                maybe = relay_events.recv() => match maybe {
                    Some(event) => this.on_relay_event(event).await,
                    None => break,
                },
                maybe = Self::recv_media(&mut media_events) => match maybe {
                    Some(event) => this.on_media_event(event).await,
                    // Stream ended; the arm stays pending from here on
                    None => {}
                },
            }
        }
        debug!("event router stopped for session {}", this.session_id);
    }

    /// Receive from an optional stream; pends forever once the stream is
    /// gone so the select arm never spins
    async fn recv_media(
        rx: &mut Option<mpsc::Receiver<MediaProviderEvent>>,
    ) -> Option<MediaProviderEvent> {
        match rx {
            Some(receiver) => match receiver.recv().await {
                Some(event) => Some(event),
                None => {
                    *rx = None;
                    None
                }
            },
            None => std::future::pending().await,
        }
    }

    async fn on_peer_event(&self, event: PeerConnectionEvent) {
        match event {
            PeerConnectionEvent::LocalCandidate(candidate) => {
                self.relay.local_candidate(candidate).await;
            }
            PeerConnectionEvent::LinkStateChanged(state) => {
                debug!("session {} link {}", self.session_id, state);
                self.apply_lifecycle(LifecycleEvent::Link(state)).await;
            }
            PeerConnectionEvent::ControlChannelStateChanged(state) => {
                self.control.handle_state_change(state).await;
            }
            PeerConnectionEvent::ControlFrame(frame) => {
                self.on_control_frame(&frame).await;
            }
        }
    }

    async fn on_relay_event(&self, event: RelayEvent) {
        match event {
            RelayEvent::OfferReceived(offer) => {
                // Callee side: answer as soon as the offer lands
                if let Err(e) = self.relay.create_answer(offer).await {
                    warn!("session {} could not answer offer: {}", self.session_id, e);
                    if matches!(e, SignalingError::DeliveryFailure(_)) {
                        self.report_signaling_failure(e.to_string()).await;
                    }
                }
            }
            RelayEvent::AnswerApplied => {
                debug!("session {} negotiation complete", self.session_id);
            }
            RelayEvent::NegotiationTimedOut => {
                self.hub.publish(SessionEvent::Error {
                    session_id: self.session_id.clone(),
                    message: format!(
                        "no answer within {:?}",
                        self.config.negotiation_timeout
                    ),
                });
                self.apply_lifecycle(LifecycleEvent::NegotiationTimedOut).await;
            }
            RelayEvent::DeliveryFailed(message) => {
                self.report_signaling_failure(message).await;
            }
        }
    }

    async fn on_media_event(&self, event: MediaProviderEvent) {
        match event {
            MediaProviderEvent::RemoteTrackReceived { track } => {
                self.hub.publish(SessionEvent::RemoteTrackAdded {
                    session_id: self.session_id.clone(),
                    track,
                });
            }
            MediaProviderEvent::RemoteTrackEnded { track_id } => {
                self.hub.publish(SessionEvent::RemoteTrackRemoved {
                    session_id: self.session_id.clone(),
                    track_id,
                });
            }
        }
    }

    async fn on_control_frame(&self, frame: &[u8]) {
        let message = match ControlMessage::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    "session {} dropped malformed control frame: {}",
                    self.session_id, e
                );
                return;
            }
        };
        match message.body {
            ControlBody::Chat { text } => {
                if !self.config.chat_enabled {
                    debug!(
                        "session {} dropping inbound chat, chat disabled",
                        self.session_id
                    );
                    return;
                }
                self.hub.publish(SessionEvent::ChatMessage {
                    session_id: self.session_id.clone(),
                    sender_id: message.sender_id,
                    sent_at: message.sent_at,
                    text,
                });
            }
            ControlBody::ScreenShareStart => {
                self.manager
                    .set_screen_sharing(&message.sender_id, true)
                    .await;
            }
            ControlBody::ScreenShareStop => {
                self.manager
                    .set_screen_sharing(&message.sender_id, false)
                    .await;
            }
            ControlBody::RecordingStart => {
                self.manager.set_recording(true).await;
            }
            ControlBody::RecordingStop => {
                self.manager.set_recording(false).await;
            }
        }
    }
}
