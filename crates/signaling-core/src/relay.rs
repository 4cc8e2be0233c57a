//! Offer/answer and trickle-ICE relay.
//!
//! One relay sits between a session's local [`PeerConnection`] and the
//! room's signaling channel. It owns the negotiation state, the trickle
//! buffers, and the answer timeout:
//!
//! - locally gathered candidates are buffered until the offer/answer
//!   exchange completes, then flushed in gathering order;
//! - remote candidates arriving before the remote description are
//!   deferred and applied immediately after it;
//! - an offer arms a timeout; if no answer lands in time the relay
//!   reports [`RelayEvent::NegotiationTimedOut`] and the owning session
//!   moves to failed.
//!
//! Incoming envelopes are consumed by a relay-owned reader task. Remote
//! offers are surfaced for the owner to answer; answers and candidates
//! are applied internally.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, SignalingError};
use crate::peer::PeerConnection;
use crate::transport::SignalingPublisher;
use crate::types::{IceCandidate, RoomId, SessionDescription, SignalEnvelope, SignalPayload};

/// Relay tuning
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// How long to wait for the remote answer after publishing an offer
    pub answer_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            answer_timeout: Duration::from_secs(30),
        }
    }
}

/// Where the offer/answer exchange currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationState {
    /// Nothing exchanged yet
    #[default]
    Idle,
    /// Local offer published, waiting for the answer
    OfferSent,
    /// Remote offer surfaced, waiting for the owner to answer
    OfferReceived,
    /// Offer and answer both applied
    Complete,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationState::Idle => write!(f, "idle"),
            NegotiationState::OfferSent => write!(f, "offer-sent"),
            NegotiationState::OfferReceived => write!(f, "offer-received"),
            NegotiationState::Complete => write!(f, "complete"),
        }
    }
}

/// Events the relay reports to its owning session
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A remote offer arrived and awaits an answer
    OfferReceived(SessionDescription),
    /// The remote answer was applied; the exchange is complete
    AnswerApplied,
    /// No answer arrived within the configured timeout
    NegotiationTimedOut,
    /// The message bus rejected a publish
    DeliveryFailed(String),
}

#[derive(Default)]
struct RelayInner {
    negotiation: NegotiationState,
    remote_description_set: bool,
    /// Locally gathered candidates held until the exchange completes
    pending_local: Vec<IceCandidate>,
    /// Remote candidates held until the remote description is applied
    pending_remote: Vec<IceCandidate>,
    closed: bool,
    timeout_handle: Option<JoinHandle<()>>,
    reader_handle: Option<JoinHandle<()>>,
}

/// Signaling relay for one session.
pub struct SignalingRelay {
    session_id: String,
    room_id: RoomId,
    config: RelayConfig,
    peer: Arc<dyn PeerConnection>,
    publisher: Arc<dyn SignalingPublisher>,
    events: mpsc::Sender<RelayEvent>,
    inner: Mutex<RelayInner>,
}

impl SignalingRelay {
    /// Create the relay and start its envelope reader.
    pub async fn start(
        session_id: impl Into<String>,
        room_id: RoomId,
        config: RelayConfig,
        peer: Arc<dyn PeerConnection>,
        publisher: Arc<dyn SignalingPublisher>,
        incoming: mpsc::Receiver<SignalEnvelope>,
        events: mpsc::Sender<RelayEvent>,
    ) -> Arc<Self> {
        let relay = Arc::new(Self {
            session_id: session_id.into(),
            room_id,
            config,
            peer,
            publisher,
            events,
            inner: Mutex::new(RelayInner::default()),
        });

        let reader = tokio::spawn(Self::read_loop(relay.clone(), incoming));
        relay.inner.lock().await.reader_handle = Some(reader);

        debug!(
            "signaling relay started for session {} in room {}",
            relay.session_id, relay.room_id
        );
        relay
    }

    /// Create and publish the local offer, arming the answer timeout.
    pub async fn create_offer(&self) -> Result<()> {
        // Claim the state first. The lock must not be held across the
        // publisher or event channel awaits below, or close() could
        // block behind a wedged publish
        {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return Err(SignalingError::RelayClosed);
            }
            if inner.negotiation != NegotiationState::Idle {
                return Err(SignalingError::invalid_state(format!(
                    "cannot create offer while {}",
                    inner.negotiation
                )));
            }
            inner.negotiation = NegotiationState::OfferSent;
        }

        if let Err(e) = self.publish_offer().await {
            let mut inner = self.inner.lock().await;
            if inner.negotiation == NegotiationState::OfferSent {
                inner.negotiation = NegotiationState::Idle;
            }
            return Err(e);
        }

        let mut inner = self.inner.lock().await;
        if !inner.closed {
            inner.timeout_handle = Some(self.spawn_answer_timeout());
        }
        info!(
            "offer published for session {} (answer timeout {:?})",
            self.session_id, self.config.answer_timeout
        );
        Ok(())
    }

    async fn publish_offer(&self) -> Result<()> {
        let offer = self.peer.create_offer().await?;
        self.peer.set_local_description(offer.clone()).await?;
        self.publisher
            .publish(SignalEnvelope::offer(
                self.session_id.clone(),
                self.room_id.clone(),
                offer,
            ))
            .await
    }

    /// Apply a remote offer and publish the local answer. Remote
    /// candidates deferred before this point are applied right after the
    /// description, in arrival order.
    pub async fn create_answer(&self, offer: SessionDescription) -> Result<()> {
        let answer = {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return Err(SignalingError::RelayClosed);
            }
            match inner.negotiation {
                NegotiationState::Idle | NegotiationState::OfferReceived => {}
                state => {
                    return Err(SignalingError::invalid_state(format!(
                        "cannot answer while {}",
                        state
                    )))
                }
            }

            self.peer.set_remote_description(offer).await?;
            inner.remote_description_set = true;
            self.apply_deferred_remote(&mut inner).await;

            let answer = self.peer.create_answer().await?;
            self.peer.set_local_description(answer.clone()).await?;
            answer
        };

        self.publisher
            .publish(SignalEnvelope::answer(
                self.session_id.clone(),
                self.room_id.clone(),
                answer,
            ))
            .await?;

        let flush = {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return Ok(());
            }
            inner.negotiation = NegotiationState::Complete;
            std::mem::take(&mut inner.pending_local)
        };
        self.flush_candidates(flush).await;
        info!("answer published for session {}", self.session_id);
        Ok(())
    }

    /// Apply the remote answer: cancels the timeout, applies deferred
    /// candidates, flushes buffered local candidates.
    pub async fn handle_answer(&self, answer: SessionDescription) -> Result<()> {
        let flush = {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return Err(SignalingError::RelayClosed);
            }
            if inner.negotiation != NegotiationState::OfferSent {
                return Err(SignalingError::invalid_state(format!(
                    "answer received while {}",
                    inner.negotiation
                )));
            }

            if let Some(handle) = inner.timeout_handle.take() {
                handle.abort();
            }

            self.peer.set_remote_description(answer).await?;
            inner.remote_description_set = true;
            self.apply_deferred_remote(&mut inner).await;

            inner.negotiation = NegotiationState::Complete;
            std::mem::take(&mut inner.pending_local)
        };

        self.flush_candidates(flush).await;
        let _ = self.events.send(RelayEvent::AnswerApplied).await;
        info!("answer applied for session {}", self.session_id);
        Ok(())
    }

    /// Apply a remote candidate, deferring it while the remote
    /// description is unknown. Candidates for a closed relay are
    /// discarded silently.
    pub async fn add_ice_candidate(&self, candidate: IceCandidate) {
        {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                debug!(
                    "discarding ICE candidate for closed relay (session {})",
                    self.session_id
                );
                return;
            }
            if !inner.remote_description_set {
                inner.pending_remote.push(candidate);
                debug!(
                    "deferred remote candidate for session {} ({} pending)",
                    self.session_id,
                    inner.pending_remote.len()
                );
                return;
            }
        }
        if let Err(e) = self.peer.add_remote_candidate(candidate).await {
            warn!(
                "failed to apply remote candidate for session {}: {}",
                self.session_id, e
            );
        }
    }

    /// Route a locally gathered candidate: buffered until the exchange
    /// completes, published immediately afterwards (trickle ICE).
    pub async fn local_candidate(&self, candidate: IceCandidate) {
        {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                debug!(
                    "discarding local candidate for closed relay (session {})",
                    self.session_id
                );
                return;
            }
            if inner.negotiation != NegotiationState::Complete {
                inner.pending_local.push(candidate);
                return;
            }
        }
        self.publish_candidate(candidate).await;
    }

    /// Current negotiation state
    pub async fn negotiation_state(&self) -> NegotiationState {
        self.inner.lock().await.negotiation
    }

    /// Close the relay: cancel the timeout, stop the reader, drop the
    /// buffers, leave the room. Idempotent.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.pending_local.clear();
        inner.pending_remote.clear();
        if let Some(handle) = inner.timeout_handle.take() {
            handle.abort();
        }
        if let Some(handle) = inner.reader_handle.take() {
            handle.abort();
        }
        drop(inner);

        self.publisher.leave().await;
        debug!("signaling relay closed for session {}", self.session_id);
    }

    fn spawn_answer_timeout(&self) -> JoinHandle<()> {
        let timeout = self.config.answer_timeout;
        let events = self.events.clone();
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!("no answer within {:?} for session {}", timeout, session_id);
            let _ = events.send(RelayEvent::NegotiationTimedOut).await;
        })
    }

    async fn read_loop(relay: Arc<Self>, mut incoming: mpsc::Receiver<SignalEnvelope>) {
        while let Some(envelope) = incoming.recv().await {
            relay.handle_envelope(envelope).await;
        }
        debug!(
            "signaling channel drained for session {}",
            relay.session_id
        );
    }

    async fn handle_envelope(&self, envelope: SignalEnvelope) {
        debug!(
            "session {} received {} envelope from {}",
            self.session_id,
            envelope.payload.type_name(),
            envelope.session_id
        );
        match envelope.payload {
            SignalPayload::Offer(desc) => {
                {
                    let mut inner = self.inner.lock().await;
                    if inner.closed {
                        return;
                    }
                    if inner.negotiation == NegotiationState::Idle {
                        inner.negotiation = NegotiationState::OfferReceived;
                    }
                }
                let _ = self.events.send(RelayEvent::OfferReceived(desc)).await;
            }
            SignalPayload::Answer(desc) => {
                if let Err(e) = self.handle_answer(desc).await {
                    warn!(
                        "ignoring remote answer for session {}: {}",
                        self.session_id, e
                    );
                }
            }
            SignalPayload::IceCandidate(candidate) => {
                self.add_ice_candidate(candidate).await;
            }
        }
    }

    async fn apply_deferred_remote(&self, inner: &mut RelayInner) {
        let deferred = std::mem::take(&mut inner.pending_remote);
        if deferred.is_empty() {
            return;
        }
        debug!(
            "applying {} deferred remote candidates for session {}",
            deferred.len(),
            self.session_id
        );
        for candidate in deferred {
            if let Err(e) = self.peer.add_remote_candidate(candidate).await {
                warn!(
                    "failed to apply deferred candidate for session {}: {}",
                    self.session_id, e
                );
            }
        }
    }

    /// Publish candidates taken out of the trickle buffer. The first
    /// delivery failure stops the flush; one failure event already fails
    /// the owning session.
    async fn flush_candidates(&self, pending: Vec<IceCandidate>) {
        if pending.is_empty() {
            return;
        }
        debug!(
            "flushing {} buffered local candidates for session {}",
            pending.len(),
            self.session_id
        );
        let mut rest = pending.into_iter();
        while let Some(candidate) = rest.next() {
            if !self.publish_candidate(candidate).await {
                let dropped = rest.count();
                if dropped > 0 {
                    debug!(
                        "dropping {} undelivered candidates for session {}",
                        dropped, self.session_id
                    );
                }
                return;
            }
        }
    }

    /// Returns false when the bus rejected the publish. The failure
    /// event must not block: this can run on the very task that drains
    /// the event channel.
    async fn publish_candidate(&self, candidate: IceCandidate) -> bool {
        let envelope = SignalEnvelope::candidate(
            self.session_id.clone(),
            self.room_id.clone(),
            candidate,
        );
        match self.publisher.publish(envelope).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "candidate delivery failed for session {}: {}",
                    self.session_id, e
                );
                if self
                    .events
                    .try_send(RelayEvent::DeliveryFailed(e.to_string()))
                    .is_err()
                {
                    debug!(
                        "delivery failure for session {} already pending upstream",
                        self.session_id
                    );
                }
                false
            }
        }
    }
}
