//! In-memory test doubles for the signaling transport and the peer link.
//!
//! `InMemorySignalingHub` is a complete room-addressed bus living in one
//! process: publishes fan out to every other member of the room (never
//! back to the publisher). `FakePeerConnection` fabricates deterministic
//! descriptions and records everything applied to it; two fakes can be
//! linked as a pair so control frames sent on one arrive as events on the
//! other. A fake's event stream is driven explicitly by the test (`emit_*`
//! helpers); it ends once every holder of the fake has closed or dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{Result, SignalingError};
use crate::peer::{
    ControlChannelState, LinkState, PeerConnection, PeerConnectionEvent, PeerConnectionFactory,
};
use crate::transport::{SignalingPublisher, SignalingTransport};
use crate::types::{IceCandidate, RoomId, SdpKind, SessionDescription, SignalEnvelope};

#[derive(Clone)]
struct Member {
    id: u64,
    tx: mpsc::Sender<SignalEnvelope>,
}

struct HubInner {
    rooms: DashMap<RoomId, Vec<Member>>,
    fail_publish: Mutex<Option<String>>,
    next_member: AtomicU64,
}

/// In-process signaling bus addressed by room.
pub struct InMemorySignalingHub {
    inner: Arc<HubInner>,
}

impl InMemorySignalingHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                rooms: DashMap::new(),
                fail_publish: Mutex::new(None),
                next_member: AtomicU64::new(1),
            }),
        }
    }

    /// Make every subsequent publish fail with this message
    pub fn fail_publishes(&self, reason: impl Into<String>) {
        *self.inner.fail_publish.lock() = Some(reason.into());
    }

    /// Let publishes succeed again
    pub fn clear_failure(&self) {
        *self.inner.fail_publish.lock() = None;
    }

    /// Number of members currently joined to the room
    pub fn member_count(&self, room: &RoomId) -> usize {
        self.inner.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }
}

impl Default for InMemorySignalingHub {
    fn default() -> Self {
        Self::new()
    }
}

struct HubPublisher {
    inner: Arc<HubInner>,
    room: RoomId,
    member_id: u64,
}

#[async_trait]
impl SignalingPublisher for HubPublisher {
    async fn publish(&self, envelope: SignalEnvelope) -> Result<()> {
        if let Some(reason) = self.inner.fail_publish.lock().clone() {
            return Err(SignalingError::DeliveryFailure(reason));
        }
        // Collect targets first so no map guard lives across an await
        let targets: Vec<mpsc::Sender<SignalEnvelope>> = self
            .inner
            .rooms
            .get(&self.room)
            .map(|members| {
                members
                    .iter()
                    .filter(|m| m.id != self.member_id)
                    .map(|m| m.tx.clone())
                    .collect()
            })
            .unwrap_or_default();
        for tx in targets {
            let _ = tx.send(envelope.clone()).await;
        }
        Ok(())
    }

    async fn leave(&self) {
        if let Some(mut members) = self.inner.rooms.get_mut(&self.room) {
            members.retain(|m| m.id != self.member_id);
        }
    }
}

#[async_trait]
impl SignalingTransport for InMemorySignalingHub {
    async fn join(
        &self,
        room: &RoomId,
    ) -> Result<(Arc<dyn SignalingPublisher>, mpsc::Receiver<SignalEnvelope>)> {
        let (tx, rx) = mpsc::channel(64);
        let member_id = self.inner.next_member.fetch_add(1, Ordering::SeqCst);
        self.inner
            .rooms
            .entry(room.clone())
            .or_default()
            .push(Member { id: member_id, tx });
        let publisher = Arc::new(HubPublisher {
            inner: self.inner.clone(),
            room: room.clone(),
            member_id,
        });
        Ok((publisher, rx))
    }
}

#[derive(Default)]
struct FakePeerState {
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    remote_candidates: Vec<IceCandidate>,
    offer_seq: u32,
    closed: bool,
}

/// Scriptable in-memory peer connection.
pub struct FakePeerConnection {
    name: String,
    state: Mutex<FakePeerState>,
    sent_frames: Mutex<Vec<Bytes>>,
    close_calls: AtomicUsize,
    events_tx: Mutex<Option<mpsc::Sender<PeerConnectionEvent>>>,
    /// Twin's event sender when linked as a pair
    linked: Mutex<Option<mpsc::Sender<PeerConnectionEvent>>>,
    fail_sends: Mutex<Option<String>>,
}

impl FakePeerConnection {
    pub fn new(name: impl Into<String>) -> (Arc<Self>, mpsc::Receiver<PeerConnectionEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let peer = Arc::new(Self {
            name: name.into(),
            state: Mutex::new(FakePeerState::default()),
            sent_frames: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
            events_tx: Mutex::new(Some(tx)),
            linked: Mutex::new(None),
            fail_sends: Mutex::new(None),
        });
        (peer, rx)
    }

    /// Create two fakes whose control frames cross over to each other
    pub fn pair(
        a: impl Into<String>,
        b: impl Into<String>,
    ) -> (
        (Arc<Self>, mpsc::Receiver<PeerConnectionEvent>),
        (Arc<Self>, mpsc::Receiver<PeerConnectionEvent>),
    ) {
        let (peer_a, rx_a) = Self::new(a);
        let (peer_b, rx_b) = Self::new(b);
        *peer_a.linked.lock() = peer_b.events_tx.lock().clone();
        *peer_b.linked.lock() = peer_a.events_tx.lock().clone();
        ((peer_a, rx_a), (peer_b, rx_b))
    }

    /// Push an arbitrary event into this peer's stream
    pub async fn emit(&self, event: PeerConnectionEvent) {
        let tx = self.events_tx.lock().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    pub async fn emit_link_state(&self, state: LinkState) {
        self.emit(PeerConnectionEvent::LinkStateChanged(state)).await;
    }

    pub async fn emit_local_candidate(&self, candidate: IceCandidate) {
        self.emit(PeerConnectionEvent::LocalCandidate(candidate)).await;
    }

    pub async fn open_control_channel(&self) {
        self.emit(PeerConnectionEvent::ControlChannelStateChanged(
            ControlChannelState::Open,
        ))
        .await;
    }

    pub async fn close_control_channel(&self) {
        self.emit(PeerConnectionEvent::ControlChannelStateChanged(
            ControlChannelState::Closed,
        ))
        .await;
    }

    /// Make subsequent `send_control` calls fail with this message
    pub fn fail_sends(&self, reason: impl Into<String>) {
        *self.fail_sends.lock() = Some(reason.into());
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().remote_description.clone()
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.state.lock().local_description.clone()
    }

    /// Remote candidates applied so far, in application order
    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().remote_candidates.clone()
    }

    /// Control frames sent from this side, in send order
    pub fn sent_frames(&self) -> Vec<Bytes> {
        self.sent_frames.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnection for FakePeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SignalingError::peer("connection closed"));
        }
        state.offer_seq += 1;
        Ok(SessionDescription::offer(format!(
            "v=0 o={} s=offer-{}",
            self.name, state.offer_seq
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let state = self.state.lock();
        if state.closed {
            return Err(SignalingError::peer("connection closed"));
        }
        if state.remote_description.is_none() {
            return Err(SignalingError::invalid_state(
                "create_answer without remote description",
            ));
        }
        Ok(SessionDescription::answer(format!(
            "v=0 o={} s=answer",
            self.name
        )))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.state.lock().local_description = Some(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.state.lock().remote_description = Some(desc);
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SignalingError::peer("connection closed"));
        }
        state.remote_candidates.push(candidate);
        Ok(())
    }

    async fn send_control(&self, frame: Bytes) -> Result<()> {
        if let Some(reason) = self.fail_sends.lock().clone() {
            return Err(SignalingError::peer(reason));
        }
        if self.state.lock().closed {
            return Err(SignalingError::peer("connection closed"));
        }
        self.sent_frames.lock().push(frame.clone());
        let linked = self.linked.lock().clone();
        if let Some(twin) = linked {
            let _ = twin.send(PeerConnectionEvent::ControlFrame(frame)).await;
        }
        Ok(())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().closed = true;
        self.events_tx.lock().take();
        self.linked.lock().take();
    }
}

/// Factory handing out prepared fakes, or fresh unlinked ones when the
/// prepared queue is empty.
pub struct FakePeerFactory {
    prepared: Mutex<VecDeque<(Arc<FakePeerConnection>, mpsc::Receiver<PeerConnectionEvent>)>>,
    created: Mutex<Vec<Arc<FakePeerConnection>>>,
    fail_create: Mutex<Option<String>>,
}

impl FakePeerFactory {
    pub fn new() -> Self {
        Self {
            prepared: Mutex::new(VecDeque::new()),
            created: Mutex::new(Vec::new()),
            fail_create: Mutex::new(None),
        }
    }

    /// Queue a specific fake (typically one half of a pair) for the next
    /// `create_peer` call
    pub fn prepare(
        &self,
        peer: Arc<FakePeerConnection>,
        events: mpsc::Receiver<PeerConnectionEvent>,
    ) {
        self.prepared.lock().push_back((peer, events));
    }

    /// Make the next `create_peer` call fail
    pub fn fail_create(&self, reason: impl Into<String>) {
        *self.fail_create.lock() = Some(reason.into());
    }

    /// Every fake handed out so far, in creation order
    pub fn created(&self) -> Vec<Arc<FakePeerConnection>> {
        self.created.lock().clone()
    }
}

impl Default for FakePeerFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerConnectionFactory for FakePeerFactory {
    async fn create_peer(
        &self,
    ) -> Result<(Arc<dyn PeerConnection>, mpsc::Receiver<PeerConnectionEvent>)> {
        if let Some(reason) = self.fail_create.lock().clone() {
            return Err(SignalingError::peer(reason));
        }
        let (peer, events) = self
            .prepared
            .lock()
            .pop_front()
            .unwrap_or_else(|| FakePeerConnection::new("fake-peer"));
        self.created.lock().push(peer.clone());
        Ok((peer, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hub_does_not_echo() {
        let hub = InMemorySignalingHub::new();
        let room = RoomId::from("room-echo");
        let (pub_a, mut rx_a) = hub.join(&room).await.unwrap();
        let (_pub_b, mut rx_b) = hub.join(&room).await.unwrap();

        pub_a
            .publish(SignalEnvelope::offer(
                "session-a",
                room.clone(),
                SessionDescription::offer("v=0"),
            ))
            .await
            .unwrap();

        let delivered = rx_b.recv().await.unwrap();
        assert_eq!(delivered.session_id, "session-a");
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_hub_leave_is_idempotent() {
        let hub = InMemorySignalingHub::new();
        let room = RoomId::from("room-leave");
        let (pub_a, _rx_a) = hub.join(&room).await.unwrap();
        let (_pub_b, _rx_b) = hub.join(&room).await.unwrap();
        assert_eq!(hub.member_count(&room), 2);

        pub_a.leave().await;
        pub_a.leave().await;
        assert_eq!(hub.member_count(&room), 1);
    }

    #[tokio::test]
    async fn test_fake_peer_offer_answer() {
        let (peer, _rx) = FakePeerConnection::new("alice");
        let offer = peer.create_offer().await.unwrap();
        assert_eq!(offer.kind, SdpKind::Offer);

        // Answer requires a remote description first
        assert!(peer.create_answer().await.is_err());
        peer.set_remote_description(SessionDescription::offer("v=0 remote"))
            .await
            .unwrap();
        let answer = peer.create_answer().await.unwrap();
        assert_eq!(answer.kind, SdpKind::Answer);
    }

    #[tokio::test]
    async fn test_paired_control_frames_cross_over() {
        let ((peer_a, _rx_a), (_peer_b, mut rx_b)) = FakePeerConnection::pair("a", "b");
        peer_a.send_control(Bytes::from_static(b"hello")).await.unwrap();

        match rx_b.recv().await.unwrap() {
            PeerConnectionEvent::ControlFrame(frame) => assert_eq!(&frame[..], b"hello"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(peer_a.sent_frames().len(), 1);
    }
}
