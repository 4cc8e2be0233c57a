//! Shared harness for the session integration tests: an in-process
//! signaling bus, fake media providers and peer links, and helpers to
//! drive a two-party call.

// Each test binary uses a different subset of these helpers
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use televisit_media_core::testing::FakeMediaProvider;
use televisit_signaling_core::testing::{
    FakePeerConnection, FakePeerFactory, InMemorySignalingHub,
};
use televisit_signaling_core::{LinkState, PeerConnectionEvent, RoomId};
use televisit_session_core::prelude::*;

/// One side of a call, with handles to its fakes for assertions
pub struct Endpoint {
    pub session: Arc<SessionOrchestrator>,
    pub media: Arc<FakeMediaProvider>,
    pub peer: Arc<FakePeerConnection>,
    pub registry: Arc<SessionRegistry>,
}

/// Infrastructure shared by every endpoint in a test
pub struct Bench {
    pub signaling: Arc<InMemorySignalingHub>,
    pub store: Arc<InMemorySessionStore>,
}

impl Bench {
    pub fn new() -> Self {
        Self {
            signaling: Arc::new(InMemorySignalingHub::new()),
            store: Arc::new(InMemorySessionStore::new()),
        }
    }

    /// Create an endpoint around a prepared fake peer. Each endpoint
    /// models its own client process: fresh provider, fresh registry.
    pub async fn endpoint(
        &self,
        room: &RoomId,
        peer: (Arc<FakePeerConnection>, mpsc::Receiver<PeerConnectionEvent>),
        info: ParticipantInfo,
        config: SessionConfig,
    ) -> Endpoint {
        let media = Arc::new(FakeMediaProvider::new());
        let factory = Arc::new(FakePeerFactory::new());
        let fake_peer = peer.0.clone();
        factory.prepare(peer.0, peer.1);
        let registry = Arc::new(SessionRegistry::new());

        let deps = SessionDeps {
            media: media.clone(),
            peers: factory,
            signaling: self.signaling.clone(),
            store: self.store.clone(),
            registry: registry.clone(),
        };
        let session = SessionOrchestrator::create_session(deps, config, room.clone(), info)
            .await
            .expect("session creation failed");

        Endpoint {
            session,
            media,
            peer: fake_peer,
            registry,
        }
    }

    /// An endpoint with a free-standing fake peer (no twin)
    pub async fn solo_endpoint(
        &self,
        room: &RoomId,
        info: ParticipantInfo,
        config: SessionConfig,
    ) -> Endpoint {
        self.endpoint(room, FakePeerConnection::new("solo"), info, config)
            .await
    }

    /// Doctor and patient endpoints in one room, with their control
    /// channels crossed over
    pub async fn call_pair(&self, room: &RoomId) -> (Endpoint, Endpoint) {
        let (doctor_peer, patient_peer) = FakePeerConnection::pair("doctor", "patient");
        let doctor = self
            .endpoint(room, doctor_peer, doctor_info(), SessionConfig::default())
            .await;
        let patient = self
            .endpoint(room, patient_peer, patient_info(), SessionConfig::default())
            .await;
        (doctor, patient)
    }
}

pub fn doctor_info() -> ParticipantInfo {
    ParticipantInfo::new("doctor-1", ParticipantRole::Doctor, "Dr. Haldar")
}

pub fn patient_info() -> ParticipantInfo {
    ParticipantInfo::new("patient-1", ParticipantRole::Patient, "Noor Haddad")
}

/// Dial from the doctor side and report both transports connected
pub async fn go_active(doctor: &Endpoint, patient: &Endpoint) {
    doctor.session.connect().await.expect("offer failed");
    doctor.peer.emit_link_state(LinkState::Connected).await;
    patient.peer.emit_link_state(LinkState::Connected).await;
    wait_for_status(&doctor.session, SessionStatus::Active).await;
    wait_for_status(&patient.session, SessionStatus::Active).await;
}

/// Open the control channel on both sides
pub async fn open_control(doctor: &Endpoint, patient: &Endpoint) {
    doctor.peer.open_control_channel().await;
    patient.peer.open_control_channel().await;
}

/// Block until the session reports the target status. Uses the session's
/// own event stream, so transitions that already happened are seen via
/// replay.
pub async fn wait_for_status(session: &Arc<SessionOrchestrator>, target: SessionStatus) {
    let mut stream = session.subscribe();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if session.status().await == target {
                return;
            }
            if stream.next().await.is_none() {
                panic!("event stream ended before reaching {target}");
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for status {target}"));
}

/// Poll (bounded) until a condition on the fakes holds
pub async fn wait_until<F>(mut condition: F, what: &str)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting until {what}"));
}

/// Wait (bounded) for an event matching the predicate, returning it
pub async fn wait_for_event<F>(stream: &mut SessionEventStream, mut matches: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match stream.next().await {
                Some(event) if matches(&event) => return event,
                Some(_) => {}
                None => panic!("event stream ended"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Collect everything currently available without waiting
pub fn drain(stream: &mut SessionEventStream) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.try_next() {
        events.push(event);
    }
    events
}
