//! A complete simulated consultation between two endpoints.
//!
//! This example demonstrates:
//! - Creating a doctor and a patient session in the same room
//! - Offer/answer negotiation over the in-memory signaling hub
//! - Chat, screen sharing, and recording over the control channel
//! - Quality updates from a scripted media provider
//! - Clean teardown on both sides
//!
//! Run with `RUST_LOG=televisit=debug` to watch the engine internals.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::sleep;

use televisit_media_core::testing::FakeMediaProvider;
use televisit_media_core::QualitySample;
use televisit_signaling_core::testing::{
    FakePeerConnection, FakePeerFactory, InMemorySignalingHub,
};
use televisit_signaling_core::{LinkState, RoomId};
use televisit_session_core::prelude::*;
use televisit_session_core::SessionObserver;

/// Prints everything one side of the call sees
struct ConsoleObserver {
    label: &'static str,
}

#[async_trait]
impl SessionObserver for ConsoleObserver {
    async fn on_state_changed(
        &self,
        previous: SessionStatus,
        current: SessionStatus,
        reason: Option<EndReason>,
    ) {
        match reason {
            Some(reason) => println!(
                "[{}] state {} -> {} ({})",
                self.label, previous, current, reason
            ),
            None => println!("[{}] state {} -> {}", self.label, previous, current),
        }
    }

    async fn on_participant_joined(&self, participant: &Participant) {
        println!(
            "[{}] participant joined: {} ({})",
            self.label, participant.display_name, participant.id.0
        );
    }

    async fn on_chat_message(
        &self,
        sender_id: &ParticipantId,
        _sent_at: chrono::DateTime<chrono::Utc>,
        text: &str,
    ) {
        println!("[{}] {} says: {}", self.label, sender_id.0, text);
    }

    async fn on_screen_share_started(&self, participant_id: &ParticipantId) {
        println!(
            "[{}] {} started sharing their screen",
            self.label, participant_id.0
        );
    }

    async fn on_screen_share_stopped(&self, participant_id: &ParticipantId) {
        println!("[{}] {} stopped sharing", self.label, participant_id.0);
    }

    async fn on_recording_started(&self) {
        println!("[{}] recording started", self.label);
    }

    async fn on_recording_stopped(&self) {
        println!("[{}] recording stopped", self.label);
    }

    async fn on_quality_update(&self, sample: &QualitySample) {
        println!("[{}] connection quality: {}", self.label, sample.level());
    }

    async fn on_error(&self, message: &str) {
        println!("[{}] error: {}", self.label, message);
    }
}

struct Side {
    session: Arc<SessionOrchestrator>,
    media: Arc<FakeMediaProvider>,
    peer: Arc<FakePeerConnection>,
}

async fn make_side(
    signaling: Arc<InMemorySignalingHub>,
    store: Arc<InMemorySessionStore>,
    room: &RoomId,
    peer: (
        Arc<FakePeerConnection>,
        tokio::sync::mpsc::Receiver<televisit_signaling_core::PeerConnectionEvent>,
    ),
    info: ParticipantInfo,
) -> Result<Side> {
    let media = Arc::new(FakeMediaProvider::new());
    let factory = Arc::new(FakePeerFactory::new());
    let fake_peer = peer.0.clone();
    factory.prepare(peer.0, peer.1);

    let deps = SessionDeps {
        media: media.clone(),
        peers: factory,
        signaling,
        store,
        registry: Arc::new(SessionRegistry::new()),
    };
    // Sample quickly so the example shows quality updates without a wait
    let config = SessionConfig::default().with_quality_interval(Duration::from_millis(500));
    let session = SessionOrchestrator::create_session(deps, config, room.clone(), info).await?;

    Ok(Side {
        session,
        media,
        peer: fake_peer,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse()?),
        )
        .init();

    // Shared infrastructure: the signaling bus and the session store
    let signaling = Arc::new(InMemorySignalingHub::new());
    let store = Arc::new(InMemorySessionStore::new());
    let room = RoomId::from("consultation-42");

    // One linked peer pair; each side gets one half
    let (doctor_peer, patient_peer) = FakePeerConnection::pair("doctor", "patient");

    println!("=== Creating sessions ===");
    let doctor = make_side(
        signaling.clone(),
        store.clone(),
        &room,
        doctor_peer,
        ParticipantInfo::new("doctor-1", ParticipantRole::Doctor, "Dr. Imani Osei"),
    )
    .await?;
    let patient = make_side(
        signaling.clone(),
        store.clone(),
        &room,
        patient_peer,
        ParticipantInfo::new("patient-7", ParticipantRole::Patient, "Jonas Feld"),
    )
    .await?;

    doctor
        .session
        .attach_observer(Arc::new(ConsoleObserver { label: "CLINIC" }));
    patient
        .session
        .attach_observer(Arc::new(ConsoleObserver { label: "PATIENT" }));
    sleep(Duration::from_millis(100)).await;

    println!("\n=== Negotiating ===");
    // The doctor dials; the patient's session answers by itself
    doctor.session.connect().await?;
    sleep(Duration::from_millis(100)).await;

    // The fakes stand in for the transport layer reporting connectivity
    doctor.peer.emit_link_state(LinkState::Connected).await;
    patient.peer.emit_link_state(LinkState::Connected).await;
    doctor.peer.open_control_channel().await;
    patient.peer.open_control_channel().await;
    sleep(Duration::from_millis(100)).await;

    println!("\n=== In consultation ===");
    doctor.session.send_chat("Good morning! How are you feeling?").await?;
    patient.session.send_chat("Much better than last week.").await?;
    sleep(Duration::from_millis(100)).await;

    doctor.session.start_screen_share().await?;
    doctor.session.send_chat("These are your lab results.").await?;
    doctor.session.start_recording().await?;

    // Let a few quality samples come through
    sleep(Duration::from_millis(1200)).await;

    doctor.session.stop_recording().await?;
    doctor.session.stop_screen_share().await?;
    sleep(Duration::from_millis(100)).await;

    println!("\n=== Hanging up ===");
    doctor.session.end_session().await;
    // The patient's transport notices the peer going away
    patient.peer.emit_link_state(LinkState::Disconnected).await;
    sleep(Duration::from_millis(200)).await;

    println!("\n=== Stored session history ===");
    for side in [&doctor, &patient] {
        let id = side.session.id();
        let history: Vec<String> = store
            .status_history(id)
            .iter()
            .map(|s| s.to_string())
            .collect();
        println!("{}: {}", id, history.join(" -> "));
        println!(
            "  media acquired {} time(s), released {} time(s)",
            side.media.acquire_count(),
            side.media.release_count()
        );
    }

    Ok(())
}
