//! Control channel integration tests: chat queueing and flush order,
//! the closed-channel drop discipline, and screen share / recording
//! notifications crossing to the other side.

mod common;

use std::time::Duration;

use chrono::Utc;

use televisit_signaling_core::testing::FakePeerConnection;
use televisit_signaling_core::RoomId;
use televisit_session_core::prelude::*;

use common::{doctor_info, go_active, open_control, patient_info, wait_for_event, Bench};

#[tokio::test]
async fn test_chat_sent_before_open_is_flushed_in_order() {
    let bench = Bench::new();
    let room = RoomId::from("control-201");
    let (doctor, patient) = bench.call_pair(&room).await;
    go_active(&doctor, &patient).await;

    // The channel is still connecting; both messages are queued locally
    doctor
        .session
        .send_chat("How are you feeling today?")
        .await
        .expect("queueing failed");
    doctor
        .session
        .send_chat("I have your lab results.")
        .await
        .expect("queueing failed");
    let queued_by = Utc::now();
    assert!(doctor.peer.sent_frames().is_empty());

    let mut patient_events = patient.session.subscribe();
    doctor.peer.open_control_channel().await;

    let mut messages = Vec::new();
    while messages.len() < 2 {
        match patient_events.next().await {
            Some(SessionEvent::ChatMessage {
                sender_id,
                sent_at,
                text,
                ..
            }) => messages.push((sender_id, sent_at, text)),
            Some(_) => {}
            None => panic!("event stream ended early"),
        }
    }
    assert_eq!(messages[0].0 .0, "doctor-1");
    assert_eq!(messages[0].2, "How are you feeling today?");
    assert_eq!(messages[1].2, "I have your lab results.");
    // Stamped at submission, not at the later flush
    for (_, sent_at, _) in &messages {
        assert!(*sent_at <= queued_by);
    }
    assert_eq!(doctor.peer.sent_frames().len(), 2);

    doctor.session.end_session().await;
    patient.session.end_session().await;
}

#[tokio::test]
async fn test_chat_after_channel_close_is_dropped_and_reported() {
    let bench = Bench::new();
    let room = RoomId::from("control-202");
    let (doctor, patient) = bench.call_pair(&room).await;
    go_active(&doctor, &patient).await;
    open_control(&doctor, &patient).await;

    let mut stream = doctor.session.subscribe();
    doctor.peer.close_control_channel().await;

    // The close notification travels through the event router. The
    // submission itself stays Ok either way, so the error event is the
    // signal that the drop discipline took effect.
    tokio::time::timeout(Duration::from_secs(2), async {
        let mut reported = false;
        while !reported {
            doctor
                .session
                .send_chat("are you still there?")
                .await
                .expect("chat submission failed");
            while let Some(event) = stream.try_next() {
                if let SessionEvent::Error { message, .. } = event {
                    assert!(message.contains("control channel closed"));
                    reported = true;
                }
            }
            if !reported {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    })
    .await
    .expect("channel close never took effect");

    // From here every submission is dropped before the peer sees it
    let frames_before = doctor.peer.sent_frames().len();
    doctor
        .session
        .send_chat("hello?")
        .await
        .expect("chat submission failed");
    assert_eq!(doctor.peer.sent_frames().len(), frames_before);

    // The call itself is unaffected
    assert_eq!(doctor.session.status().await, SessionStatus::Active);

    doctor.session.end_session().await;
    patient.session.end_session().await;
}

#[tokio::test]
async fn test_screen_share_crosses_to_the_other_side() {
    let bench = Bench::new();
    let room = RoomId::from("control-203");
    let (doctor, patient) = bench.call_pair(&room).await;
    go_active(&doctor, &patient).await;
    open_control(&doctor, &patient).await;

    let mut patient_events = patient.session.subscribe();

    doctor.session.start_screen_share().await.expect("share failed");
    // Starting twice is a no-op, not a second announcement
    doctor.session.start_screen_share().await.expect("share failed");

    let started = wait_for_event(&mut patient_events, |event| {
        matches!(event, SessionEvent::ScreenShareStarted { .. })
    })
    .await;
    match started {
        SessionEvent::ScreenShareStarted { participant_id, .. } => {
            assert_eq!(participant_id.0, "doctor-1");
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Both records carry the flag, and the outgoing video is the capture
    assert!(doctor.session.snapshot().await.screen_sharing_active);
    assert!(patient.session.snapshot().await.screen_sharing_active);
    assert_eq!(doctor.media.replaced_tracks().len(), 1);

    doctor.session.stop_screen_share().await.expect("stop failed");

    let mut saw_second_start = false;
    loop {
        match wait_for_event(&mut patient_events, |event| {
            matches!(
                event,
                SessionEvent::ScreenShareStarted { .. } | SessionEvent::ScreenShareStopped { .. }
            )
        })
        .await
        {
            SessionEvent::ScreenShareStopped { .. } => break,
            SessionEvent::ScreenShareStarted { .. } => saw_second_start = true,
            _ => unreachable!(),
        }
    }
    assert!(!saw_second_start, "duplicate share announcement");
    assert!(!patient.session.snapshot().await.screen_sharing_active);
    assert!(!doctor.session.snapshot().await.screen_sharing_active);
    // Camera restored after the capture track
    assert_eq!(doctor.media.replaced_tracks().len(), 2);

    doctor.session.end_session().await;
    patient.session.end_session().await;
}

#[tokio::test]
async fn test_recording_toggle_crosses_to_the_other_side() {
    let bench = Bench::new();
    let room = RoomId::from("control-204");
    let (doctor, patient) = bench.call_pair(&room).await;

    // Recording needs an active session
    let err = doctor.session.start_recording().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidState { .. }));

    go_active(&doctor, &patient).await;
    open_control(&doctor, &patient).await;

    let mut patient_events = patient.session.subscribe();

    doctor.session.start_recording().await.expect("start failed");
    wait_for_event(&mut patient_events, |event| {
        matches!(event, SessionEvent::RecordingStarted { .. })
    })
    .await;
    assert!(doctor.session.snapshot().await.recording_enabled);
    assert!(patient.session.snapshot().await.recording_enabled);

    doctor.session.stop_recording().await.expect("stop failed");
    wait_for_event(&mut patient_events, |event| {
        matches!(event, SessionEvent::RecordingStopped { .. })
    })
    .await;
    assert!(!doctor.session.snapshot().await.recording_enabled);
    assert!(!patient.session.snapshot().await.recording_enabled);

    doctor.session.end_session().await;
    patient.session.end_session().await;
}

#[tokio::test]
async fn test_chat_disabled_rejects_outbound_and_drops_inbound() {
    let bench = Bench::new();
    let room = RoomId::from("control-205");

    let (doctor_peer, patient_peer) = FakePeerConnection::pair("doctor", "patient");
    let doctor = bench
        .endpoint(
            &room,
            doctor_peer,
            doctor_info(),
            SessionConfig::default().with_chat_enabled(false),
        )
        .await;
    let patient = bench
        .endpoint(&room, patient_peer, patient_info(), SessionConfig::default())
        .await;
    go_active(&doctor, &patient).await;
    open_control(&doctor, &patient).await;

    let err = doctor.session.send_chat("hello?").await.unwrap_err();
    assert!(matches!(err, SessionError::ChatDisabled));

    // Inbound chat is dropped quietly on the disabled side. The share
    // announcement that follows it on the ordered channel is the sync
    // point.
    let mut doctor_events = doctor.session.subscribe();
    patient.session.send_chat("good morning").await.expect("send failed");
    patient
        .session
        .start_screen_share()
        .await
        .expect("share failed");

    let mut saw_chat = false;
    loop {
        match doctor_events.next().await {
            Some(SessionEvent::ChatMessage { .. }) => saw_chat = true,
            Some(SessionEvent::ScreenShareStarted { .. }) => break,
            Some(_) => {}
            None => panic!("event stream ended early"),
        }
    }
    assert!(!saw_chat, "chat should be dropped when disabled");

    doctor.session.end_session().await;
    patient.session.end_session().await;
}

#[tokio::test]
async fn test_stop_screen_share_failure_keeps_share_state_for_retry() {
    let bench = Bench::new();
    let room = RoomId::from("control-206");
    let (doctor, patient) = bench.call_pair(&room).await;
    go_active(&doctor, &patient).await;
    open_control(&doctor, &patient).await;

    doctor.session.start_screen_share().await.expect("share failed");
    assert_eq!(doctor.media.replaced_tracks().len(), 1);

    // The camera cannot come back yet; the failed stop must leave the
    // session still sharing rather than stranding the capture track
    doctor.media.refuse_replacement("camera busy");
    let err = doctor.session.stop_screen_share().await.unwrap_err();
    assert!(matches!(err, SessionError::Media(_)));
    assert!(doctor.session.snapshot().await.screen_sharing_active);
    assert_eq!(doctor.media.replaced_tracks().len(), 1);

    // A retry finishes the switch instead of no-opping
    doctor.session.stop_screen_share().await.expect("retry failed");
    assert!(!doctor.session.snapshot().await.screen_sharing_active);
    assert_eq!(doctor.media.replaced_tracks().len(), 2);

    doctor.session.end_session().await;
    patient.session.end_session().await;
}
