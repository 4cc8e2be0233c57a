//! Typed observer interface over the event stream.
//!
//! `SessionObserver` is the ergonomic face of [`crate::events`]: attach
//! one to a session and its methods are invoked in event order, replayed
//! history first. Every method has a no-op default so implementors
//! override only what they care about; `on_event` fires for every event
//! regardless, before the specific method.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use televisit_media_core::{MediaTrack, QualitySample, TrackId};

use crate::events::SessionEvent;
use crate::types::{EndReason, Participant, ParticipantId, SessionStatus};

/// Receives one session's events as typed callbacks
#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// Called for every event, before the specific method
    async fn on_event(&self, _event: &SessionEvent) {}

    async fn on_state_changed(
        &self,
        _previous: SessionStatus,
        _current: SessionStatus,
        _reason: Option<EndReason>,
    ) {
    }

    async fn on_participant_joined(&self, _participant: &Participant) {}

    async fn on_participant_updated(&self, _participant: &Participant) {}

    async fn on_remote_track_added(&self, _track: &MediaTrack) {}

    async fn on_remote_track_removed(&self, _track_id: &TrackId) {}

    async fn on_chat_message(
        &self,
        _sender_id: &ParticipantId,
        _sent_at: DateTime<Utc>,
        _text: &str,
    ) {
    }

    async fn on_screen_share_started(&self, _participant_id: &ParticipantId) {}

    async fn on_screen_share_stopped(&self, _participant_id: &ParticipantId) {}

    async fn on_recording_started(&self) {}

    async fn on_recording_stopped(&self) {}

    async fn on_quality_update(&self, _sample: &QualitySample) {}

    async fn on_error(&self, _message: &str) {}
}

/// Route one event to the matching observer methods
pub async fn dispatch_event(observer: &dyn SessionObserver, event: &SessionEvent) {
    observer.on_event(event).await;
    match event {
        SessionEvent::StateChanged {
            previous,
            current,
            reason,
            ..
        } => {
            observer.on_state_changed(*previous, *current, *reason).await;
        }
        SessionEvent::ParticipantJoined { participant, .. } => {
            observer.on_participant_joined(participant).await;
        }
        SessionEvent::ParticipantUpdated { participant, .. } => {
            observer.on_participant_updated(participant).await;
        }
        SessionEvent::RemoteTrackAdded { track, .. } => {
            observer.on_remote_track_added(track).await;
        }
        SessionEvent::RemoteTrackRemoved { track_id, .. } => {
            observer.on_remote_track_removed(track_id).await;
        }
        SessionEvent::ChatMessage {
            sender_id,
            sent_at,
            text,
            ..
        } => {
            observer.on_chat_message(sender_id, *sent_at, text).await;
        }
        SessionEvent::ScreenShareStarted { participant_id, .. } => {
            observer.on_screen_share_started(participant_id).await;
        }
        SessionEvent::ScreenShareStopped { participant_id, .. } => {
            observer.on_screen_share_stopped(participant_id).await;
        }
        SessionEvent::RecordingStarted { .. } => {
            observer.on_recording_started().await;
        }
        SessionEvent::RecordingStopped { .. } => {
            observer.on_recording_stopped().await;
        }
        SessionEvent::QualityUpdate { sample, .. } => {
            observer.on_quality_update(sample).await;
        }
        SessionEvent::Error { message, .. } => {
            observer.on_error(message).await;
        }
    }
}
