//! Session event hub with buffered replay.
//!
//! Consumers register for events rather than installing callbacks after
//! the fact: [`SessionEventHub::subscribe`] hands back a stream that
//! first replays everything published so far (up to the buffer
//! capacity), then continues live. Snapshotting the backlog and joining
//! the live channel happen under one lock, so no event is delivered
//! twice or skipped at the handoff.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::warn;

use televisit_media_core::{MediaTrack, QualitySample, TrackId};

use crate::types::{EndReason, Participant, ParticipantId, SessionId, SessionStatus};

/// Everything a session reports to its subscribers
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session moved between lifecycle states
    StateChanged {
        session_id: SessionId,
        previous: SessionStatus,
        current: SessionStatus,
        reason: Option<EndReason>,
    },
    ParticipantJoined {
        session_id: SessionId,
        participant: Participant,
    },
    /// A participant's media flags changed (mute, camera, screen share)
    ParticipantUpdated {
        session_id: SessionId,
        participant: Participant,
    },
    /// The remote peer's track became available for rendering
    RemoteTrackAdded {
        session_id: SessionId,
        track: MediaTrack,
    },
    RemoteTrackRemoved {
        session_id: SessionId,
        track_id: TrackId,
    },
    /// A chat message arrived over the control channel, verbatim
    ChatMessage {
        session_id: SessionId,
        sender_id: ParticipantId,
        sent_at: DateTime<Utc>,
        text: String,
    },
    ScreenShareStarted {
        session_id: SessionId,
        participant_id: ParticipantId,
    },
    ScreenShareStopped {
        session_id: SessionId,
        participant_id: ParticipantId,
    },
    RecordingStarted { session_id: SessionId },
    RecordingStopped { session_id: SessionId },
    /// A connection quality sample, published every sampling interval
    /// while the session is active
    QualityUpdate {
        session_id: SessionId,
        sample: QualitySample,
    },
    /// A non-fatal error the session wants its subscribers to see
    Error {
        session_id: SessionId,
        message: String,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            SessionEvent::StateChanged { session_id, .. }
            | SessionEvent::ParticipantJoined { session_id, .. }
            | SessionEvent::ParticipantUpdated { session_id, .. }
            | SessionEvent::RemoteTrackAdded { session_id, .. }
            | SessionEvent::RemoteTrackRemoved { session_id, .. }
            | SessionEvent::ChatMessage { session_id, .. }
            | SessionEvent::ScreenShareStarted { session_id, .. }
            | SessionEvent::ScreenShareStopped { session_id, .. }
            | SessionEvent::RecordingStarted { session_id }
            | SessionEvent::RecordingStopped { session_id }
            | SessionEvent::QualityUpdate { session_id, .. }
            | SessionEvent::Error { session_id, .. } => session_id,
        }
    }
}

struct HubShared {
    backlog: VecDeque<SessionEvent>,
    live: broadcast::Sender<SessionEvent>,
}

/// Publish/subscribe hub for one session's events.
pub struct SessionEventHub {
    shared: RwLock<HubShared>,
    capacity: usize,
}

impl SessionEventHub {
    /// `capacity` bounds both the replay backlog and each subscriber's
    /// live queue
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (live, _) = broadcast::channel(capacity);
        Self {
            shared: RwLock::new(HubShared {
                backlog: VecDeque::with_capacity(capacity),
                live,
            }),
            capacity,
        }
    }

    /// Publish to live subscribers and append to the replay backlog,
    /// evicting the oldest event once the backlog is full
    pub fn publish(&self, event: SessionEvent) {
        let mut shared = self.shared.write();
        if shared.backlog.len() == self.capacity {
            shared.backlog.pop_front();
        }
        shared.backlog.push_back(event.clone());
        // No live subscribers is fine; the backlog still grows
        let _ = shared.live.send(event);
    }

    /// Register a subscriber. Events published before this call are
    /// replayed first, then the stream continues live.
    pub fn subscribe(&self) -> SessionEventStream {
        let shared = self.shared.write();
        SessionEventStream {
            backlog: shared.backlog.iter().cloned().collect(),
            live: shared.live.subscribe(),
        }
    }

    /// Number of events currently held for replay
    pub fn backlog_len(&self) -> usize {
        self.shared.read().backlog.len()
    }
}

/// A subscriber's view of the event sequence: buffered replay first,
/// live events after.
pub struct SessionEventStream {
    backlog: VecDeque<SessionEvent>,
    live: broadcast::Receiver<SessionEvent>,
}

impl SessionEventStream {
    /// Next event, or `None` once the session is gone and the replay is
    /// exhausted
    pub async fn next(&mut self) -> Option<SessionEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        loop {
            match self.live.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("event subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already available, without waiting
    pub fn try_next(&mut self) -> Option<SessionEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        loop {
            match self.live.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("event subscriber lagged, skipped {} events", skipped);
                }
                Err(_) => return None,
            }
        }
    }
}
