//! Ownership of the session record.
//!
//! The manager is the only writer of the [`Session`] record. Lifecycle
//! changes go through [`SessionManager::apply`], which runs the pure
//! transition function, mutates the record, persists it, and publishes
//! the state-change event, all while holding the record's write lock so
//! persisted history and event order always match transition order.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::events::{SessionEvent, SessionEventHub};
use crate::state_machine::{transition, LifecycleEvent};
use crate::store::SessionStore;
use crate::types::{
    EndReason, Participant, ParticipantId, ParticipantInfo, Session, SessionId, SessionStatus,
};

/// The result of applying one lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub previous: SessionStatus,
    pub current: SessionStatus,
    pub reason: Option<EndReason>,
}

/// Holds and mutates one session's record.
pub struct SessionManager {
    id: SessionId,
    record: RwLock<Session>,
    store: Arc<dyn SessionStore>,
    hub: Arc<SessionEventHub>,
}

impl SessionManager {
    pub fn new(session: Session, store: Arc<dyn SessionStore>, hub: Arc<SessionEventHub>) -> Self {
        Self {
            id: session.id.clone(),
            record: RwLock::new(session),
            store,
            hub,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.id
    }

    /// Persist the freshly created record and announce the host
    pub async fn persist_initial(&self) {
        let record = self.record.read().await;
        if let Err(e) = self.store.save(&record).await {
            warn!("failed to persist new session {}: {}", self.id, e);
        }
        if let Some(host) = record.host() {
            self.hub.publish(SessionEvent::ParticipantJoined {
                session_id: self.id.clone(),
                participant: host.clone(),
            });
        }
    }

    /// Apply one lifecycle event. Returns `None` when the event does not
    /// move the session (including any event on a terminal session).
    pub async fn apply(&self, event: &LifecycleEvent) -> Option<TransitionOutcome> {
        let mut record = self.record.write().await;
        let previous = record.status;
        let t = transition(previous, event)?;

        record.status = t.next;
        match t.next {
            SessionStatus::Active => {
                record.started_at = Some(Utc::now());
                for participant in &mut record.participants {
                    participant.is_connected = true;
                }
            }
            SessionStatus::Ended | SessionStatus::Failed => {
                let now = Utc::now();
                record.ended_at = Some(now);
                record.end_reason = t.reason;
                for participant in &mut record.participants {
                    participant.is_connected = false;
                    if participant.left_at.is_none() {
                        participant.left_at = Some(now);
                    }
                }
            }
            SessionStatus::Waiting => {}
        }

        info!(
            "session {} transitioned {} -> {}{}",
            self.id,
            previous,
            t.next,
            t.reason
                .map(|r| format!(" ({r})"))
                .unwrap_or_default()
        );

        let snapshot = record.clone();
        self.persist(&snapshot).await;
        self.hub.publish(SessionEvent::StateChanged {
            session_id: self.id.clone(),
            previous,
            current: t.next,
            reason: t.reason,
        });

        Some(TransitionOutcome {
            previous,
            current: t.next,
            reason: t.reason,
        })
    }

    /// Add a participant, or refresh an existing one's identity in place
    pub async fn register_participant(&self, info: ParticipantInfo) -> Participant {
        let mut record = self.record.write().await;
        let connected = record.status == SessionStatus::Active;
        let (participant, rejoined) = match record
            .participants
            .iter_mut()
            .find(|p| p.id == info.id)
        {
            Some(existing) => {
                existing.role = info.role;
                existing.display_name = info.display_name;
                (existing.clone(), true)
            }
            None => {
                let mut participant = Participant::from_info(info, false);
                participant.is_connected = connected;
                record.participants.push(participant.clone());
                (participant, false)
            }
        };

        let snapshot = record.clone();
        self.persist(&snapshot).await;
        self.hub.publish(if rejoined {
            SessionEvent::ParticipantUpdated {
                session_id: self.id.clone(),
                participant: participant.clone(),
            }
        } else {
            SessionEvent::ParticipantJoined {
                session_id: self.id.clone(),
                participant: participant.clone(),
            }
        });
        participant
    }

    /// Update a participant's audio/video flags. Returns the updated
    /// participant, or `None` for an unknown id.
    pub async fn set_participant_media(
        &self,
        id: &ParticipantId,
        audio: Option<bool>,
        video: Option<bool>,
    ) -> Option<Participant> {
        let mut record = self.record.write().await;
        let participant = record.participants.iter_mut().find(|p| &p.id == id)?;
        if let Some(audio) = audio {
            participant.audio_enabled = audio;
        }
        if let Some(video) = video {
            participant.video_enabled = video;
        }
        let updated = participant.clone();

        let snapshot = record.clone();
        self.persist(&snapshot).await;
        self.hub.publish(SessionEvent::ParticipantUpdated {
            session_id: self.id.clone(),
            participant: updated.clone(),
        });
        Some(updated)
    }

    /// Flip the session's screen-sharing flag. Returns false when the
    /// flag already had the requested value (no event, no write).
    pub async fn set_screen_sharing(&self, by: &ParticipantId, active: bool) -> bool {
        let mut record = self.record.write().await;
        if record.screen_sharing_active == active {
            return false;
        }
        record.screen_sharing_active = active;
        if let Some(participant) = record.participants.iter_mut().find(|p| &p.id == by) {
            participant.screen_sharing = active;
        }

        let snapshot = record.clone();
        self.persist(&snapshot).await;
        self.hub.publish(if active {
            SessionEvent::ScreenShareStarted {
                session_id: self.id.clone(),
                participant_id: by.clone(),
            }
        } else {
            SessionEvent::ScreenShareStopped {
                session_id: self.id.clone(),
                participant_id: by.clone(),
            }
        });
        true
    }

    /// Flip the session's recording flag. Returns false when unchanged.
    pub async fn set_recording(&self, active: bool) -> bool {
        let mut record = self.record.write().await;
        if record.recording_enabled == active {
            return false;
        }
        record.recording_enabled = active;

        let snapshot = record.clone();
        self.persist(&snapshot).await;
        self.hub.publish(if active {
            SessionEvent::RecordingStarted {
                session_id: self.id.clone(),
            }
        } else {
            SessionEvent::RecordingStopped {
                session_id: self.id.clone(),
            }
        });
        true
    }

    pub async fn snapshot(&self) -> Session {
        self.record.read().await.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        self.record.read().await.status
    }

    async fn persist(&self, snapshot: &Session) {
        // Persistence is telemetry; a failing store never fails the call
        if let Err(e) = self.store.update(snapshot).await {
            warn!("failed to persist session {}: {}", self.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use televisit_signaling_core::{LinkState, RoomId};

    use super::*;
    use crate::store::InMemorySessionStore;
    use crate::types::ParticipantRole;

    fn manager_with_store() -> (SessionManager, Arc<InMemorySessionStore>, Arc<SessionEventHub>) {
        let store = Arc::new(InMemorySessionStore::new());
        let hub = Arc::new(SessionEventHub::new(64));
        let session = Session::new(
            SessionId::generate(),
            RoomId::from("room-mgr"),
            ParticipantInfo::new("doctor-1", ParticipantRole::Doctor, "Dr. Besso"),
            true,
        );
        let manager = SessionManager::new(session, store.clone(), hub.clone());
        (manager, store, hub)
    }

    #[tokio::test]
    async fn test_apply_persists_each_transition_in_order() {
        let (manager, store, _hub) = manager_with_store();
        manager.persist_initial().await;

        manager
            .apply(&LifecycleEvent::Link(LinkState::Connected))
            .await
            .unwrap();
        assert!(manager.snapshot().await.participants[0].is_connected);
        manager.apply(&LifecycleEvent::HangUp).await.unwrap();

        assert_eq!(
            store.status_history(manager.session_id()),
            vec![
                SessionStatus::Waiting,
                SessionStatus::Active,
                SessionStatus::Ended
            ]
        );
        let stored = store.get(manager.session_id()).unwrap();
        assert_eq!(stored.end_reason, Some(EndReason::LocalHangup));
        assert!(stored.started_at.is_some());
        assert!(stored.duration().is_some());
        assert!(stored.participants[0].left_at.is_some());
        assert!(!stored.participants[0].is_connected);
    }

    #[tokio::test]
    async fn test_apply_on_terminal_returns_none() {
        let (manager, store, _hub) = manager_with_store();
        manager.persist_initial().await;
        manager.apply(&LifecycleEvent::HangUp).await.unwrap();
        let writes_before = store.status_history(manager.session_id()).len();

        assert!(manager
            .apply(&LifecycleEvent::Link(LinkState::Connected))
            .await
            .is_none());
        assert!(manager.apply(&LifecycleEvent::HangUp).await.is_none());
        assert_eq!(
            store.status_history(manager.session_id()).len(),
            writes_before
        );
    }

    #[tokio::test]
    async fn test_store_failure_does_not_block_transition() {
        let (manager, store, hub) = manager_with_store();
        manager.persist_initial().await;
        store.fail_writes("backend down");

        let mut stream = hub.subscribe();
        let outcome = manager
            .apply(&LifecycleEvent::Link(LinkState::Connected))
            .await
            .unwrap();
        assert_eq!(outcome.current, SessionStatus::Active);
        assert_eq!(manager.status().await, SessionStatus::Active);

        // The event still went out even though persistence failed
        let mut saw_state_change = false;
        while let Some(event) = stream.try_next() {
            if matches!(event, SessionEvent::StateChanged { .. }) {
                saw_state_change = true;
            }
        }
        assert!(saw_state_change);
    }

    #[tokio::test]
    async fn test_register_existing_participant_updates_in_place() {
        let (manager, _store, hub) = manager_with_store();
        manager.persist_initial().await;

        manager
            .register_participant(ParticipantInfo::new(
                "patient-9",
                ParticipantRole::Patient,
                "Ada",
            ))
            .await;
        let updated = manager
            .register_participant(ParticipantInfo::new(
                "patient-9",
                ParticipantRole::Patient,
                "Ada Osei",
            ))
            .await;
        assert_eq!(updated.display_name, "Ada Osei");

        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.participants.len(), 2);

        let mut stream = hub.subscribe();
        let mut joins = 0;
        let mut updates = 0;
        while let Some(event) = stream.try_next() {
            match event {
                SessionEvent::ParticipantJoined { .. } => joins += 1,
                SessionEvent::ParticipantUpdated { .. } => updates += 1,
                _ => {}
            }
        }
        assert_eq!(joins, 2); // host + patient
        assert_eq!(updates, 1);
    }

    #[tokio::test]
    async fn test_screen_share_flag_is_idempotent() {
        let (manager, _store, hub) = manager_with_store();
        let by = ParticipantId::from("doctor-1");

        assert!(manager.set_screen_sharing(&by, true).await);
        assert!(!manager.set_screen_sharing(&by, true).await);
        assert!(manager.set_screen_sharing(&by, false).await);

        let snapshot = manager.snapshot().await;
        assert!(!snapshot.screen_sharing_active);
        assert!(!snapshot.participants[0].screen_sharing);

        let mut stream = hub.subscribe();
        let mut share_events = 0;
        while let Some(event) = stream.try_next() {
            if matches!(
                event,
                SessionEvent::ScreenShareStarted { .. } | SessionEvent::ScreenShareStopped { .. }
            ) {
                share_events += 1;
            }
        }
        assert_eq!(share_events, 2);
    }

    #[tokio::test]
    async fn test_recording_flag_round_trip() {
        let (manager, store, _hub) = manager_with_store();
        manager.persist_initial().await;

        assert!(manager.set_recording(true).await);
        assert!(store.get(manager.session_id()).unwrap().recording_enabled);
        assert!(manager.set_recording(false).await);
        assert!(!store.get(manager.session_id()).unwrap().recording_enabled);
    }
}
