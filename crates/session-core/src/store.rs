//! Session persistence.
//!
//! The engine calls the store on creation and after every state
//! transition. Persistence is best-effort telemetry: a failing store is
//! logged and never blocks or fails the call itself.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;

use crate::types::{Session, SessionId, SessionStatus};

/// Errors a storage backend may report
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("session {0} not found")]
    NotFound(SessionId),
}

/// Persistence contract for session records
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a newly created session
    async fn save(&self, session: &Session) -> Result<(), StoreError>;

    /// Persist the record after a state transition or participant change
    async fn update(&self, session: &Session) -> Result<(), StoreError>;

    /// Fetch a stored record
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;
}

/// In-memory store used by tests and the demo.
///
/// Records every write in order so tests can assert the persisted status
/// history of a session.
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, Session>,
    write_log: Mutex<Vec<(SessionId, SessionStatus)>>,
    fail_writes: Mutex<Option<String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            write_log: Mutex::new(Vec::new()),
            fail_writes: Mutex::new(None),
        }
    }

    /// Make every subsequent write fail with this message
    pub fn fail_writes(&self, reason: impl Into<String>) {
        *self.fail_writes.lock() = Some(reason.into());
    }

    pub fn clear_failure(&self) {
        *self.fail_writes.lock() = None;
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Statuses written for this session, in write order
    pub fn status_history(&self, id: &SessionId) -> Vec<SessionStatus> {
        self.write_log
            .lock()
            .iter()
            .filter(|(sid, _)| sid == id)
            .map(|(_, status)| *status)
            .collect()
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        if let Some(reason) = self.fail_writes.lock().clone() {
            return Err(StoreError::Unavailable(reason));
        }
        Ok(())
    }

    fn record(&self, session: &Session) {
        self.write_log
            .lock()
            .push((session.id.clone(), session.status));
        self.sessions.insert(session.id.clone(), session.clone());
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        self.check_failure()?;
        self.record(session);
        Ok(())
    }

    async fn update(&self, session: &Session) -> Result<(), StoreError> {
        self.check_failure()?;
        if !self.sessions.contains_key(&session.id) {
            return Err(StoreError::NotFound(session.id.clone()));
        }
        self.record(session);
        Ok(())
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        self.check_failure()?;
        Ok(self.get(id))
    }
}

#[cfg(test)]
mod tests {
    use televisit_signaling_core::RoomId;

    use super::*;
    use crate::types::{ParticipantInfo, ParticipantRole};

    fn sample_session() -> Session {
        Session::new(
            SessionId::generate(),
            RoomId::from("room-store"),
            ParticipantInfo::new("doctor-1", ParticipantRole::Doctor, "Dr. Okafor"),
            true,
        )
    }

    #[tokio::test]
    async fn test_save_then_update_logs_history() {
        let store = InMemorySessionStore::new();
        let mut session = sample_session();
        store.save(&session).await.unwrap();

        session.status = SessionStatus::Active;
        store.update(&session).await.unwrap();
        session.status = SessionStatus::Ended;
        store.update(&session).await.unwrap();

        assert_eq!(
            store.status_history(&session.id),
            vec![
                SessionStatus::Waiting,
                SessionStatus::Active,
                SessionStatus::Ended
            ]
        );
        assert_eq!(store.get(&session.id).unwrap().status, SessionStatus::Ended);
    }

    #[tokio::test]
    async fn test_update_unknown_session() {
        let store = InMemorySessionStore::new();
        let session = sample_session();
        let err = store.update(&session).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = InMemorySessionStore::new();
        store.fail_writes("disk full");
        let err = store.save(&sample_session()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.clear_failure();
        assert!(store.save(&sample_session()).await.is_ok());
    }
}
