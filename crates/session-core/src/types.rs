//! Core session types: identifiers, participants, lifecycle states, and
//! the persisted session record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use televisit_signaling_core::RoomId;

/// Unique identifier of one consultation session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Mint a fresh identifier
    pub fn generate() -> Self {
        Self(format!("session-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Caller-assigned identifier of a participant (e.g. a user id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Clinical role of a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Patient,
    Doctor,
    Nurse,
    Admin,
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticipantRole::Patient => write!(f, "patient"),
            ParticipantRole::Doctor => write!(f, "doctor"),
            ParticipantRole::Nurse => write!(f, "nurse"),
            ParticipantRole::Admin => write!(f, "admin"),
        }
    }
}

/// Identity supplied by the caller when creating a session or registering
/// a participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: ParticipantId,
    pub role: ParticipantRole,
    pub display_name: String,
}

impl ParticipantInfo {
    pub fn new(
        id: impl Into<ParticipantId>,
        role: ParticipantRole,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            display_name: display_name.into(),
        }
    }
}

/// One participant as tracked by the session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub role: ParticipantRole,
    pub display_name: String,
    /// Whether this participant created the session
    pub is_host: bool,
    /// Derived from transport connection-state events only, never set by
    /// application logic
    pub is_connected: bool,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub screen_sharing: bool,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn from_info(info: ParticipantInfo, is_host: bool) -> Self {
        Self {
            id: info.id,
            role: info.role,
            display_name: info.display_name,
            is_host,
            is_connected: false,
            audio_enabled: true,
            video_enabled: true,
            screen_sharing: false,
            joined_at: Utc::now(),
            left_at: None,
        }
    }
}

/// Lifecycle state of a session.
///
/// Legal histories are a prefix of `waiting`, one of `active`/`failed`,
/// then one of `ended`/`failed`. The terminal states absorb every further
/// event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created; media acquired; no connected transport yet
    Waiting,
    /// Transport connected; consultation in progress
    Active,
    /// Concluded normally
    Ended,
    /// Concluded abnormally
    Failed,
}

impl SessionStatus {
    /// Terminal states never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Ended | SessionStatus::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Waiting => write!(f, "waiting"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Ended => write!(f, "ended"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Why a session reached its terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    /// The local side hung up
    LocalHangup,
    /// The remote transport disconnected during an active call
    RemoteDisconnect,
    /// No answer arrived within the negotiation window
    NegotiationTimeout,
    /// The transport link failed
    TransportFailure,
    /// The signaling bus rejected a delivery
    SignalingFailure,
    /// Torn down before the call ever became active
    Cancelled,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::LocalHangup => write!(f, "local-hangup"),
            EndReason::RemoteDisconnect => write!(f, "remote-disconnect"),
            EndReason::NegotiationTimeout => write!(f, "negotiation-timeout"),
            EndReason::TransportFailure => write!(f, "transport-failure"),
            EndReason::SignalingFailure => write!(f, "signaling-failure"),
            EndReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The persisted record of one session.
///
/// This is what [`crate::store::SessionStore`] receives on creation and
/// after every state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub room_id: RoomId,
    pub status: SessionStatus,
    pub participants: Vec<Participant>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
    pub chat_enabled: bool,
    pub recording_enabled: bool,
    pub screen_sharing_active: bool,
}

impl Session {
    /// Fresh record in `waiting`, with the creating participant as host
    pub fn new(id: SessionId, room_id: RoomId, host: ParticipantInfo, chat_enabled: bool) -> Self {
        Self {
            id,
            room_id,
            status: SessionStatus::Waiting,
            participants: vec![Participant::from_info(host, true)],
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            end_reason: None,
            chat_enabled,
            recording_enabled: false,
            screen_sharing_active: false,
        }
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == id)
    }

    pub fn host(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_host)
    }

    /// Wall-clock duration of the active phase, once both endpoints are
    /// known
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> ParticipantInfo {
        ParticipantInfo::new("doctor-1", ParticipantRole::Doctor, "Dr. Chen")
    }

    #[test]
    fn test_new_session_starts_waiting() {
        let session = Session::new(
            SessionId::generate(),
            RoomId::from("room-1"),
            host(),
            true,
        );
        assert_eq!(session.status, SessionStatus::Waiting);
        assert!(!session.status.is_terminal());
        assert_eq!(session.participants.len(), 1);
        assert!(session.participants[0].is_host);
        assert!(!session.participants[0].is_connected);
        assert!(session.started_at.is_none());
        assert!(session.duration().is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionStatus::Ended.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::Waiting.is_terminal());
        assert!(!SessionStatus::Active.is_terminal());
    }

    #[test]
    fn test_session_id_format() {
        let id = SessionId::generate();
        assert!(id.as_str().starts_with("session-"));
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn test_status_serde_spelling() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Waiting).unwrap(),
            "\"waiting\""
        );
        assert_eq!(
            serde_json::to_string(&EndReason::RemoteDisconnect).unwrap(),
            "\"remote-disconnect\""
        );
    }

    #[test]
    fn test_duration_requires_both_bounds() {
        let mut session = Session::new(
            SessionId::generate(),
            RoomId::from("room-2"),
            host(),
            true,
        );
        session.started_at = Some(Utc::now());
        assert!(session.duration().is_none());
        session.ended_at = Some(session.started_at.unwrap() + chrono::Duration::seconds(90));
        assert_eq!(session.duration().unwrap().num_seconds(), 90);
    }
}
