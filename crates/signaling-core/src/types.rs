//! Signaling wire types: rooms, session descriptions, ICE candidates, and
//! the envelope that carries them over the message bus.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of the room (consultation) both endpoints agreed on
/// out-of-band. Signaling is addressed by room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Whether a session description is the opening offer or the answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// An SDP blob plus its role in the exchange. The engine treats the SDP
/// text as opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// One discovered network path proposed for connectivity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u32>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        }
    }
}

/// Payload of one signaling envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum SignalPayload {
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),
}

impl SignalPayload {
    /// Wire spelling of the payload type, for logs
    pub fn type_name(&self) -> &'static str {
        match self {
            SignalPayload::Offer(_) => "offer",
            SignalPayload::Answer(_) => "answer",
            SignalPayload::IceCandidate(_) => "ice-candidate",
        }
    }
}

/// The unit the signaling transport carries.
///
/// `session_id` is the publishing endpoint's local session id and is
/// diagnostic; addressing happens through the room the channel was joined
/// on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub session_id: String,
    pub room_id: RoomId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: SignalPayload,
}

impl SignalEnvelope {
    pub fn new(session_id: impl Into<String>, room_id: RoomId, payload: SignalPayload) -> Self {
        Self {
            session_id: session_id.into(),
            room_id,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn offer(session_id: impl Into<String>, room_id: RoomId, desc: SessionDescription) -> Self {
        Self::new(session_id, room_id, SignalPayload::Offer(desc))
    }

    pub fn answer(session_id: impl Into<String>, room_id: RoomId, desc: SessionDescription) -> Self {
        Self::new(session_id, room_id, SignalPayload::Answer(desc))
    }

    pub fn candidate(
        session_id: impl Into<String>,
        room_id: RoomId,
        candidate: IceCandidate,
    ) -> Self {
        Self::new(session_id, room_id, SignalPayload::IceCandidate(candidate))
    }
}
