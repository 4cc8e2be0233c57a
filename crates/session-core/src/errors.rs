//! Error types for session orchestration.

use thiserror::Error;

use televisit_media_core::MediaError;
use televisit_signaling_core::{RoomId, SignalingError};

use crate::types::SessionStatus;

/// Errors surfaced by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// A second concurrent session was requested for the same room
    #[error("an active session already exists for room {0}")]
    DuplicateSession(RoomId),

    /// The media provider failed; during creation this aborts the session
    #[error("media error: {0}")]
    Media(#[from] MediaError),

    /// Signaling or peer transport failure
    #[error("signaling error: {0}")]
    Signaling(#[from] SignalingError),

    /// The control channel closed while the session still needed it
    #[error("control channel closed prematurely")]
    ChannelClosed,

    /// Chat was disabled when this session was configured
    #[error("chat is disabled for this session")]
    ChatDisabled,

    #[error("operation not valid while {status}: {operation}")]
    InvalidState {
        status: SessionStatus,
        operation: String,
    },

    #[error("control message codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    pub fn invalid_state(status: SessionStatus, operation: impl Into<String>) -> Self {
        Self::InvalidState {
            status,
            operation: operation.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, SessionError>;
