//! Error types for signaling operations.

use std::time::Duration;

use thiserror::Error;

/// Result type for signaling operations
pub type Result<T> = std::result::Result<T, SignalingError>;

/// Errors surfaced by the signaling layer.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// No answer arrived within the configured window after an offer
    #[error("Negotiation timed out after {0:?}")]
    NegotiationTimeout(Duration),

    /// The message bus could not deliver an envelope. Not retried; the
    /// session this relay belongs to moves to failed.
    #[error("Signaling delivery failed: {0}")]
    DeliveryFailure(String),

    /// Operation attempted on a relay that was already closed
    #[error("Signaling relay is closed")]
    RelayClosed,

    /// Operation does not fit the current negotiation state
    #[error("Invalid negotiation state: {0}")]
    InvalidState(String),

    /// The local peer link rejected an operation
    #[error("Peer connection error: {0}")]
    Peer(String),

    /// Envelope or frame encoding/decoding failed
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl SignalingError {
    /// Create a delivery failure error
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::DeliveryFailure(msg.into())
    }

    /// Create a peer connection error
    pub fn peer(msg: impl Into<String>) -> Self {
        Self::Peer(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}
