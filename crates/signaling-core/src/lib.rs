//! Signaling layer for the TeleVisit consultation engine.
//!
//! Carries the out-of-band SDP offer/answer and trickle-ICE exchange that
//! establishes a peer link. The crate defines the wire types, the
//! contracts to the external message bus and the local peer link, and the
//! [`SignalingRelay`] that enforces ordering between descriptions and
//! candidates regardless of how the transport delivers them.

// Error handling
pub mod error;

// Wire types
pub mod types;

// External message bus contract
pub mod transport;

// Local peer-link contract
pub mod peer;

// The relay
pub mod relay;

// In-memory test doubles
pub mod testing;

// Public exports
pub use error::{Result, SignalingError};
pub use peer::{
    ControlChannelState, LinkState, PeerConnection, PeerConnectionEvent, PeerConnectionFactory,
};
pub use relay::{NegotiationState, RelayConfig, RelayEvent, SignalingRelay};
pub use transport::{SignalingPublisher, SignalingTransport};
pub use types::{
    IceCandidate, RoomId, SdpKind, SessionDescription, SignalEnvelope, SignalPayload,
};

/// Re-export of common types and traits
pub mod prelude {
    pub use super::{
        ControlChannelState, IceCandidate, LinkState, NegotiationState, PeerConnection,
        PeerConnectionEvent, PeerConnectionFactory, RelayConfig, RelayEvent, RoomId, SdpKind,
        SessionDescription, SignalEnvelope, SignalPayload, SignalingError, SignalingPublisher,
        SignalingRelay, SignalingTransport,
    };
}
