//! Local peer-link contract.
//!
//! The engine negotiates and supervises a peer-to-peer media link but
//! does not implement one. [`PeerConnection`] is the surface it drives:
//! minting and applying session descriptions, feeding remote ICE
//! candidates, carrying control frames, and reporting link events. A
//! [`PeerConnectionFactory`] supplies one connection per session.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{IceCandidate, SessionDescription};

/// Connection state of the peer link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// Negotiation or connectivity checks in progress
    Connecting,
    /// Media is flowing
    Connected,
    /// The remote side went away after being connected
    Disconnected,
    /// The link failed and will not recover
    Failed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Connected => write!(f, "connected"),
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Failed => write!(f, "failed"),
        }
    }
}

/// State of the control side-channel riding the peer link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlChannelState {
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ControlChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlChannelState::Connecting => write!(f, "connecting"),
            ControlChannelState::Open => write!(f, "open"),
            ControlChannelState::Closed => write!(f, "closed"),
        }
    }
}

/// Events a peer connection pushes up to its owning session
#[derive(Debug, Clone)]
pub enum PeerConnectionEvent {
    /// A local ICE candidate was gathered and should be relayed
    LocalCandidate(IceCandidate),
    /// The link's connection state changed
    LinkStateChanged(LinkState),
    /// The control side-channel's state changed
    ControlChannelStateChanged(ControlChannelState),
    /// An inbound control frame arrived on the side-channel
    ControlFrame(Bytes),
}

/// The local peer-to-peer link, as seen by the engine.
///
/// Ordering contract: `create_answer` requires a prior successful
/// `set_remote_description`; `add_remote_candidate` is only called after
/// the remote description is applied (the relay defers earlier arrivals).
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Send one frame on the reliable, ordered control side-channel
    async fn send_control(&self, frame: Bytes) -> Result<()>;

    /// Tear the link down. Idempotent; the event stream ends after this.
    async fn close(&self);
}

/// Creates one peer connection per session, returning the connection and
/// the single-consumer event stream that goes with it.
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create_peer(
        &self,
    ) -> Result<(Arc<dyn PeerConnection>, mpsc::Receiver<PeerConnectionEvent>)>;
}
