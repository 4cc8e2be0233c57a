//! External signaling transport contract.
//!
//! Any reliable pub/sub channel keyed by room works: the production
//! platform uses its realtime broadcast service, tests use
//! [`crate::testing::InMemorySignalingHub`]. Two properties are required
//! of every implementation:
//!
//! - no ordering guarantee is assumed; envelope ordering is enforced by
//!   the relay, not the transport;
//! - a publisher is never delivered its own envelopes (no echo).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{RoomId, SignalEnvelope};

/// Publish half of a joined room channel.
///
/// Held behind an `Arc` so the relay and its reader task can share it;
/// `leave` is idempotent.
#[async_trait]
pub trait SignalingPublisher: Send + Sync {
    /// Publish an envelope to every other member of the room
    async fn publish(&self, envelope: SignalEnvelope) -> Result<()>;

    /// Leave the room. After this the paired receive stream ends.
    async fn leave(&self);
}

/// Entry point to the signaling bus: join a room, obtaining the publish
/// handle and the inbound envelope stream for that membership.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn join(
        &self,
        room: &RoomId,
    ) -> Result<(Arc<dyn SignalingPublisher>, mpsc::Receiver<SignalEnvelope>)>;
}
