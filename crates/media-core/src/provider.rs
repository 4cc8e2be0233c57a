//! External media capability contract.
//!
//! The engine owns no camera, microphone, or screen-capture logic. A host
//! application supplies an implementation of [`MediaCapabilityProvider`]
//! (a real device layer in production, [`crate::testing::FakeMediaProvider`]
//! in tests) and the engine drives it through this trait alone.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{MediaConstraints, MediaTrack, RawStats, TrackBundle, TrackId};

/// Events a provider pushes up to the session that owns it
#[derive(Debug, Clone)]
pub enum MediaProviderEvent {
    /// The remote peer's track became available for rendering
    RemoteTrackReceived { track: MediaTrack },
    /// A previously received remote track went away
    RemoteTrackEnded { track_id: TrackId },
}

/// Contract the engine consumes for all local/remote media concerns.
///
/// One provider instance serves one session; its event stream has a
/// single consumer, handed over via [`take_events`](Self::take_events).
#[async_trait]
pub trait MediaCapabilityProvider: Send + Sync {
    /// Acquire local tracks matching the constraints.
    ///
    /// Failure here aborts session creation; no session object exists
    /// afterwards.
    async fn acquire_local_media(&self, constraints: &MediaConstraints) -> Result<TrackBundle>;

    /// Swap the outgoing video track without renegotiating (camera
    /// switch, screen-share start/stop).
    async fn replace_video_track(&self, new_track: MediaTrack) -> Result<()>;

    /// Capture the local screen as a video track for sharing
    async fn capture_screen_track(&self) -> Result<MediaTrack>;

    /// Pull current connection statistics.
    ///
    /// An `Err` here means "no sample this cycle" and is never fatal.
    async fn get_statistics(&self) -> Result<RawStats>;

    /// Release previously acquired tracks. Called once during teardown;
    /// implementations should tolerate unknown or already-released
    /// bundles.
    async fn release_media(&self, bundle: &TrackBundle) -> Result<()>;

    /// Hand over the provider's event stream. Returns `None` on every
    /// call after the first.
    async fn take_events(&self) -> Option<mpsc::Receiver<MediaProviderEvent>>;
}
