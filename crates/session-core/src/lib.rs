//! Session orchestration for real-time video consultations.
//!
//! This crate is the coordination layer of the televisit engine: it owns
//! the session lifecycle and wires together the media provider, the
//! signaling relay, the in-call control channel, and the quality
//! monitor. It deliberately contains no media capture, no codec work,
//! and no network transport; those arrive through the contracts in
//! `televisit-media-core` and `televisit-signaling-core`.
//!
//! # Shape
//!
//! - [`SessionOrchestrator`] is created per call with injected
//!   dependencies ([`SessionDeps`]); there are no process-wide
//!   singletons.
//! - All lifecycle changes run through one pure transition function
//!   ([`state_machine::transition`]); terminal states are absorbing,
//!   which makes teardown idempotent.
//! - Consumers register for events up front and receive the buffered
//!   history on subscription, so nothing is missed by attaching "late".
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use televisit_session_core::prelude::*;
//! use televisit_media_core::testing::FakeMediaProvider;
//! use televisit_signaling_core::testing::{FakePeerFactory, InMemorySignalingHub};
//! use televisit_signaling_core::RoomId;
//!
//! # async fn demo() -> Result<()> {
//! let deps = SessionDeps {
//!     media: Arc::new(FakeMediaProvider::new()),
//!     peers: Arc::new(FakePeerFactory::new()),
//!     signaling: Arc::new(InMemorySignalingHub::new()),
//!     store: Arc::new(InMemorySessionStore::new()),
//!     registry: Arc::new(SessionRegistry::new()),
//! };
//! let session = SessionOrchestrator::create_session(
//!     deps,
//!     SessionConfig::default(),
//!     RoomId::from("consultation-42"),
//!     ParticipantInfo::new("doctor-1", ParticipantRole::Doctor, "Dr. Ibarra"),
//! )
//! .await?;
//! session.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod config; // Session tuning knobs
pub mod control; // In-call control channel: chat, share/record toggles
pub mod errors; // Error types
pub mod events; // Event hub with buffered replay
pub mod manager; // Session record ownership and transitions
pub mod observer; // Typed observer over the event stream
pub mod orchestrator; // Per-call orchestration
pub mod quality; // Periodic quality sampling
pub mod registry; // One-session-per-room claims
pub mod state_machine; // The lifecycle state machine
pub mod store; // Persistence contract and in-memory store
pub mod types; // Identifiers, participants, the session record

pub use config::SessionConfig;
pub use control::{ControlBody, ControlChannel, ControlMessage};
pub use errors::{Result, SessionError};
pub use events::{SessionEvent, SessionEventHub, SessionEventStream};
pub use manager::{SessionManager, TransitionOutcome};
pub use observer::SessionObserver;
pub use orchestrator::{SessionDeps, SessionOrchestrator};
pub use quality::QualityMonitor;
pub use registry::SessionRegistry;
pub use state_machine::{transition, LifecycleEvent, Transition};
pub use store::{InMemorySessionStore, SessionStore, StoreError};
pub use types::{
    EndReason, Participant, ParticipantId, ParticipantInfo, ParticipantRole, Session, SessionId,
    SessionStatus,
};

/// Common imports for engine consumers
pub mod prelude {
    pub use crate::config::SessionConfig;
    pub use crate::errors::{Result, SessionError};
    pub use crate::events::{SessionEvent, SessionEventStream};
    pub use crate::observer::SessionObserver;
    pub use crate::orchestrator::{SessionDeps, SessionOrchestrator};
    pub use crate::registry::SessionRegistry;
    pub use crate::store::{InMemorySessionStore, SessionStore};
    pub use crate::types::{
        EndReason, Participant, ParticipantId, ParticipantInfo, ParticipantRole, Session,
        SessionId, SessionStatus,
    };
}
