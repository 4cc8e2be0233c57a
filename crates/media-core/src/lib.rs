//! Media capability layer for the TeleVisit consultation engine.
//!
//! This crate defines the contract between the session engine and
//! whatever actually owns cameras, microphones, screens, and transport
//! statistics. The engine consumes [`MediaCapabilityProvider`] and never
//! touches devices itself; call-quality classification lives here too,
//! next to the statistics types it reads.

// Error handling
pub mod error;

// Track, bundle, constraint, and statistics types
pub mod types;

// The external provider contract
pub mod provider;

// Quality classification
pub mod quality;

// Deterministic test double
pub mod testing;

// Public exports
pub use error::{MediaError, Result};
pub use provider::{MediaCapabilityProvider, MediaProviderEvent};
pub use quality::{QualityLevel, QualitySample};
pub use types::{
    AudioStats, MediaConstraints, MediaTrack, NetworkStats, RawStats, TrackBundle, TrackId,
    TrackKind, TrackSource, VideoStats,
};

/// Re-export of common types and traits
pub mod prelude {
    pub use super::{
        MediaCapabilityProvider, MediaConstraints, MediaError, MediaProviderEvent, MediaTrack,
        QualityLevel, QualitySample, RawStats, TrackBundle, TrackKind, TrackSource,
    };
}
