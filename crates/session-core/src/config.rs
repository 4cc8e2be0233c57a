//! Session configuration.

use std::time::Duration;

use televisit_media_core::MediaConstraints;

/// Tuning knobs for one session.
///
/// The defaults match clinical deployment: a 30 second answer window,
/// quality sampled every 5 seconds, and chat enabled.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long to wait for the remote answer after publishing an offer
    pub negotiation_timeout: Duration,
    /// Interval between connection quality samples while active
    pub quality_interval: Duration,
    /// How many events the replay buffer keeps for late subscribers
    pub event_buffer_capacity: usize,
    /// Constraints passed to the media provider on acquisition
    pub media_constraints: MediaConstraints,
    /// Whether chat messages may be sent from this side
    pub chat_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout: Duration::from_secs(30),
            quality_interval: Duration::from_secs(5),
            event_buffer_capacity: 256,
            media_constraints: MediaConstraints::default(),
            chat_enabled: true,
        }
    }
}

impl SessionConfig {
    pub fn with_negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = timeout;
        self
    }

    pub fn with_quality_interval(mut self, interval: Duration) -> Self {
        self.quality_interval = interval;
        self
    }

    pub fn with_event_buffer_capacity(mut self, capacity: usize) -> Self {
        self.event_buffer_capacity = capacity;
        self
    }

    pub fn with_media_constraints(mut self, constraints: MediaConstraints) -> Self {
        self.media_constraints = constraints;
        self
    }

    pub fn with_chat_enabled(mut self, enabled: bool) -> Self {
        self.chat_enabled = enabled;
        self
    }
}
