//! Error types for media capability operations.

use thiserror::Error;

/// Result type for media operations
pub type Result<T> = std::result::Result<T, MediaError>;

/// Errors surfaced by a media capability provider.
#[derive(Debug, Error)]
pub enum MediaError {
    /// Local media could not be acquired (permission denied, device busy,
    /// no matching device). Session creation aborts on this.
    #[error("Failed to acquire local media: {0}")]
    AcquisitionFailure(String),

    /// A referenced track does not exist or is no longer live.
    #[error("Track unavailable: {0}")]
    TrackUnavailable(String),

    /// Connection statistics could not be read this cycle. Non-fatal.
    #[error("Statistics unavailable: {0}")]
    StatisticsUnavailable(String),

    /// Any other provider-side failure.
    #[error("Media provider error: {0}")]
    Provider(String),
}

impl MediaError {
    /// Create an acquisition failure error
    pub fn acquisition(msg: impl Into<String>) -> Self {
        Self::AcquisitionFailure(msg.into())
    }

    /// Create a provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MediaError::acquisition("camera in use");
        assert_eq!(err.to_string(), "Failed to acquire local media: camera in use");

        let err = MediaError::StatisticsUnavailable("no transport".to_string());
        assert!(err.to_string().contains("Statistics unavailable"));
    }
}
