//! Call quality classification.
//!
//! A session's quality monitor pulls [`RawStats`] from the provider on a
//! fixed interval and classifies each sample into one of three levels
//! using the network leg alone. All threshold comparisons are strict
//! (`>`), so a sample sitting exactly on a threshold stays in the better
//! class.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AudioStats, NetworkStats, RawStats, VideoStats};

/// Packet loss fraction above which a call is rated fair
pub const FAIR_PACKET_LOSS: f64 = 0.02;
/// Packet loss fraction above which a call is rated poor
pub const POOR_PACKET_LOSS: f64 = 0.05;
/// Round-trip time above which a call is rated fair
pub const FAIR_RTT: Duration = Duration::from_millis(100);
/// Round-trip time above which a call is rated poor
pub const POOR_RTT: Duration = Duration::from_millis(200);

/// Classified call quality for one sampling cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Good,
    Fair,
    Poor,
}

impl QualityLevel {
    /// Classify a network sample.
    ///
    /// Poor dominates fair: if either the loss or the latency threshold
    /// for poor is exceeded, the fair thresholds are not consulted.
    pub fn from_network(network: &NetworkStats) -> Self {
        if network.packet_loss > POOR_PACKET_LOSS || network.rtt > POOR_RTT {
            QualityLevel::Poor
        } else if network.packet_loss > FAIR_PACKET_LOSS || network.rtt > FAIR_RTT {
            QualityLevel::Fair
        } else {
            QualityLevel::Good
        }
    }
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityLevel::Good => write!(f, "good"),
            QualityLevel::Fair => write!(f, "fair"),
            QualityLevel::Poor => write!(f, "poor"),
        }
    }
}

/// One successfully captured statistics sample, stamped at capture time.
///
/// A failed capture produces no sample at all, never a zeroed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySample {
    pub video: Option<VideoStats>,
    pub audio: Option<AudioStats>,
    pub network: NetworkStats,
    pub sampled_at: DateTime<Utc>,
}

impl QualitySample {
    /// Build a sample from raw provider statistics, stamping it now
    pub fn capture(stats: RawStats) -> Self {
        Self {
            video: stats.video,
            audio: stats.audio,
            network: stats.network,
            sampled_at: Utc::now(),
        }
    }

    /// Classification of this sample's network leg
    pub fn level(&self) -> QualityLevel {
        QualityLevel::from_network(&self.network)
    }
}
