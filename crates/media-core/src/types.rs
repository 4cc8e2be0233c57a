//! Shared media types: tracks, bundles, constraints, and raw statistics.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a single media track
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub String);

impl TrackId {
    /// Generate a new unique track ID
    pub fn new() -> Self {
        Self(format!("track-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of media a track carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Where a track's content comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackSource {
    Camera,
    Microphone,
    Screen,
}

/// Handle to one local or remote media track.
///
/// The engine never touches raw frames; a track is an opaque handle the
/// provider knows how to route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaTrack {
    pub id: TrackId,
    pub kind: TrackKind,
    pub source: TrackSource,
    /// Human-readable device or content label
    pub label: String,
}

impl MediaTrack {
    /// Create a camera video track handle
    pub fn camera(label: impl Into<String>) -> Self {
        Self {
            id: TrackId::new(),
            kind: TrackKind::Video,
            source: TrackSource::Camera,
            label: label.into(),
        }
    }

    /// Create a microphone audio track handle
    pub fn microphone(label: impl Into<String>) -> Self {
        Self {
            id: TrackId::new(),
            kind: TrackKind::Audio,
            source: TrackSource::Microphone,
            label: label.into(),
        }
    }

    /// Create a screen-capture video track handle
    pub fn screen(label: impl Into<String>) -> Self {
        Self {
            id: TrackId::new(),
            kind: TrackKind::Video,
            source: TrackSource::Screen,
            label: label.into(),
        }
    }
}

/// The local tracks acquired for one session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackBundle {
    pub audio: Option<MediaTrack>,
    pub video: Option<MediaTrack>,
}

impl TrackBundle {
    /// IDs of all tracks in the bundle
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.audio
            .iter()
            .chain(self.video.iter())
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }
}

/// Requested properties for local media acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
    pub video_width: u32,
    pub video_height: u32,
    pub frame_rate: u32,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
            video_width: 1280,
            video_height: 720,
            frame_rate: 30,
        }
    }
}

impl MediaConstraints {
    /// Audio-only constraints (no camera)
    pub fn audio_only() -> Self {
        Self {
            video: false,
            ..Default::default()
        }
    }
}

/// Video-leg statistics for one sampling cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStats {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub bitrate_kbps: u32,
}

impl VideoStats {
    /// Resolution in the conventional "WxH" spelling
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Audio-leg statistics for one sampling cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStats {
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
}

/// Network-leg statistics for one sampling cycle.
///
/// `packet_loss` is a fraction in `[0, 1]`, not a percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub rtt: Duration,
    pub packet_loss: f64,
    pub bandwidth_kbps: u32,
}

impl NetworkStats {
    pub fn new(rtt: Duration, packet_loss: f64, bandwidth_kbps: u32) -> Self {
        Self {
            rtt,
            packet_loss,
            bandwidth_kbps,
        }
    }
}

/// Raw connection statistics as pulled from the provider.
///
/// Video/audio legs may be absent (audio-only call, track muted at the
/// source); the network leg is always present when a sample succeeds at
/// all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStats {
    pub video: Option<VideoStats>,
    pub audio: Option<AudioStats>,
    pub network: NetworkStats,
}
