//! Deterministic test double for the media capability contract.
//!
//! `FakeMediaProvider` fabricates tracks and statistics with no devices
//! involved. Statistics can be scripted per cycle, acquisition can be made
//! to fail, and every contract call is counted so tests can assert on
//! resource handling.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{MediaError, Result};
use crate::provider::{MediaCapabilityProvider, MediaProviderEvent};
use crate::types::{
    MediaConstraints, MediaTrack, NetworkStats, RawStats, TrackBundle, VideoStats,
};

/// A clean sample: 40 ms RTT, no loss
pub fn good_stats() -> RawStats {
    RawStats {
        video: Some(VideoStats {
            width: 1280,
            height: 720,
            frame_rate: 30.0,
            bitrate_kbps: 1200,
        }),
        audio: None,
        network: NetworkStats::new(Duration::from_millis(40), 0.0, 2000),
    }
}

/// A sample with the given network leg and no media legs
pub fn network_stats(packet_loss: f64, rtt_ms: u64) -> RawStats {
    RawStats {
        video: None,
        audio: None,
        network: NetworkStats::new(Duration::from_millis(rtt_ms), packet_loss, 1500),
    }
}

/// Scriptable in-memory media provider.
pub struct FakeMediaProvider {
    /// Per-cycle statistics script; `None` entries simulate an
    /// unavailable sample for that cycle.
    stats_script: Mutex<VecDeque<Option<RawStats>>>,
    /// Returned once the script runs out; `None` means keep failing.
    fallback_stats: Mutex<Option<RawStats>>,
    refuse_acquisition: Mutex<Option<String>>,
    refuse_replacement: Mutex<Option<String>>,
    events_tx: mpsc::Sender<MediaProviderEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<MediaProviderEvent>>>,
    acquire_calls: AtomicUsize,
    release_calls: AtomicUsize,
    replaced_tracks: Mutex<Vec<MediaTrack>>,
}

impl FakeMediaProvider {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(32);
        Self {
            stats_script: Mutex::new(VecDeque::new()),
            fallback_stats: Mutex::new(Some(good_stats())),
            refuse_acquisition: Mutex::new(None),
            refuse_replacement: Mutex::new(None),
            events_tx: tx,
            events_rx: Mutex::new(Some(rx)),
            acquire_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
            replaced_tracks: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful sample for one future cycle
    pub fn push_stats(&self, stats: RawStats) {
        self.stats_script.lock().push_back(Some(stats));
    }

    /// Queue one cycle in which statistics are unavailable
    pub fn push_unavailable(&self) {
        self.stats_script.lock().push_back(None);
    }

    /// Set (or clear) the sample returned after the script runs out
    pub fn set_fallback_stats(&self, stats: Option<RawStats>) {
        *self.fallback_stats.lock() = stats;
    }

    /// Make the next `acquire_local_media` call fail with this message
    pub fn refuse_acquisition(&self, reason: impl Into<String>) {
        *self.refuse_acquisition.lock() = Some(reason.into());
    }

    /// Make the next `replace_video_track` call fail with this message;
    /// the one after succeeds again
    pub fn refuse_replacement(&self, reason: impl Into<String>) {
        *self.refuse_replacement.lock() = Some(reason.into());
    }

    /// Simulate the remote peer's track arriving
    pub async fn emit_remote_track(&self, track: MediaTrack) {
        let _ = self
            .events_tx
            .send(MediaProviderEvent::RemoteTrackReceived { track })
            .await;
    }

    pub fn acquire_count(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    /// Tracks passed to `replace_video_track`, in call order
    pub fn replaced_tracks(&self) -> Vec<MediaTrack> {
        self.replaced_tracks.lock().clone()
    }
}

impl Default for FakeMediaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaCapabilityProvider for FakeMediaProvider {
    async fn acquire_local_media(&self, constraints: &MediaConstraints) -> Result<TrackBundle> {
        if let Some(reason) = self.refuse_acquisition.lock().clone() {
            return Err(MediaError::AcquisitionFailure(reason));
        }
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        Ok(TrackBundle {
            audio: constraints.audio.then(|| MediaTrack::microphone("fake-mic")),
            video: constraints.video.then(|| MediaTrack::camera("fake-cam")),
        })
    }

    async fn replace_video_track(&self, new_track: MediaTrack) -> Result<()> {
        if let Some(reason) = self.refuse_replacement.lock().take() {
            return Err(MediaError::TrackUnavailable(reason));
        }
        self.replaced_tracks.lock().push(new_track);
        Ok(())
    }

    async fn capture_screen_track(&self) -> Result<MediaTrack> {
        Ok(MediaTrack::screen("fake-screen"))
    }

    async fn get_statistics(&self) -> Result<RawStats> {
        let scripted = self.stats_script.lock().pop_front();
        match scripted {
            Some(Some(stats)) => Ok(stats),
            Some(None) => Err(MediaError::StatisticsUnavailable(
                "scripted unavailable cycle".to_string(),
            )),
            None => self.fallback_stats.lock().clone().ok_or_else(|| {
                MediaError::StatisticsUnavailable("no fallback sample".to_string())
            }),
        }
    }

    async fn release_media(&self, _bundle: &TrackBundle) -> Result<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn take_events(&self) -> Option<mpsc::Receiver<MediaProviderEvent>> {
        self.events_rx.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_stats_in_order() {
        let provider = FakeMediaProvider::new();
        provider.push_stats(network_stats(0.06, 50));
        provider.push_unavailable();
        provider.push_stats(network_stats(0.0, 40));

        assert_eq!(provider.get_statistics().await.unwrap().network.packet_loss, 0.06);
        assert!(provider.get_statistics().await.is_err());
        assert_eq!(provider.get_statistics().await.unwrap().network.packet_loss, 0.0);
        // Script exhausted, fallback applies
        assert!(provider.get_statistics().await.is_ok());
    }

    #[tokio::test]
    async fn test_refused_acquisition() {
        let provider = FakeMediaProvider::new();
        provider.refuse_acquisition("permission denied");
        let err = provider
            .acquire_local_media(&MediaConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::AcquisitionFailure(_)));
        assert_eq!(provider.acquire_count(), 0);
    }

    #[tokio::test]
    async fn test_refused_replacement_is_one_shot() {
        let provider = FakeMediaProvider::new();
        provider.refuse_replacement("camera busy");
        let err = provider
            .replace_video_track(MediaTrack::camera("rear"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::TrackUnavailable(_)));
        assert!(provider.replaced_tracks().is_empty());

        provider.replace_video_track(MediaTrack::camera("rear")).await.unwrap();
        assert_eq!(provider.replaced_tracks().len(), 1);
    }

    #[tokio::test]
    async fn test_bundle_follows_constraints() {
        let provider = FakeMediaProvider::new();
        let bundle = provider
            .acquire_local_media(&MediaConstraints::audio_only())
            .await
            .unwrap();
        assert!(bundle.has_audio());
        assert!(!bundle.has_video());
    }

    #[tokio::test]
    async fn test_events_taken_once() {
        let provider = FakeMediaProvider::new();
        assert!(provider.take_events().await.is_some());
        assert!(provider.take_events().await.is_none());
    }
}
