//! Periodic connection quality sampling.
//!
//! While a session is active, a background task pulls statistics from
//! the media provider every sampling interval, classifies them, and
//! publishes a [`SessionEvent::QualityUpdate`]. A failed pull means no
//! event for that cycle and nothing else; sampling continues. The task
//! is started once on activation and stopped exactly once on teardown;
//! stopping an already stopped monitor is a no-op.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

use televisit_media_core::{MediaCapabilityProvider, QualitySample};

use crate::events::{SessionEvent, SessionEventHub};
use crate::types::SessionId;

/// Samples connection quality for one session.
pub struct QualityMonitor {
    session_id: SessionId,
    provider: Arc<dyn MediaCapabilityProvider>,
    hub: Arc<SessionEventHub>,
    interval: Duration,
    latest: Arc<RwLock<Option<QualitySample>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl QualityMonitor {
    pub fn new(
        session_id: SessionId,
        provider: Arc<dyn MediaCapabilityProvider>,
        hub: Arc<SessionEventHub>,
        interval: Duration,
    ) -> Self {
        Self {
            session_id,
            provider,
            hub,
            interval,
            latest: Arc::new(RwLock::new(None)),
            task: Mutex::new(None),
        }
    }

    /// Start sampling. The first sample lands one interval after this
    /// call. Starting an already running monitor does nothing.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            debug!("quality monitor already running for session {}", self.session_id);
            return;
        }

        let session_id = self.session_id.clone();
        let provider = self.provider.clone();
        let hub = self.hub.clone();
        let latest = self.latest.clone();
        let period = self.interval;

        *task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                match provider.get_statistics().await {
                    Ok(raw) => {
                        let sample = QualitySample::capture(raw);
                        debug!(
                            "quality sample for session {}: {} (loss {:.3}, rtt {:?})",
                            session_id,
                            sample.level(),
                            sample.network.packet_loss,
                            sample.network.rtt
                        );
                        *latest.write() = Some(sample.clone());
                        hub.publish(SessionEvent::QualityUpdate {
                            session_id: session_id.clone(),
                            sample,
                        });
                    }
                    // No sample this cycle; keep going
                    Err(e) => debug!(
                        "quality sample unavailable for session {}: {}",
                        session_id, e
                    ),
                }
            }
        }));
        info!(
            "quality monitoring started for session {} (every {:?})",
            self.session_id, self.interval
        );
    }

    /// Stop sampling. Safe to call any number of times.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            info!("quality monitoring stopped for session {}", self.session_id);
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Most recent successful sample, if any
    pub fn latest(&self) -> Option<QualitySample> {
        self.latest.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use televisit_media_core::testing::{network_stats, FakeMediaProvider};
    use televisit_media_core::QualityLevel;

    use super::*;

    fn monitor_with_fake(
        provider: Arc<FakeMediaProvider>,
    ) -> (QualityMonitor, Arc<SessionEventHub>) {
        let hub = Arc::new(SessionEventHub::new(32));
        let monitor = QualityMonitor::new(
            SessionId::from("session-q"),
            provider,
            hub.clone(),
            Duration::from_secs(5),
        );
        (monitor, hub)
    }

    fn sample_of(event: SessionEvent) -> QualitySample {
        match event {
            SessionEvent::QualityUpdate { sample, .. } => sample,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_published_each_interval() {
        let provider = Arc::new(FakeMediaProvider::new());
        provider.push_stats(network_stats(0.0, 40));
        provider.push_stats(network_stats(0.10, 250));
        let (monitor, hub) = monitor_with_fake(provider);
        let mut stream = hub.subscribe();

        monitor.start();
        let first = sample_of(stream.next().await.unwrap());
        assert_eq!(first.level(), QualityLevel::Good);
        let second = sample_of(stream.next().await.unwrap());
        assert_eq!(second.level(), QualityLevel::Poor);

        assert_eq!(monitor.latest().unwrap().level(), QualityLevel::Poor);
        monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sample_produces_no_event() {
        let provider = Arc::new(FakeMediaProvider::new());
        provider.push_stats(network_stats(0.0, 40));
        provider.push_unavailable();
        provider.push_stats(network_stats(0.03, 120));
        let (monitor, hub) = monitor_with_fake(provider);
        let mut stream = hub.subscribe();

        monitor.start();
        assert_eq!(sample_of(stream.next().await.unwrap()).level(), QualityLevel::Good);
        // The unavailable cycle is skipped entirely; the next event is
        // the third sample
        assert_eq!(sample_of(stream.next().await.unwrap()).level(), QualityLevel::Fair);
        monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let provider = Arc::new(FakeMediaProvider::new());
        let (monitor, hub) = monitor_with_fake(provider);
        let mut stream = hub.subscribe();

        monitor.start();
        assert!(monitor.is_running());
        stream.next().await.unwrap();

        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());

        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert!(stream.try_next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_keeps_one_sampler() {
        let provider = Arc::new(FakeMediaProvider::new());
        let (monitor, hub) = monitor_with_fake(provider);
        let mut stream = hub.subscribe();

        monitor.start();
        monitor.start();

        stream.next().await.unwrap();
        tokio::task::yield_now().await;
        // A second sampler would have published a duplicate at the same
        // tick
        assert!(stream.try_next().is_none());
        monitor.stop();
    }
}
