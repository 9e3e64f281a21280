use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fx_callback::{Callback, MultiThreadedCallback, Subscriber, Subscription};
use log::{debug, warn};
use tokio::sync::RwLock;

use crate::announce::announcer::Announcer;
use crate::announce::delay_queue::DelayQueue;
use crate::announce::executor::AnnounceOutcomeSink;
use crate::announce::request::AnnounceEvent;
use crate::bandwidth::BandwidthDispatcher;
use crate::torrent::InfoHash;
use crate::tracker::errors::Result as TrackerResult;
use crate::tracker::response::AnnounceResponse;

const TOO_MANY_FAILURES_THRESHOLD: u32 = 5;
const FAILURE_BACKOFF_CAP: Duration = Duration::from_secs(5 * 60);

/// A domain event published by the final response-handling step for
/// external observers (metrics, logging sinks, the admin UI — all out of
/// scope themselves).
#[derive(Debug, Clone, PartialEq)]
pub enum AnnounceDomainEvent {
    WillAnnounce(InfoHash, AnnounceEvent),
    SuccessfullyAnnounce(InfoHash, AnnounceEvent),
    FailedToAnnounce(InfoHash, AnnounceEvent),
}

/// The narrow callback capability the response handler chain holds on the
/// orchestrator, so the two can stay decoupled from one another's full
/// interfaces.
#[async_trait]
pub trait OrchestratorNotifications: Send + Sync {
    async fn on_no_more_peers(&self, info_hash: InfoHash);
    async fn on_upload_ratio_limit_reached(&self, info_hash: InfoHash);
    async fn on_torrent_has_stopped(&self, info_hash: InfoHash);
    async fn on_too_many_failed_in_a_row(&self, info_hash: InfoHash);
}

/// The fixed, ordered response handler chain: tracker bookkeeping,
/// peer/weight updates, rescheduling, client notification, event
/// publication. Modeled as one object invoking each step in sequence rather
/// than a dynamic list of polymorphic handler objects, since the order and
/// membership never vary at runtime.
pub struct ResponseHandlerChain {
    delay_queue: Arc<DelayQueue>,
    bandwidth: Arc<BandwidthDispatcher>,
    notifications: Arc<dyn OrchestratorNotifications>,
    upload_ratio_target: f64,
    last_dispatcher_totals: RwLock<HashMap<InfoHash, u64>>,
    callbacks: MultiThreadedCallback<AnnounceDomainEvent>,
}

impl ResponseHandlerChain {
    pub fn new(
        delay_queue: Arc<DelayQueue>,
        bandwidth: Arc<BandwidthDispatcher>,
        notifications: Arc<dyn OrchestratorNotifications>,
        upload_ratio_target: f64,
    ) -> Self {
        Self {
            delay_queue,
            bandwidth,
            notifications,
            upload_ratio_target,
            last_dispatcher_totals: RwLock::new(HashMap::new()),
            callbacks: MultiThreadedCallback::new(),
        }
    }

    async fn uploaded_delta_since_last_announce(&self, info_hash: &InfoHash) -> u64 {
        let current_total = self.bandwidth.uploaded_bytes(info_hash).await;
        let mut totals = self.last_dispatcher_totals.write().await;
        let previous = totals.get(info_hash).copied().unwrap_or(0);
        totals.insert(info_hash.clone(), current_total);
        current_total.saturating_sub(previous)
    }

    async fn on_success(&self, announcer: Arc<Announcer>, event: AnnounceEvent, response: AnnounceResponse) {
        let info_hash = announcer.info_hash().clone();
        self.callbacks
            .invoke(AnnounceDomainEvent::WillAnnounce(info_hash.clone(), event));

        // handler 1: tracker update
        let delta = self.uploaded_delta_since_last_announce(&info_hash).await;
        announcer
            .apply_success(event, delta, response.interval_seconds())
            .await;

        // handler 2: peers update
        self.bandwidth
            .update_peers(
                info_hash.clone(),
                response.seeders().min(u32::MAX as u64) as u32,
                response.leechers().min(u32::MAX as u64) as u32,
            )
            .await;

        // handler 3: rescheduling
        if event != AnnounceEvent::Stopped {
            let interval = announcer.interval().await;
            self.delay_queue
                .add_or_replace(info_hash.clone(), AnnounceEvent::None, interval)
                .await;
        }

        // handler 4: client notification
        if response.seeders() < 1 || response.leechers() < 1 {
            self.notifications.on_no_more_peers(info_hash.clone()).await;
        }
        if self.upload_ratio_target >= 0.0 {
            if let Some(ratio) = announcer.upload_ratio().await {
                if ratio >= self.upload_ratio_target {
                    self.notifications
                        .on_upload_ratio_limit_reached(info_hash.clone())
                        .await;
                }
            }
        }
        if event == AnnounceEvent::Stopped {
            self.notifications.on_torrent_has_stopped(info_hash.clone()).await;
        }

        // handler 5: event publication
        self.callbacks
            .invoke(AnnounceDomainEvent::SuccessfullyAnnounce(info_hash, event));
    }

    async fn on_failure(&self, announcer: Arc<Announcer>, event: AnnounceEvent) {
        let info_hash = announcer.info_hash().clone();
        self.callbacks
            .invoke(AnnounceDomainEvent::WillAnnounce(info_hash.clone(), event));

        let failures = announcer.apply_failure().await;

        // handler 3: rescheduling with back-off
        let interval = announcer.interval().await;
        let backoff = interval.min(FAILURE_BACKOFF_CAP);
        self.delay_queue
            .add_or_replace(info_hash.clone(), event, backoff)
            .await;

        // handler 4: client notification
        if failures >= TOO_MANY_FAILURES_THRESHOLD {
            self.notifications
                .on_too_many_failed_in_a_row(info_hash.clone())
                .await;
        }

        warn!(
            "Announce {:?} failed for {} ({} consecutive failures), retrying in {:?}",
            event, announcer, failures, backoff
        );

        // handler 5: event publication
        self.callbacks
            .invoke(AnnounceDomainEvent::FailedToAnnounce(info_hash, event));
    }
}

#[async_trait]
impl AnnounceOutcomeSink for ResponseHandlerChain {
    async fn handle(
        &self,
        announcer: Arc<Announcer>,
        event: AnnounceEvent,
        outcome: TrackerResult<AnnounceResponse>,
    ) {
        match outcome {
            Ok(response) => {
                if let Some(reason) = &response.failure_reason {
                    debug!("Announce for {} failed: {}", announcer, reason);
                    self.on_failure(announcer, event).await;
                } else {
                    self.on_success(announcer, event, response).await;
                }
            }
            Err(e) => {
                debug!("Announce transport error for {}, {}", announcer, e);
                self.on_failure(announcer, event).await;
            }
        }
    }
}

impl Callback<AnnounceDomainEvent> for ResponseHandlerChain {
    fn subscribe(&self) -> Subscription<AnnounceDomainEvent> {
        self.callbacks.subscribe()
    }

    fn subscribe_with(&self, subscriber: Subscriber<AnnounceDomainEvent>) {
        self.callbacks.subscribe_with(subscriber)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::TorrentMetadata;
    use std::sync::atomic::{AtomicU32, Ordering};
    use url::Url;

    #[derive(Default)]
    struct RecordingNotifications {
        no_more_peers: AtomicU32,
        ratio_reached: AtomicU32,
        stopped: AtomicU32,
        too_many_failures: AtomicU32,
    }

    #[async_trait]
    impl OrchestratorNotifications for RecordingNotifications {
        async fn on_no_more_peers(&self, _info_hash: InfoHash) {
            self.no_more_peers.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_upload_ratio_limit_reached(&self, _info_hash: InfoHash) {
            self.ratio_reached.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_torrent_has_stopped(&self, _info_hash: InfoHash) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_too_many_failed_in_a_row(&self, _info_hash: InfoHash) {
            self.too_many_failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn announcer() -> Arc<Announcer> {
        Arc::new(Announcer::new(TorrentMetadata {
            info_hash: InfoHash::from_info_dict(b"handler-test"),
            name: "test.iso".to_string(),
            total_size: 1000,
            trackers: vec![vec![Url::parse("http://tracker/announce").unwrap()]],
        }))
    }

    async fn chain(notifications: Arc<RecordingNotifications>, upload_ratio_target: f64) -> ResponseHandlerChain {
        let bandwidth = Arc::new(BandwidthDispatcher::new(1000, 2000));
        ResponseHandlerChain::new(
            Arc::new(DelayQueue::new()),
            bandwidth,
            notifications,
            upload_ratio_target,
        )
    }

    #[tokio::test]
    async fn test_success_reschedules_with_returned_interval() {
        let notifications = Arc::new(RecordingNotifications::default());
        let chain = chain(notifications.clone(), -1.0).await;
        let announcer = announcer();
        let delay_queue = chain.delay_queue.clone();

        let response = AnnounceResponse {
            failure_reason: None,
            interval: Some(1800),
            min_interval: None,
            complete: Some(10),
            incomplete: Some(5),
        };

        chain
            .handle(announcer.clone(), AnnounceEvent::Started, Ok(response))
            .await;

        let due = delay_queue.drain_all().await;
        assert_eq!(1, due.len());
        assert_eq!(AnnounceEvent::None, due[0].event);
    }

    #[tokio::test]
    async fn test_zero_peers_signals_no_more_peers() {
        let notifications = Arc::new(RecordingNotifications::default());
        let chain = chain(notifications.clone(), -1.0).await;
        let announcer = announcer();

        let response = AnnounceResponse {
            failure_reason: None,
            interval: Some(1800),
            min_interval: None,
            complete: Some(0),
            incomplete: Some(0),
        };

        chain
            .handle(announcer, AnnounceEvent::Started, Ok(response))
            .await;

        assert_eq!(1, notifications.no_more_peers.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stopped_success_does_not_reschedule_and_signals_stopped() {
        let notifications = Arc::new(RecordingNotifications::default());
        let chain = chain(notifications.clone(), -1.0).await;
        let announcer = announcer();

        let response = AnnounceResponse {
            failure_reason: None,
            interval: Some(1800),
            min_interval: None,
            complete: Some(5),
            incomplete: Some(5),
        };

        chain
            .handle(announcer, AnnounceEvent::Stopped, Ok(response))
            .await;

        assert!(chain.delay_queue.is_empty().await);
        assert_eq!(1, notifications.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failure_reschedules_with_backoff_and_increments_counter() {
        let notifications = Arc::new(RecordingNotifications::default());
        let chain = chain(notifications.clone(), -1.0).await;
        let announcer = announcer();

        chain
            .handle(
                announcer.clone(),
                AnnounceEvent::Started,
                Err(crate::tracker::errors::TrackerError::Timeout),
            )
            .await;

        let due = chain.delay_queue.drain_all().await;
        assert_eq!(1, due.len());
        assert_eq!(1, announcer.consecutive_failures().await);
    }

    #[tokio::test]
    async fn test_too_many_failures_signals_orchestrator() {
        let notifications = Arc::new(RecordingNotifications::default());
        let chain = chain(notifications.clone(), -1.0).await;
        let announcer = announcer();

        for _ in 0..TOO_MANY_FAILURES_THRESHOLD {
            chain
                .handle(
                    announcer.clone(),
                    AnnounceEvent::None,
                    Err(crate::tracker::errors::TrackerError::Timeout),
                )
                .await;
        }

        assert_eq!(1, notifications.too_many_failures.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_upload_ratio_target_disabled_never_triggers() {
        let notifications = Arc::new(RecordingNotifications::default());
        let chain = chain(notifications.clone(), -1.0).await;
        let announcer = announcer();
        chain
            .bandwidth
            .register_torrent(announcer.info_hash().clone())
            .await;

        // fabricate a huge upload so the ratio would trip if enabled
        for _ in 0..3 {
            chain.uploaded_delta_since_last_announce(announcer.info_hash()).await;
        }

        let response = AnnounceResponse {
            failure_reason: None,
            interval: Some(1800),
            min_interval: None,
            complete: Some(5),
            incomplete: Some(5),
        };
        chain
            .handle(announcer, AnnounceEvent::Started, Ok(response))
            .await;

        assert_eq!(0, notifications.ratio_reached.load(Ordering::SeqCst));
    }
}
