use std::fmt::{Debug, Display, Formatter};
use std::time::Duration;

use rand::Rng;
use tokio::sync::RwLock;
use url::Url;

use crate::announce::request::AnnounceEvent;
use crate::torrent::{InfoHash, TorrentMetadata};
use crate::tracker::TierCursor;

const DEFAULT_ANNOUNCE_INTERVAL_SECONDS: u64 = 1800;

/// The announcer lifecycle state machine: `New -> Started ->
/// Regular <-> Regular -> Stopped`. Transitions happen only through
/// [`Announcer::advance`], driven by the response handler chain on
/// announce *success*.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnouncerState {
    New,
    Started,
    Regular,
    Stopped,
}

impl AnnouncerState {
    /// The next lifecycle state once the given event has been announced
    /// successfully.
    pub fn advance(self, event: AnnounceEvent) -> Self {
        match event {
            AnnounceEvent::Stopped => AnnouncerState::Stopped,
            AnnounceEvent::Started => AnnouncerState::Started,
            AnnounceEvent::None | AnnounceEvent::Completed => AnnouncerState::Regular,
        }
    }
}

#[derive(Debug, Clone)]
struct Bookkeeping {
    state: AnnouncerState,
    consecutive_failures: u32,
    uploaded: u64,
    downloaded: u64,
    left: u64,
    interval_seconds: u64,
    last_event: AnnounceEvent,
}

/// The per-torrent announcer: owns the fabricated byte tallies,
/// the consecutive-failure counter, the current tracker tier cursor, and
/// the session-unique `key` reported to trackers.
pub struct Announcer {
    info_hash: InfoHash,
    metadata: TorrentMetadata,
    key: u32,
    bookkeeping: RwLock<Bookkeeping>,
    tiers: RwLock<TierCursor>,
}

impl Announcer {
    pub fn new(metadata: TorrentMetadata) -> Self {
        let info_hash = metadata.info_hash.clone();
        let tiers = TierCursor::new(metadata.trackers.clone());
        let left = metadata.total_size;
        let mut rng = rand::rng();

        Self {
            info_hash,
            key: rng.random(),
            tiers: RwLock::new(tiers),
            metadata,
            bookkeeping: RwLock::new(Bookkeeping {
                state: AnnouncerState::New,
                consecutive_failures: 0,
                uploaded: 0,
                downloaded: 0,
                left,
                interval_seconds: DEFAULT_ANNOUNCE_INTERVAL_SECONDS,
                last_event: AnnounceEvent::Started,
            }),
        }
    }

    pub fn info_hash(&self) -> &InfoHash {
        &self.info_hash
    }

    pub fn metadata(&self) -> &TorrentMetadata {
        &self.metadata
    }

    pub fn key(&self) -> u32 {
        self.key
    }

    pub async fn state(&self) -> AnnouncerState {
        self.bookkeeping.read().await.state
    }

    pub async fn consecutive_failures(&self) -> u32 {
        self.bookkeeping.read().await.consecutive_failures
    }

    pub async fn uploaded(&self) -> u64 {
        self.bookkeeping.read().await.uploaded
    }

    pub async fn downloaded(&self) -> u64 {
        self.bookkeeping.read().await.downloaded
    }

    pub async fn left(&self) -> u64 {
        self.bookkeeping.read().await.left
    }

    pub async fn interval(&self) -> Duration {
        Duration::from_secs(self.bookkeeping.read().await.interval_seconds)
    }

    /// The upload-ratio target progress: `uploaded / total_size`, or `None`
    /// if the torrent has no declared size.
    pub async fn upload_ratio(&self) -> Option<f64> {
        if self.metadata.total_size == 0 {
            return None;
        }
        let uploaded = self.uploaded().await;
        Some(uploaded as f64 / self.metadata.total_size as f64)
    }

    /// Apply a successfully-completed announce: add the
    /// fabricated byte delta, record the returned interval, and advance the
    /// lifecycle state machine.
    pub async fn apply_success(&self, event: AnnounceEvent, uploaded_delta: u64, interval_seconds: Option<u64>) {
        let mut bookkeeping = self.bookkeeping.write().await;
        bookkeeping.uploaded = bookkeeping.uploaded.saturating_add(uploaded_delta);
        if let Some(interval) = interval_seconds {
            bookkeeping.interval_seconds = interval;
        }
        bookkeeping.consecutive_failures = 0;
        bookkeeping.last_event = event;
        bookkeeping.state = bookkeeping.state.advance(event);
        self.tiers.write().await.record_success();
    }

    /// Record a failed announce pass: advances the tracker
    /// tier/URL cursor, and only increments the consecutive-failure counter
    /// once every tier has been exhausted.
    pub async fn apply_failure(&self) -> u32 {
        let exhausted = self.tiers.write().await.record_failure();
        let mut bookkeeping = self.bookkeeping.write().await;
        if exhausted {
            bookkeeping.consecutive_failures += 1;
        }
        bookkeeping.consecutive_failures
    }

    /// The tracker URL to announce the next request against.
    pub async fn current_tracker_url(&self) -> Option<Url> {
        self.tiers.read().await.current().cloned()
    }
}

impl Debug for Announcer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Announcer")
            .field("info_hash", &self.info_hash)
            .field("name", &self.metadata.name)
            .finish()
    }
}

impl Display for Announcer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.metadata.name, self.info_hash)
    }
}
