use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use fx_callback::{Callback, MultiThreadedCallback, Subscriber, Subscription};
use log::{debug, warn};
use tokio::select;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::torrent::InfoHash;

const DEFAULT_REVIEW_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Entry {
    total_seeding_ms: u64,
    last_seeding_start: Option<Instant>,
    last_seeding_stop: Option<Instant>,
    is_seeding: bool,
    warning_sent: bool,
}

impl Entry {
    fn fresh(total_seeding_ms: u64) -> Self {
        Self {
            total_seeding_ms,
            last_seeding_start: None,
            last_seeding_stop: None,
            is_seeding: false,
            warning_sent: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HitAndRunEvent {
    /// A torrent has gone non-seeding for longer than `maxNonSeedingMs`
    /// without ever reaching `requiredSeedingMs` of accumulated seed time.
    ComplianceBreached(InfoHash),
}

/// Tracks, per torrent, how long this instance has spent seeding, to honor
/// trackers' minimum-seed-time policies even though no real data is being
/// served. State survives restarts via a flat JSON file.
pub struct HitAndRunTracker {
    required_seeding_ms: u64,
    max_non_seeding_ms: u64,
    review_interval: Duration,
    persist_path: PathBuf,
    entries: RwLock<HashMap<InfoHash, Entry>>,
    callbacks: MultiThreadedCallback<HitAndRunEvent>,
}

impl HitAndRunTracker {
    pub fn new(persist_path: PathBuf, required_seeding_ms: u64, max_non_seeding_ms: u64) -> Self {
        Self::with_review_interval(
            persist_path,
            required_seeding_ms,
            max_non_seeding_ms,
            DEFAULT_REVIEW_INTERVAL,
        )
    }

    pub fn with_review_interval(
        persist_path: PathBuf,
        required_seeding_ms: u64,
        max_non_seeding_ms: u64,
        review_interval: Duration,
    ) -> Self {
        let loaded = Self::load_persisted(&persist_path);
        let entries = loaded
            .into_iter()
            .map(|(hash, ms)| (hash, Entry::fresh(ms)))
            .collect();

        Self {
            required_seeding_ms,
            max_non_seeding_ms,
            review_interval,
            persist_path,
            entries: RwLock::new(entries),
            callbacks: MultiThreadedCallback::new(),
        }
    }

    fn load_persisted(path: &PathBuf) -> HashMap<InfoHash, u64> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return HashMap::new(),
        };
        let parsed: HashMap<String, u64> = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Failed to parse {}, starting empty, {}", path.display(), e);
                return HashMap::new();
            }
        };
        parsed
            .into_iter()
            .filter_map(|(hex, ms)| {
                hex.parse::<InfoHash>()
                    .map(|hash| (hash, ms))
                    .map_err(|e| warn!("Ignoring invalid info hash {} in elapsed-times file, {}", hex, e))
                    .ok()
            })
            .collect()
    }

    /// Mark a torrent as having started seeding.
    pub async fn start(&self, info_hash: InfoHash) {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(info_hash).or_insert_with(|| Entry::fresh(0));
        entry.is_seeding = true;
        entry.last_seeding_start = Some(Instant::now());
    }

    /// Mark a torrent as having stopped seeding, folding the elapsed span
    /// into its accumulated total.
    pub async fn stop(&self, info_hash: InfoHash) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&info_hash) {
            Self::fold_elapsed(entry);
            entry.is_seeding = false;
            entry.last_seeding_stop = Some(Instant::now());
        }
    }

    fn fold_elapsed(entry: &mut Entry) {
        if entry.is_seeding {
            if let Some(started) = entry.last_seeding_start.take() {
                entry.total_seeding_ms += started.elapsed().as_millis() as u64;
            }
            entry.last_seeding_start = Some(Instant::now());
        }
    }

    pub async fn total_seeding_ms(&self, info_hash: &InfoHash) -> u64 {
        self.entries
            .read()
            .await
            .get(info_hash)
            .map(|e| e.total_seeding_ms)
            .unwrap_or(0)
    }

    /// Run the periodic review loop until `token` is cancelled: folds
    /// elapsed time for everything currently seeding, persists the full
    /// map, and signals compliance breaches.
    pub async fn run(&self, token: CancellationToken) {
        loop {
            select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.review_interval) => self.review_once().await,
            }
        }
        debug!("Hit-and-run review loop has stopped");
    }

    async fn review_once(&self) {
        let breaches = {
            let mut entries = self.entries.write().await;
            let mut breaches = Vec::new();

            for (hash, entry) in entries.iter_mut() {
                Self::fold_elapsed(entry);

                if !entry.is_seeding && !entry.warning_sent && entry.total_seeding_ms < self.required_seeding_ms {
                    if let Some(stopped) = entry.last_seeding_stop {
                        if stopped.elapsed().as_millis() as u64 >= self.max_non_seeding_ms {
                            entry.warning_sent = true;
                            breaches.push(hash.clone());
                        }
                    }
                }
            }
            breaches
        };

        if let Err(e) = self.persist().await {
            warn!("Failed to persist elapsed-times file, {}", e);
        }

        for hash in breaches {
            self.callbacks.invoke(HitAndRunEvent::ComplianceBreached(hash));
        }
    }

    async fn persist(&self) -> Result<()> {
        let serializable: HashMap<String, u64> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .map(|(hash, entry)| (hash.to_hex(), entry.total_seeding_ms))
                .collect()
        };
        let json = serde_json::to_string_pretty(&serializable)?;
        std::fs::write(&self.persist_path, json)?;
        Ok(())
    }
}

impl Callback<HitAndRunEvent> for HitAndRunTracker {
    fn subscribe(&self) -> Subscription<HitAndRunEvent> {
        self.callbacks.subscribe()
    }

    fn subscribe_with(&self, subscriber: Subscriber<HitAndRunEvent>) {
        self.callbacks.subscribe_with(subscriber)
    }
}
