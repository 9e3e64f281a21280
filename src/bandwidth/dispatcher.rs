use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fx_callback::{Callback, MultiThreadedCallback, Subscriber, Subscription};
use log::{debug, trace};
use rand::Rng;
use tokio::select;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::bandwidth::weight::WeightHolder;
use crate::torrent::InfoHash;

const DEFAULT_TICK: Duration = Duration::from_millis(5000);
const BUDGET_REFRESH_PERIOD: Duration = Duration::from_secs(120);

/// A snapshot of every active torrent's current upload speed, published
/// after each peer update or budget refresh.
pub type SpeedMap = HashMap<InfoHash, u64>;

#[derive(Debug, Clone, PartialEq)]
pub enum BandwidthEvent {
    SpeedsChanged(SpeedMap),
}

#[derive(Debug, Default)]
struct Stats {
    uploaded_bytes: u64,
}

struct State {
    stats: HashMap<InfoHash, Stats>,
    speeds: HashMap<InfoHash, u64>,
    weights: WeightHolder,
    global_budget: u64,
}

/// Divides a randomized global upload budget among active torrents
/// weighted by their peer populations, accumulates a per-torrent byte
/// tally that announces later drain, and publishes a speed snapshot on
/// every recomputation.
pub struct BandwidthDispatcher {
    min_upload_rate: u64,
    max_upload_rate: u64,
    tick: Duration,
    state: RwLock<State>,
    callbacks: MultiThreadedCallback<BandwidthEvent>,
}

impl BandwidthDispatcher {
    pub fn new(min_upload_rate: u64, max_upload_rate: u64) -> Self {
        Self::with_tick(min_upload_rate, max_upload_rate, DEFAULT_TICK)
    }

    pub fn with_tick(min_upload_rate: u64, max_upload_rate: u64, tick: Duration) -> Self {
        let global_budget = sample_budget(min_upload_rate, max_upload_rate);
        Self {
            min_upload_rate,
            max_upload_rate,
            tick,
            state: RwLock::new(State {
                stats: HashMap::new(),
                speeds: HashMap::new(),
                weights: WeightHolder::new(),
                global_budget,
            }),
            callbacks: MultiThreadedCallback::new(),
        }
    }

    /// Seed the stats and speed maps for a newly-active torrent.
    pub async fn register_torrent(&self, info_hash: InfoHash) {
        let mut state = self.state.write().await;
        state.stats.insert(info_hash.clone(), Stats::default());
        state.speeds.insert(info_hash, 0);
    }

    /// Remove a torrent from every map and recompute the remaining speeds.
    pub async fn unregister_torrent(&self, info_hash: &InfoHash) {
        let mut state = self.state.write().await;
        state.stats.remove(info_hash);
        state.speeds.remove(info_hash);
        state.weights.remove(info_hash);
        self.recompute_speeds(&mut state);
        self.publish(&state);
    }

    /// Update a torrent's peer counts and recompute every speed.
    pub async fn update_peers(&self, info_hash: InfoHash, seeders: u32, leechers: u32) {
        let mut state = self.state.write().await;
        state.weights.update(info_hash, seeders, leechers);
        self.recompute_speeds(&mut state);
        self.publish(&state);
    }

    /// The fabricated cumulative upload total accrued for this torrent so
    /// far; the response handler chain diffs this against its last-seen
    /// value to compute the bytes to add to an announcer's tally.
    pub async fn uploaded_bytes(&self, info_hash: &InfoHash) -> u64 {
        self.state
            .read()
            .await
            .stats
            .get(info_hash)
            .map(|s| s.uploaded_bytes)
            .unwrap_or(0)
    }

    /// Run the tick loop until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick);
        let mut ticks_since_refresh: u64 = 0;
        let ticks_per_refresh = (BUDGET_REFRESH_PERIOD.as_millis() / self.tick.as_millis().max(1))
            .max(1) as u64;

        loop {
            select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.accrue_tick().await;
                    ticks_since_refresh += 1;
                    if ticks_since_refresh >= ticks_per_refresh {
                        ticks_since_refresh = 0;
                        self.refresh_budget().await;
                    }
                }
            }
        }
        debug!("Bandwidth dispatcher tick loop has stopped");
    }

    async fn accrue_tick(&self) {
        let mut state = self.state.write().await;
        let added_per_hash: Vec<(InfoHash, u64)> = state
            .speeds
            .iter()
            .map(|(hash, speed)| {
                let added = (*speed as u128 * self.tick.as_millis() / 1000) as u64;
                (hash.clone(), added)
            })
            .collect();

        for (hash, added) in added_per_hash {
            if let Some(stats) = state.stats.get_mut(&hash) {
                stats.uploaded_bytes = stats.uploaded_bytes.saturating_add(added);
            }
        }
        trace!("Bandwidth tick accrued uploads for {} torrents", state.stats.len());
    }

    async fn refresh_budget(&self) {
        let mut state = self.state.write().await;
        state.global_budget = sample_budget(self.min_upload_rate, self.max_upload_rate);
        self.recompute_speeds(&mut state);
        self.publish(&state);
        debug!("Refreshed global upload budget to {} bytes/sec", state.global_budget);
    }

    fn recompute_speeds(&self, state: &mut State) {
        let total_weight = state.weights.total();
        let registered: Vec<InfoHash> = state.speeds.keys().cloned().collect();

        for hash in registered {
            let speed = if total_weight <= 0.0 {
                0
            } else {
                let share = state.weights.weight_of(&hash) / total_weight;
                (state.global_budget as f64 * share) as u64
            };
            state.speeds.insert(hash, speed);
        }
    }

    fn publish(&self, state: &State) {
        self.callbacks
            .invoke(BandwidthEvent::SpeedsChanged(state.speeds.clone()));
    }
}

fn sample_budget(min: u64, max: u64) -> u64 {
    if max <= min {
        return min;
    }
    rand::rng().random_range(min..=max)
}

impl Callback<BandwidthEvent> for BandwidthDispatcher {
    fn subscribe(&self) -> Subscription<BandwidthEvent> {
        self.callbacks.subscribe()
    }

    fn subscribe_with(&self, subscriber: Subscriber<BandwidthEvent>) {
        self.callbacks.subscribe_with(subscriber)
    }
}
