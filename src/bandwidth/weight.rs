use std::collections::HashMap;

use crate::torrent::InfoHash;

/// Computes a torrent's share of the upload budget from its peer swarm.
///
/// Zero on either side (no seeders to compete with, or no leechers to
/// serve) yields weight zero, which in turn yields speed zero. Otherwise
/// the weight grows with the leecher count and is damped by how crowded
/// the seeder side already is, so a torrent with few seeders and many
/// leechers outweighs one with plenty of seeders already covering it.
fn weight(seeders: u32, leechers: u32) -> f64 {
    if seeders == 0 || leechers == 0 {
        return 0.0;
    }
    leechers as f64 * (1.0 + 1.0 / seeders as f64)
}

/// Tracks each active torrent's peer counts and derived weight, and the
/// running total needed to normalize speeds.
#[derive(Debug, Default)]
pub struct WeightHolder {
    weights: HashMap<InfoHash, f64>,
}

impl WeightHolder {
    pub fn new() -> Self {
        Self {
            weights: HashMap::new(),
        }
    }

    /// Insert or update a torrent's weight from its current peer counts.
    pub fn update(&mut self, info_hash: InfoHash, seeders: u32, leechers: u32) {
        self.weights.insert(info_hash, weight(seeders, leechers));
    }

    pub fn remove(&mut self, info_hash: &InfoHash) {
        self.weights.remove(info_hash);
    }

    pub fn weight_of(&self, info_hash: &InfoHash) -> f64 {
        self.weights.get(info_hash).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}
