use url::Url;

use crate::torrent::TrackerTiers;

/// Tracks which tracker URL within which tier an [`crate::announce::Announcer`]
/// is currently using, and applies the BEP 12 tier-rotation rules:
///
/// - on success, the successful URL is promoted to the front of its tier,
///   and that tier is promoted to the front of the tier list;
/// - on failure, the cursor advances to the next URL in the tier; when the
///   tier is exhausted it advances to the next tier; exhausting every tier
///   is treated as a single consecutive failure upstream.
#[derive(Debug, Clone)]
pub struct TierCursor {
    tiers: TrackerTiers,
    tier_index: usize,
    url_index: usize,
}

impl TierCursor {
    pub fn new(tiers: TrackerTiers) -> Self {
        Self {
            tiers,
            tier_index: 0,
            url_index: 0,
        }
    }

    /// The URL to try next, or `None` if there are no trackers at all.
    pub fn current(&self) -> Option<&Url> {
        self.tiers.get(self.tier_index)?.get(self.url_index)
    }

    /// Record a successful announce against the current URL: promote it to
    /// the head of its tier, and promote that tier to the head of the list.
    pub fn record_success(&mut self) {
        if let Some(tier) = self.tiers.get_mut(self.tier_index) {
            if self.url_index < tier.len() {
                tier.swap(0, self.url_index);
            }
        }
        if self.tier_index != 0 {
            self.tiers.swap(0, self.tier_index);
        }
        self.tier_index = 0;
        self.url_index = 0;
    }

    /// Record a failed announce against the current URL, advancing the
    /// cursor to the next candidate.
    ///
    /// Returns `true` if every tier has now been exhausted in this pass
    /// (i.e. the cursor wrapped back to the start) — the caller should count
    /// this as one consecutive failure.
    pub fn record_failure(&mut self) -> bool {
        let tier_len = self.tiers.get(self.tier_index).map(|t| t.len()).unwrap_or(0);
        if self.url_index + 1 < tier_len {
            self.url_index += 1;
            return false;
        }

        self.url_index = 0;
        self.tier_index += 1;
        if self.tier_index >= self.tiers.len() {
            self.tier_index = 0;
            return true;
        }
        false
    }
}
